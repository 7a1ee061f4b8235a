//! Annum HTTP server: configuration and application assembly.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use annum_store_sqlite::SqliteStore;
use annum_sync::{
  ConfiguredPermission, HttpCalendarProvider, PermissionStatus, Reconciler, SyncConfig,
  classify::{Classifier, KeywordRule},
};
use anyhow::Context as _;
use axum::Router;
use chrono_tz::Tz;
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Server configuration, read from `config.toml` and `ANNUM_*` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  pub store_path: PathBuf,
  /// IANA zone that defines "today" for every owner.
  #[serde(default = "default_timezone")]
  pub timezone:   Tz,
  #[serde(default)]
  pub sync:       SyncSettings,
}

/// The `[sync]` table. Sync is off unless `provider_url` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
  pub provider_url:       Option<String>,
  /// Calendar access reported to the reconciler.
  #[serde(default = "default_access")]
  pub access:             PermissionStatus,
  #[serde(default = "default_fetch_timeout_secs")]
  pub fetch_timeout_secs: u64,
  #[serde(default = "default_lookback_days")]
  pub lookback_days:      u32,
  #[serde(default = "default_lookahead_days")]
  pub lookahead_days:     u32,
  /// Extra classification keywords, tried after the built-in ones.
  #[serde(default)]
  pub keywords:           Vec<KeywordRule>,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      provider_url:       None,
      access:             default_access(),
      fetch_timeout_secs: default_fetch_timeout_secs(),
      lookback_days:      default_lookback_days(),
      lookahead_days:     default_lookahead_days(),
      keywords:           Vec::new(),
    }
  }
}

impl SyncSettings {
  pub fn sync_config(&self) -> SyncConfig {
    let classifier = self
      .keywords
      .iter()
      .fold(Classifier::default(), |c, rule| c.with_rule(&rule.keyword, rule.category));
    SyncConfig {
      fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
      lookback_days: self.lookback_days,
      lookahead_days: self.lookahead_days,
      classifier,
    }
  }
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 5300 }
fn default_timezone() -> Tz { chrono_tz::UTC }
fn default_access() -> PermissionStatus { PermissionStatus::Authorized }
fn default_fetch_timeout_secs() -> u64 { 30 }
fn default_lookback_days() -> u32 { 1 }
fn default_lookahead_days() -> u32 { 366 }

/// Read `path` (optional) layered under `ANNUM_`-prefixed environment
/// variables; nested keys use `__`, e.g. `ANNUM_SYNC__PROVIDER_URL`.
pub fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  parse_config(
    Config::builder()
      .add_source(File::from(path).required(false))
      .add_source(Environment::with_prefix("ANNUM").separator("__")),
  )
}

fn parse_config(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<ServerConfig> {
  let mut config: ServerConfig = builder
    .build()
    .context("failed to read config")?
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  config.store_path = expand_tilde(&config.store_path);
  Ok(config)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Application ──────────────────────────────────────────────────────────────

/// Assemble the HTTP application over an opened store. The API is mounted
/// under `/api`.
pub fn app(config: &ServerConfig, store: Arc<SqliteStore>) -> anyhow::Result<Router> {
  let api = match &config.sync.provider_url {
    Some(url) => {
      let settings = &config.sync;
      let provider = HttpCalendarProvider::new(
        url.clone(),
        Duration::from_secs(settings.fetch_timeout_secs),
      )
      .context("failed to build calendar provider client")?;
      let reconciler = Reconciler::new(
        Arc::clone(&store),
        Arc::new(provider),
        Arc::new(ConfiguredPermission { status: settings.access }),
        settings.sync_config(),
      );
      tracing::info!(provider = %url, access = %settings.access, "calendar sync enabled");
      annum_api::api_router_with_sync(store, Arc::new(reconciler), config.timezone)
    }
    None => {
      tracing::info!("calendar sync disabled; no provider_url configured");
      annum_api::api_router(store, config.timezone)
    }
  };

  Ok(Router::new().nest("/api", api).layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
  use annum_core::category::Category;
  use config::FileFormat;

  use super::*;

  fn parse(toml: &str) -> ServerConfig {
    parse_config(Config::builder().add_source(File::from_str(toml, FileFormat::Toml))).unwrap()
  }

  #[test]
  fn minimal_config_uses_defaults() {
    let config = parse(r#"store_path = "/var/lib/annum/annum.db""#);
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 5300);
    assert_eq!(config.timezone, chrono_tz::UTC);
    assert!(config.sync.provider_url.is_none());

    let sync = config.sync.sync_config();
    assert_eq!(sync.fetch_timeout, Duration::from_secs(30));
    assert_eq!(sync.lookback_days, 1);
    assert_eq!(sync.lookahead_days, 366);
  }

  #[test]
  fn sync_table_is_read() {
    let config = parse(
      r#"
        store_path = "annum.db"
        timezone   = "Europe/London"

        [sync]
        provider_url       = "http://calendar.local"
        access             = "denied"
        fetch_timeout_secs = 5
        keywords           = [{ keyword = "name day", category = "custom" }]
      "#,
    );
    assert_eq!(config.timezone, chrono_tz::Europe::London);
    assert_eq!(config.sync.access, PermissionStatus::Denied);

    let sync = config.sync.sync_config();
    assert_eq!(sync.fetch_timeout, Duration::from_secs(5));
    assert_eq!(sync.classifier.rules().len(), 5);
    assert_eq!(sync.classifier.rules()[4].category, Category::Custom);
  }

  #[test]
  fn unknown_timezone_is_rejected() {
    let result = parse_config(Config::builder().add_source(File::from_str(
      "store_path = \"annum.db\"\ntimezone = \"Mars/Olympus\"",
      FileFormat::Toml,
    )));
    assert!(result.is_err());
  }

  #[test]
  fn tilde_is_expanded() {
    if let Ok(home) = std::env::var("HOME") {
      let expanded = expand_tilde(Path::new("~/annum.db"));
      assert_eq!(expanded, PathBuf::from(home).join("annum.db"));
    }
    assert_eq!(expand_tilde(Path::new("/tmp/annum.db")), PathBuf::from("/tmp/annum.db"));
  }

  #[tokio::test]
  async fn app_serves_the_api() {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt as _;

    let config = parse(r#"store_path = ":memory:""#);
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let response = app(&config, store)
      .unwrap()
      .oneshot(Request::get("/api/owners/o/dates").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), 200);
  }
}
