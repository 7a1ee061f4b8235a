//! A [`CalendarProvider`] backed by a JSON calendar feed over HTTP.
//!
//! The feed answers `GET {base}/events?start=YYYY-MM-DD&end=YYYY-MM-DD` with
//! a JSON array of [`CalendarEvent`]s.

use std::time::Duration;

use reqwest::Client;

use crate::{
  ProviderError,
  provider::{CalendarEvent, CalendarProvider, DateRange},
};

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct HttpCalendarProvider {
  client:   Client,
  base_url: String,
  timeout:  Duration,
}

impl HttpCalendarProvider {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base_url: base_url.into(), timeout })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }

  fn classify_error(&self, e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
      ProviderError::Timeout(self.timeout)
    } else if e.is_decode() {
      ProviderError::Malformed(e.to_string())
    } else {
      ProviderError::Http(e.to_string())
    }
  }
}

impl CalendarProvider for HttpCalendarProvider {
  /// `GET {base}/events?start=<date>&end=<date>`
  async fn fetch_events(&self, range: DateRange) -> Result<Vec<CalendarEvent>, ProviderError> {
    let resp = self
      .client
      .get(self.url("/events"))
      .query(&[
        ("start", range.start.format("%Y-%m-%d").to_string()),
        ("end", range.end.format("%Y-%m-%d").to_string()),
      ])
      .send()
      .await
      .map_err(|e| self.classify_error(e))?;

    if !resp.status().is_success() {
      return Err(ProviderError::Http(format!("GET /events → {}", resp.status())));
    }
    resp.json().await.map_err(|e| self.classify_error(e))
  }
}
