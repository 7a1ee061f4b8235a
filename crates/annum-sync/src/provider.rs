//! The inbound interfaces: a calendar provider and a permission subsystem.

use std::future::Future;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ProviderError;

// ─── Events ──────────────────────────────────────────────────────────────────

/// An inclusive range of calendar days to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
  pub start: NaiveDate,
  pub end:   NaiveDate,
}

impl DateRange {
  /// `lookback_days` before `today` through `lookahead_days` after it.
  pub fn around(today: NaiveDate, lookback_days: u32, lookahead_days: u32) -> Self {
    Self {
      start: today
        .checked_sub_days(Days::new(lookback_days.into()))
        .unwrap_or(NaiveDate::MIN),
      end:   today
        .checked_add_days(Days::new(lookahead_days.into()))
        .unwrap_or(NaiveDate::MAX),
    }
  }
}

/// A candidate event as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
  /// Provider-assigned id; stable across fetches and shared by all
  /// instances of a recurring event.
  pub external_id:      String,
  pub title:            String,
  /// The day the instance falls on, in the owner's timezone.
  pub start_date:       NaiveDate,
  #[serde(default)]
  pub is_all_day:       bool,
  #[serde(default)]
  pub calendar_label:   String,
  /// Provider-native "this is a birthday" flag, when the provider has one.
  #[serde(default)]
  pub is_birthday_hint: Option<bool>,
}

/// Fetches candidate events from an external calendar.
pub trait CalendarProvider: Send + Sync {
  fn fetch_events(
    &self,
    range: DateRange,
  ) -> impl Future<Output = Result<Vec<CalendarEvent>, ProviderError>> + Send + '_;
}

// ─── Permission ──────────────────────────────────────────────────────────────

/// Calendar access as reported by the platform's permission subsystem.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PermissionStatus {
  #[default]
  NotDetermined,
  Authorized,
  Denied,
  Restricted,
}

/// The platform permission subsystem.
pub trait PermissionGate: Send + Sync {
  fn permission_status(&self) -> PermissionStatus;

  /// Prompt for access; resolves to whether it was granted.
  fn request_access(&self) -> impl Future<Output = bool> + Send + '_;
}

/// A [`PermissionGate`] whose answer is fixed by configuration, for providers
/// without an interactive grant flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfiguredPermission {
  pub status: PermissionStatus,
}

impl PermissionGate for ConfiguredPermission {
  fn permission_status(&self) -> PermissionStatus { self.status }

  async fn request_access(&self) -> bool {
    self.status == PermissionStatus::Authorized
  }
}
