//! Encoding and decoding helpers between domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, UUIDs as hyphenated lowercase
//! strings, enums by their snake_case names, and booleans as 0/1 integers.

use std::str::FromStr;

use annum_core::{
  category::Category,
  date::OriginalDate,
  special_date::{SourceOrigin, SpecialDate},
  sync_status::SyncStatus,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_enum<T: FromStr>(column: &'static str, value: String) -> Result<T> {
  T::from_str(&value).map_err(|_| Error::UnknownValue { column, value })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list shared by every `special_dates` SELECT, in
/// [`RawSpecialDate::from_row`] order.
pub const SPECIAL_DATE_COLUMNS: &str = "id, owner_id, subject_name, category, \
   custom_label, month, day, known_year, icon, source_origin, external_id, \
   created_at, updated_at, active";

/// Raw values read directly from a `special_dates` row.
pub struct RawSpecialDate {
  pub id:            String,
  pub owner_id:      String,
  pub subject_name:  String,
  pub category:      String,
  pub custom_label:  Option<String>,
  pub month:         u32,
  pub day:           u32,
  pub known_year:    Option<i32>,
  pub icon:          String,
  pub source_origin: String,
  pub external_id:   Option<String>,
  pub created_at:    String,
  pub updated_at:    String,
  pub active:        bool,
}

impl RawSpecialDate {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      owner_id:      row.get(1)?,
      subject_name:  row.get(2)?,
      category:      row.get(3)?,
      custom_label:  row.get(4)?,
      month:         row.get(5)?,
      day:           row.get(6)?,
      known_year:    row.get(7)?,
      icon:          row.get(8)?,
      source_origin: row.get(9)?,
      external_id:   row.get(10)?,
      created_at:    row.get(11)?,
      updated_at:    row.get(12)?,
      active:        row.get(13)?,
    })
  }

  pub fn into_special_date(self) -> Result<SpecialDate> {
    Ok(SpecialDate {
      id:            decode_uuid(&self.id)?,
      owner_id:      self.owner_id,
      subject_name:  self.subject_name,
      category:      decode_enum::<Category>("category", self.category)?,
      custom_label:  self.custom_label,
      original_date: OriginalDate {
        month: self.month,
        day:   self.day,
        year:  self.known_year,
      },
      icon:          self.icon,
      source_origin: decode_enum::<SourceOrigin>(
        "source_origin",
        self.source_origin,
      )?,
      external_id:   self.external_id,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
      active:        self.active,
    })
  }
}

/// Column list for `sync_status` SELECTs, in [`RawSyncStatus::from_row`]
/// order.
pub const SYNC_STATUS_COLUMNS: &str =
  "owner_id, last_sync_at, enabled, total_synced, last_error, in_progress";

/// Raw values read directly from a `sync_status` row.
pub struct RawSyncStatus {
  pub owner_id:     String,
  pub last_sync_at: Option<String>,
  pub enabled:      bool,
  pub total_synced: i64,
  pub last_error:   Option<String>,
  pub in_progress:  bool,
}

impl RawSyncStatus {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      owner_id:     row.get(0)?,
      last_sync_at: row.get(1)?,
      enabled:      row.get(2)?,
      total_synced: row.get(3)?,
      last_error:   row.get(4)?,
      in_progress:  row.get(5)?,
    })
  }

  pub fn into_status(self) -> Result<SyncStatus> {
    Ok(SyncStatus {
      owner_id:     self.owner_id,
      last_sync_at: self.last_sync_at.as_deref().map(decode_dt).transpose()?,
      enabled:      self.enabled,
      total_synced: u64::try_from(self.total_synced).unwrap_or_default(),
      last_error:   self.last_error,
      in_progress:  self.in_progress,
    })
  }
}
