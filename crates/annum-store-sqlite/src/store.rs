//! [`SqliteStore`], the SQLite implementation of [`EventStore`].

use std::path::Path;

use annum_core::{
  Error as CoreError,
  special_date::{NewSpecialDate, SpecialDate, SpecialDatePatch},
  store::{EventStore, ListFilter},
  sync_status::{SyncClaim, SyncCompletion, SyncStatus},
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    RawSpecialDate, RawSyncStatus, SPECIAL_DATE_COLUMNS, SYNC_STATUS_COLUMNS,
    encode_dt, encode_uuid,
  },
  locks::OwnerLocks,
  schema::{RESET_IN_PROGRESS, SCHEMA},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Annum event store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection and lock table are
/// reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  locks: OwnerLocks,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let reset = conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(conn.execute(RESET_IN_PROGRESS, [])?)
      })
      .await?;
    if reset > 0 {
      tracing::warn!(owners = reset, "cleared sync flags left by an interrupted pass");
    }
    Ok(Self { conn, locks: OwnerLocks::default() })
  }

  async fn fetch_sync_status(&self, owner_id: &str) -> Result<Option<SyncStatus>> {
    let owner = owner_id.to_owned();
    let raw: Option<RawSyncStatus> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {SYNC_STATUS_COLUMNS} FROM sync_status WHERE owner_id = ?1"),
            rusqlite::params![owner],
            RawSyncStatus::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawSyncStatus::into_status).transpose()
  }

  /// Write every mutable column of `record` back to its row. The caller holds
  /// the owner's write lock.
  async fn write_back(&self, record: &SpecialDate) -> Result<()> {
    let id_str       = encode_uuid(record.id);
    let subject_name = record.subject_name.clone();
    let category     = record.category.to_string();
    let custom_label = record.custom_label.clone();
    let month        = record.original_date.month;
    let day          = record.original_date.day;
    let known_year   = record.original_date.year;
    let icon         = record.icon.clone();
    let updated_at   = encode_dt(record.updated_at);
    let active       = record.active;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE special_dates SET
             subject_name = ?2, category = ?3, custom_label = ?4,
             month = ?5, day = ?6, known_year = ?7, icon = ?8,
             updated_at = ?9, active = ?10
           WHERE id = ?1",
          rusqlite::params![
            id_str,
            subject_name,
            category,
            custom_label,
            month,
            day,
            known_year,
            icon,
            updated_at,
            active,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Look up an active record, failing with `NotFound` otherwise.
  async fn require_active(&self, id: Uuid) -> Result<SpecialDate> {
    match self.get(id).await? {
      Some(record) if record.active => Ok(record),
      _ => Err(CoreError::NotFound(id).into()),
    }
  }
}

// ─── EventStore impl ─────────────────────────────────────────────────────────

impl EventStore for SqliteStore {
  type Error = crate::Error;

  // ── Special dates ─────────────────────────────────────────────────────────

  async fn create(&self, input: NewSpecialDate) -> Result<SpecialDate> {
    input.validate()?;
    let record = input.into_special_date(Uuid::new_v4(), Utc::now());

    let id_str        = encode_uuid(record.id);
    let owner_id      = record.owner_id.clone();
    let subject_name  = record.subject_name.clone();
    let category      = record.category.to_string();
    let custom_label  = record.custom_label.clone();
    let month         = record.original_date.month;
    let day           = record.original_date.day;
    let known_year    = record.original_date.year;
    let icon          = record.icon.clone();
    let source_origin = record.source_origin.to_string();
    let external_id   = record.external_id.clone();
    let created_at    = encode_dt(record.created_at);
    let updated_at    = encode_dt(record.updated_at);

    let _guard = self.locks.acquire(&record.owner_id).await;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO special_dates (
             id, owner_id, subject_name, category, custom_label,
             month, day, known_year, icon, source_origin, external_id,
             created_at, updated_at, active
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1)",
          rusqlite::params![
            id_str,
            owner_id,
            subject_name,
            category,
            custom_label,
            month,
            day,
            known_year,
            icon,
            source_origin,
            external_id,
            created_at,
            updated_at,
          ],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(id = %record.id, owner_id = %record.owner_id, "created special date");
    Ok(record)
  }

  async fn update(&self, id: Uuid, patch: &SpecialDatePatch) -> Result<SpecialDate> {
    let owner_id = self.require_active(id).await?.owner_id;
    let _guard = self.locks.acquire(&owner_id).await;

    // Re-read under the lock so a concurrent writer's change is not lost.
    let current = self.require_active(id).await?;
    let mut next = patch.apply_to(&current)?;
    if next == current {
      return Ok(current);
    }
    next.updated_at = Utc::now();
    self.write_back(&next).await?;

    tracing::debug!(%id, owner_id = %next.owner_id, "updated special date");
    Ok(next)
  }

  async fn soft_delete(&self, id: Uuid) -> Result<()> {
    let owner_id = self.require_active(id).await?.owner_id;
    let _guard = self.locks.acquire(&owner_id).await;

    let mut record = self.require_active(id).await?;
    record.active = false;
    record.updated_at = Utc::now();
    self.write_back(&record).await?;

    tracing::debug!(%id, %owner_id, "soft-deleted special date");
    Ok(())
  }

  async fn get(&self, id: Uuid) -> Result<Option<SpecialDate>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawSpecialDate> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {SPECIAL_DATE_COLUMNS} FROM special_dates WHERE id = ?1"),
            rusqlite::params![id_str],
            RawSpecialDate::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawSpecialDate::into_special_date).transpose()
  }

  async fn list(&self, owner_id: &str, filter: &ListFilter) -> Result<Vec<SpecialDate>> {
    let owner    = owner_id.to_owned();
    let category = filter.category.map(|c| c.to_string());
    let origin   = filter.origin.map(|o| o.to_string());

    let raws: Vec<RawSpecialDate> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SPECIAL_DATE_COLUMNS} FROM special_dates
           WHERE owner_id = ?1 AND active = 1
             AND (?2 IS NULL OR category = ?2)
             AND (?3 IS NULL OR source_origin = ?3)"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![owner, category, origin],
            RawSpecialDate::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSpecialDate::into_special_date).collect()
  }

  async fn find_by_external_id(
    &self,
    owner_id: &str,
    external_id: &str,
  ) -> Result<Option<SpecialDate>> {
    let owner    = owner_id.to_owned();
    let external = external_id.to_owned();

    let raw: Option<RawSpecialDate> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {SPECIAL_DATE_COLUMNS} FROM special_dates
               WHERE owner_id = ?1 AND external_id = ?2
               ORDER BY active DESC, updated_at DESC
               LIMIT 1"
            ),
            rusqlite::params![owner, external],
            RawSpecialDate::from_row,
          )
          .optional()?)
      })
      .await?;
    raw.map(RawSpecialDate::into_special_date).transpose()
  }

  // ── Sync status ───────────────────────────────────────────────────────────

  async fn sync_status(&self, owner_id: &str) -> Result<Option<SyncStatus>> {
    self.fetch_sync_status(owner_id).await
  }

  async fn begin_sync(&self, owner_id: &str) -> Result<SyncClaim> {
    let _guard = self.locks.acquire(owner_id).await;
    let owner = owner_id.to_owned();

    let (raw, claimed): (RawSyncStatus, bool) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT OR IGNORE INTO sync_status (owner_id) VALUES (?1)",
          rusqlite::params![owner],
        )?;
        let claimed = tx.execute(
          "UPDATE sync_status SET in_progress = 1
           WHERE owner_id = ?1 AND in_progress = 0",
          rusqlite::params![owner],
        )? == 1;
        let raw = tx.query_row(
          &format!("SELECT {SYNC_STATUS_COLUMNS} FROM sync_status WHERE owner_id = ?1"),
          rusqlite::params![owner],
          RawSyncStatus::from_row,
        )?;
        tx.commit()?;
        Ok((raw, claimed))
      })
      .await?;

    let status = raw.into_status()?;
    Ok(if claimed {
      SyncClaim::Claimed(status)
    } else {
      SyncClaim::AlreadyRunning(status)
    })
  }

  async fn finish_sync(
    &self,
    owner_id: &str,
    completion: SyncCompletion,
  ) -> Result<SyncStatus> {
    let _guard = self.locks.acquire(owner_id).await;
    let owner       = owner_id.to_owned();
    let finished_at = encode_dt(completion.finished_at);
    let total       = completion
      .total_synced
      .map(|t| i64::try_from(t).unwrap_or(i64::MAX));
    let last_error  = completion.last_error;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sync_status (owner_id, last_sync_at, total_synced, last_error, in_progress)
           VALUES (?1, ?2, COALESCE(?3, 0), ?4, 0)
           ON CONFLICT (owner_id) DO UPDATE SET
             last_sync_at = excluded.last_sync_at,
             total_synced = COALESCE(?3, sync_status.total_synced),
             last_error   = excluded.last_error,
             in_progress  = 0",
          rusqlite::params![owner, finished_at, total, last_error],
        )?;
        Ok(())
      })
      .await?;

    self
      .fetch_sync_status(owner_id)
      .await?
      .ok_or_else(|| crate::Error::MissingRow(format!("sync status for {owner_id}")))
  }

  async fn set_sync_enabled(&self, owner_id: &str, enabled: bool) -> Result<SyncStatus> {
    let _guard = self.locks.acquire(owner_id).await;
    let owner = owner_id.to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sync_status (owner_id, enabled) VALUES (?1, ?2)
           ON CONFLICT (owner_id) DO UPDATE SET enabled = excluded.enabled",
          rusqlite::params![owner, enabled],
        )?;
        Ok(())
      })
      .await?;

    tracing::info!(%owner_id, enabled, "calendar sync toggled");
    self
      .fetch_sync_status(owner_id)
      .await?
      .ok_or_else(|| crate::Error::MissingRow(format!("sync status for {owner_id}")))
  }
}
