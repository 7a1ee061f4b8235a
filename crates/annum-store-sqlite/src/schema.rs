//! SQL schema for the Annum SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS special_dates (
    id            TEXT PRIMARY KEY,
    owner_id      TEXT NOT NULL,
    subject_name  TEXT NOT NULL,
    category      TEXT NOT NULL,   -- 'birthday' | 'anniversary' | ... | 'custom'
    custom_label  TEXT,
    month         INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
    day           INTEGER NOT NULL CHECK (day BETWEEN 1 AND 31),
    known_year    INTEGER,
    icon          TEXT NOT NULL,
    source_origin TEXT NOT NULL,   -- 'manual' | 'imported_external'
    external_id   TEXT,
    created_at    TEXT NOT NULL,   -- RFC 3339 UTC; store-assigned
    updated_at    TEXT NOT NULL,
    active        INTEGER NOT NULL DEFAULT 1
);

-- No duplicate import: one active record per provider event and owner.
CREATE UNIQUE INDEX IF NOT EXISTS special_dates_external_idx
    ON special_dates(owner_id, external_id)
    WHERE active = 1 AND external_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS special_dates_owner_idx
    ON special_dates(owner_id, active);

-- One row per owner; never deleted.
CREATE TABLE IF NOT EXISTS sync_status (
    owner_id      TEXT PRIMARY KEY,
    last_sync_at  TEXT,
    enabled       INTEGER NOT NULL DEFAULT 1,
    total_synced  INTEGER NOT NULL DEFAULT 0,
    last_error    TEXT,
    in_progress   INTEGER NOT NULL DEFAULT 0
);

PRAGMA user_version = 1;
";

/// A fresh process cannot have a pass in flight; clear flags left behind by a
/// process that died mid-sync.
pub const RESET_IN_PROGRESS: &str =
  "UPDATE sync_status SET in_progress = 0 WHERE in_progress = 1";
