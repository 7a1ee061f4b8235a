//! The reconciliation pass: fetch candidates, merge them into the store by
//! external id, and record the outcome in the owner's sync status.

use std::{
  collections::{HashMap, HashSet},
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use annum_core::{
  date::MonthDay,
  special_date::{NewSpecialDate, SpecialDate, SpecialDatePatch},
  store::EventStore,
  sync_status::{SyncClaim, SyncCompletion, SyncStatus},
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
  classify::Classifier,
  error::{CandidateFailure, PartialSyncError, ProviderError, Result, SyncError},
  machine::{SyncEvent, SyncMachine, SyncPhase},
  provider::{
    CalendarEvent, CalendarProvider, DateRange, PermissionGate, PermissionStatus,
  },
};

/// Recorded as `last_error` when a pass is dropped after claiming the
/// in-progress flag.
const CANCELLED: &str = "sync cancelled before completion";

type Machines = Mutex<HashMap<String, SyncMachine>>;

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SyncConfig {
  /// Upper bound on a single provider fetch.
  pub fetch_timeout:  Duration,
  pub lookback_days:  u32,
  pub lookahead_days: u32,
  pub classifier:     Classifier,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      fetch_timeout:  Duration::from_secs(30),
      lookback_days:  1,
      lookahead_days: 366,
      classifier:     Classifier::default(),
    }
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// What one call to [`Reconciler::sync`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
  /// The owner's sync status after the call.
  pub status:    SyncStatus,
  pub created:   usize,
  pub updated:   usize,
  pub unchanged: usize,
  /// Candidates that were not occasions, or whose record the user deleted.
  pub skipped:   usize,
  pub partial:   Option<PartialSyncError>,
  /// Another pass was already running; this call did nothing.
  pub coalesced: bool,
}

impl SyncReport {
  fn coalesced(status: SyncStatus) -> Self {
    Self {
      status,
      created: 0,
      updated: 0,
      unchanged: 0,
      skipped: 0,
      partial: None,
      coalesced: true,
    }
  }
}

#[derive(Debug, Default)]
struct Tally {
  created:   usize,
  updated:   usize,
  unchanged: usize,
  skipped:   usize,
  attempted: usize,
  failures:  Vec<CandidateFailure>,
}

enum Merged {
  Created,
  Updated,
  Unchanged,
  Skipped,
}

enum Reservation {
  Started,
  AlreadySyncing,
  NeedsPermission,
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Drives calendar imports for any number of owners, one state machine per
/// owner.
pub struct Reconciler<S, P, G> {
  store:      Arc<S>,
  provider:   Arc<P>,
  permission: Arc<G>,
  config:     SyncConfig,
  machines:   Machines,
}

impl<S, P, G> Reconciler<S, P, G>
where
  S: EventStore + 'static,
  P: CalendarProvider,
  G: PermissionGate,
{
  pub fn new(
    store: Arc<S>,
    provider: Arc<P>,
    permission: Arc<G>,
    config: SyncConfig,
  ) -> Self {
    Self { store, provider, permission, config, machines: Mutex::new(HashMap::new()) }
  }

  pub fn config(&self) -> &SyncConfig { &self.config }

  /// The owner's current phase; `Idle` for owners never seen.
  pub fn phase(&self, owner_id: &str) -> SyncPhase {
    lock(&self.machines)
      .get(owner_id)
      .map(SyncMachine::phase)
      .unwrap_or_default()
  }

  /// The owner's stored sync status, or a fresh one if they never synced.
  pub async fn status(&self, owner_id: &str) -> Result<SyncStatus> {
    Ok(
      self
        .store
        .sync_status(owner_id)
        .await
        .map_err(SyncError::store)?
        .unwrap_or_else(|| SyncStatus::new(owner_id)),
    )
  }

  /// Enable or disable imports for an owner.
  pub async fn set_enabled(&self, owner_id: &str, enabled: bool) -> Result<SyncStatus> {
    self
      .store
      .set_sync_enabled(owner_id, enabled)
      .await
      .map_err(SyncError::store)
  }

  /// Obtain calendar access for `owner_id`.
  ///
  /// Prompts only when the permission was never determined. Once denied or
  /// restricted, the status is re-read but never re-prompted, so a grant
  /// made out of band is picked up.
  #[instrument(skip(self))]
  pub async fn request_access(&self, owner_id: &str) -> Result<SyncPhase> {
    let machine = self.machine(owner_id);
    if machine.is_authorized() {
      return Ok(machine.phase());
    }
    match machine.phase() {
      SyncPhase::Denied | SyncPhase::Restricted => {
        return self.observe_permission(owner_id);
      }
      SyncPhase::Requesting => {
        return Err(SyncError::InvalidTransition {
          from:  SyncPhase::Requesting,
          event: "request access",
        });
      }
      _ => {}
    }

    if self.permission.permission_status() != PermissionStatus::NotDetermined {
      return self.observe_permission(owner_id);
    }

    self.transition(owner_id, SyncEvent::RequestAccess)?;
    let mut prompt = PhaseGuard::new(&self.machines, owner_id);
    let granted = self.permission.request_access().await;
    prompt.disarm();

    if granted {
      info!("calendar access granted");
      self.transition(owner_id, SyncEvent::AccessGranted)
    } else {
      info!("calendar access denied");
      self.transition(owner_id, SyncEvent::AccessDenied)?;
      Err(SyncError::Access(PermissionStatus::Denied))
    }
  }

  /// Run one import pass for `owner_id`, using `today` to place the fetch
  /// window.
  ///
  /// At most one pass per owner runs at a time. A call that finds a pass
  /// already running returns immediately with `coalesced` set and touches
  /// nothing. Provider failures are recorded in the sync status and
  /// returned; the previous total is kept. Per-candidate failures do not
  /// abort the pass and are reported in [`SyncReport::partial`].
  #[instrument(skip(self))]
  pub async fn sync(&self, owner_id: &str, today: NaiveDate) -> Result<SyncReport> {
    let mut reservation = self.reserve(owner_id)?;
    if let Reservation::NeedsPermission = reservation {
      self.observe_permission(owner_id)?;
      reservation = self.reserve(owner_id)?;
    }
    match reservation {
      Reservation::Started => {}
      Reservation::AlreadySyncing => {
        debug!("pass already running in this process");
        return Ok(SyncReport::coalesced(self.status(owner_id).await?));
      }
      Reservation::NeedsPermission => {
        return Err(SyncError::Access(self.permission.permission_status()));
      }
    }
    let mut phase = PhaseGuard::new(&self.machines, owner_id);

    let current = self.store.sync_status(owner_id).await.map_err(SyncError::store)?;
    if current.is_some_and(|s| !s.enabled) {
      return Err(SyncError::Disabled(owner_id.to_owned()));
    }

    match self.store.begin_sync(owner_id).await.map_err(SyncError::store)? {
      SyncClaim::Claimed(_) => {}
      SyncClaim::AlreadyRunning(status) => {
        debug!("pass already running elsewhere");
        return Ok(SyncReport::coalesced(status));
      }
    }
    let mut claim = ClaimGuard { store: Arc::clone(&self.store), owner_id, armed: true };

    let events = match self.fetch(today).await {
      Ok(events) => events,
      Err(e) => {
        warn!(error = %e, "calendar fetch failed");
        self.finish(owner_id, None, Some(e.to_string())).await?;
        claim.disarm();
        phase.disarm();
        self.settle(owner_id, SyncEvent::SyncFailed)?;
        return Err(e.into());
      }
    };
    debug!(fetched = events.len(), "calendar events fetched");

    let tally = self.merge(owner_id, events).await;
    let merged = tally.created + tally.updated + tally.unchanged;
    let partial = (!tally.failures.is_empty()).then(|| PartialSyncError {
      attempted: tally.attempted,
      failures:  tally.failures,
    });

    let status = self
      .finish(
        owner_id,
        Some(u64::try_from(merged).unwrap_or(u64::MAX)),
        partial.as_ref().map(ToString::to_string),
      )
      .await?;
    claim.disarm();
    phase.disarm();
    self.settle(owner_id, SyncEvent::SyncSucceeded)?;

    info!(
      created = tally.created,
      updated = tally.updated,
      unchanged = tally.unchanged,
      skipped = tally.skipped,
      failed = partial.as_ref().map_or(0, |p| p.failures.len()),
      "calendar sync finished"
    );

    Ok(SyncReport {
      status,
      created: tally.created,
      updated: tally.updated,
      unchanged: tally.unchanged,
      skipped: tally.skipped,
      partial,
      coalesced: false,
    })
  }

  // ── Internals ─────────────────────────────────────────────────────────

  fn machine(&self, owner_id: &str) -> SyncMachine {
    lock(&self.machines).get(owner_id).copied().unwrap_or_default()
  }

  fn transition(&self, owner_id: &str, event: SyncEvent) -> Result<SyncPhase> {
    lock(&self.machines)
      .entry(owner_id.to_owned())
      .or_default()
      .apply(event)
  }

  /// Record the outcome of a pass and return to `Idle` in one step.
  fn settle(&self, owner_id: &str, outcome: SyncEvent) -> Result<SyncPhase> {
    let mut machines = lock(&self.machines);
    let machine = machines.entry(owner_id.to_owned()).or_default();
    machine.apply(outcome)?;
    machine.apply(SyncEvent::Settle)
  }

  /// Move the owner's machine into `Syncing` if it is allowed to sync.
  fn reserve(&self, owner_id: &str) -> Result<Reservation> {
    let mut machines = lock(&self.machines);
    let machine = machines.entry(owner_id.to_owned()).or_default();
    if machine.phase() == SyncPhase::Syncing {
      return Ok(Reservation::AlreadySyncing);
    }
    if !machine.can_sync() {
      return Ok(Reservation::NeedsPermission);
    }
    machine.apply(SyncEvent::BeginSync)?;
    Ok(Reservation::Started)
  }

  /// Feed the permission subsystem's current answer into the machine.
  fn observe_permission(&self, owner_id: &str) -> Result<SyncPhase> {
    let status = self.permission.permission_status();
    match status {
      PermissionStatus::Authorized => self.transition(owner_id, SyncEvent::AccessGranted),
      PermissionStatus::Denied => {
        self.transition(owner_id, SyncEvent::AccessDenied)?;
        Err(SyncError::Access(status))
      }
      PermissionStatus::Restricted => {
        self.transition(owner_id, SyncEvent::AccessRestricted)?;
        Err(SyncError::Access(status))
      }
      PermissionStatus::NotDetermined => Err(SyncError::Access(status)),
    }
  }

  async fn fetch(&self, today: NaiveDate) -> Result<Vec<CalendarEvent>, ProviderError> {
    let range = DateRange::around(today, self.config.lookback_days, self.config.lookahead_days);
    let limit = self.config.fetch_timeout;
    tokio::time::timeout(limit, self.provider.fetch_events(range))
      .await
      .unwrap_or(Err(ProviderError::Timeout(limit)))
  }

  async fn finish(
    &self,
    owner_id: &str,
    total_synced: Option<u64>,
    last_error: Option<String>,
  ) -> Result<SyncStatus> {
    let completion = SyncCompletion { finished_at: Utc::now(), total_synced, last_error };
    self
      .store
      .finish_sync(owner_id, completion)
      .await
      .map_err(SyncError::store)
  }

  async fn merge(&self, owner_id: &str, events: Vec<CalendarEvent>) -> Tally {
    let mut tally = Tally::default();
    let mut seen = HashSet::new();

    for event in events {
      if !seen.insert(event.external_id.clone()) {
        debug!(external_id = %event.external_id, "duplicate candidate ignored");
        continue;
      }
      let Some(input) = self.config.classifier.to_special_date(owner_id, &event) else {
        tally.skipped += 1;
        continue;
      };
      tally.attempted += 1;

      match self.merge_one(owner_id, &event.external_id, input).await {
        Ok(Merged::Created) => tally.created += 1,
        Ok(Merged::Updated) => tally.updated += 1,
        Ok(Merged::Unchanged) => tally.unchanged += 1,
        Ok(Merged::Skipped) => tally.skipped += 1,
        Err(reason) => {
          debug!(external_id = %event.external_id, %reason, "candidate failed to merge");
          tally.failures.push(CandidateFailure { external_id: event.external_id, reason });
        }
      }
    }
    tally
  }

  async fn merge_one(
    &self,
    owner_id: &str,
    external_id: &str,
    input: NewSpecialDate,
  ) -> Result<Merged, String> {
    input.validate().map_err(|e| e.to_string())?;

    let existing = self
      .store
      .find_by_external_id(owner_id, external_id)
      .await
      .map_err(|e| e.to_string())?;

    match existing {
      // Deleted by the user; imports never resurrect it.
      Some(record) if !record.active => Ok(Merged::Skipped),
      Some(record) => {
        let patch = refresh_patch(&record, &input);
        if patch.is_empty() {
          return Ok(Merged::Unchanged);
        }
        self.store.update(record.id, &patch).await.map_err(|e| e.to_string())?;
        Ok(Merged::Updated)
      }
      None => {
        self.store.create(input).await.map_err(|e| e.to_string())?;
        Ok(Merged::Created)
      }
    }
  }
}

/// The fields of `record` that differ from a fresh import. A moved date is
/// sent as a month/day only, so the store resolves the known year against
/// the record it re-reads under the owner lock.
fn refresh_patch(record: &SpecialDate, input: &NewSpecialDate) -> SpecialDatePatch {
  let mut patch = SpecialDatePatch::default();
  if record.subject_name != input.subject_name {
    patch.subject_name = Some(input.subject_name.clone());
  }
  if record.category != input.category {
    patch.category = Some(input.category);
  }
  if record.custom_label != input.custom_label {
    patch.custom_label = Some(input.custom_label.clone());
  }
  let current = &record.original_date;
  let fresh = &input.original_date;
  if (current.month, current.day) != (fresh.month, fresh.day) {
    patch.recurrence = Some(MonthDay { month: fresh.month, day: fresh.day });
  }
  patch
}

fn lock(machines: &Machines) -> MutexGuard<'_, HashMap<String, SyncMachine>> {
  machines.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Cancellation ────────────────────────────────────────────────────────────

/// Returns the owner's machine to `Idle` if a prompt or pass is dropped
/// midway.
struct PhaseGuard<'a> {
  machines: &'a Machines,
  owner_id: &'a str,
  armed:    bool,
}

impl<'a> PhaseGuard<'a> {
  fn new(machines: &'a Machines, owner_id: &'a str) -> Self {
    Self { machines, owner_id, armed: true }
  }

  fn disarm(&mut self) { self.armed = false; }
}

impl Drop for PhaseGuard<'_> {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    if let Some(machine) = lock(self.machines).get_mut(self.owner_id) {
      let _ = machine.apply(SyncEvent::Abandon);
    }
  }
}

/// Clears the stored in-progress flag if a pass is dropped after claiming
/// it.
struct ClaimGuard<'a, S: EventStore + 'static> {
  store:    Arc<S>,
  owner_id: &'a str,
  armed:    bool,
}

impl<S: EventStore + 'static> ClaimGuard<'_, S> {
  fn disarm(&mut self) { self.armed = false; }
}

impl<S: EventStore + 'static> Drop for ClaimGuard<'_, S> {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      return;
    };
    let store = Arc::clone(&self.store);
    let owner_id = self.owner_id.to_owned();
    warn!(%owner_id, "sync pass dropped; releasing in-progress flag");
    runtime.spawn(async move {
      let completion = SyncCompletion {
        finished_at:  Utc::now(),
        total_synced: None,
        last_error:   Some(CANCELLED.to_owned()),
      };
      if let Err(e) = store.finish_sync(&owner_id, completion).await {
        warn!(%owner_id, error = %e, "failed to release in-progress flag");
      }
    });
  }
}
