//! Reconciler tests against an in-memory SQLite store.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use annum_core::{
  category::Category,
  date::OriginalDate,
  special_date::{NewSpecialDate, SourceOrigin, SpecialDate, SpecialDatePatch},
  store::{EventStore, ListFilter},
  sync_status::{SyncClaim, SyncCompletion, SyncStatus},
};
use annum_store_sqlite::SqliteStore;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  ProviderError, Reconciler, SyncConfig, SyncError, SyncPhase,
  provider::{CalendarEvent, CalendarProvider, DateRange, PermissionGate, PermissionStatus},
};

const OWNER: &str = "owner-1";

// ─── Doubles ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MockProvider {
  events: Mutex<Vec<CalendarEvent>>,
  delay:  Option<Duration>,
  fail:   Option<ProviderError>,
  calls:  AtomicUsize,
  ranges: Mutex<Vec<DateRange>>,
}

impl MockProvider {
  fn with_events(events: Vec<CalendarEvent>) -> Self {
    Self { events: Mutex::new(events), ..Self::default() }
  }

  fn set_events(&self, events: Vec<CalendarEvent>) {
    *self.events.lock().unwrap() = events;
  }

  fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

impl CalendarProvider for MockProvider {
  async fn fetch_events(&self, range: DateRange) -> Result<Vec<CalendarEvent>, ProviderError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.ranges.lock().unwrap().push(range);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    match &self.fail {
      Some(e) => Err(e.clone()),
      None => Ok(self.events.lock().unwrap().clone()),
    }
  }
}

struct MockPermission {
  status:  Mutex<PermissionStatus>,
  grant:   bool,
  prompts: AtomicUsize,
}

impl MockPermission {
  fn new(status: PermissionStatus, grant: bool) -> Self {
    Self { status: Mutex::new(status), grant, prompts: AtomicUsize::new(0) }
  }

  fn authorized() -> Self { Self::new(PermissionStatus::Authorized, true) }

  fn set(&self, status: PermissionStatus) { *self.status.lock().unwrap() = status; }

  fn prompts(&self) -> usize { self.prompts.load(Ordering::SeqCst) }
}

impl PermissionGate for MockPermission {
  fn permission_status(&self) -> PermissionStatus { *self.status.lock().unwrap() }

  async fn request_access(&self) -> bool {
    self.prompts.fetch_add(1, Ordering::SeqCst);
    if self.grant {
      self.set(PermissionStatus::Authorized);
    } else {
      self.set(PermissionStatus::Denied);
    }
    self.grant
  }
}

/// Lands a pending manual edit right after the reconciler reads a record by
/// external id, so the reconciler's copy is stale by the time it writes.
struct EditAfterRead {
  inner: SqliteStore,
  edit:  Mutex<Option<SpecialDatePatch>>,
}

impl EventStore for EditAfterRead {
  type Error = annum_store_sqlite::Error;

  async fn create(&self, input: NewSpecialDate) -> Result<SpecialDate, Self::Error> {
    self.inner.create(input).await
  }

  async fn update(
    &self,
    id: Uuid,
    patch: &SpecialDatePatch,
  ) -> Result<SpecialDate, Self::Error> {
    self.inner.update(id, patch).await
  }

  async fn soft_delete(&self, id: Uuid) -> Result<(), Self::Error> {
    self.inner.soft_delete(id).await
  }

  async fn get(&self, id: Uuid) -> Result<Option<SpecialDate>, Self::Error> {
    self.inner.get(id).await
  }

  async fn list(
    &self,
    owner_id: &str,
    filter: &ListFilter,
  ) -> Result<Vec<SpecialDate>, Self::Error> {
    self.inner.list(owner_id, filter).await
  }

  async fn find_by_external_id(
    &self,
    owner_id: &str,
    external_id: &str,
  ) -> Result<Option<SpecialDate>, Self::Error> {
    let read = self.inner.find_by_external_id(owner_id, external_id).await?;
    let edit = self.edit.lock().unwrap().take();
    if let (Some(record), Some(patch)) = (&read, edit) {
      self.inner.update(record.id, &patch).await?;
    }
    Ok(read)
  }

  async fn sync_status(&self, owner_id: &str) -> Result<Option<SyncStatus>, Self::Error> {
    self.inner.sync_status(owner_id).await
  }

  async fn begin_sync(&self, owner_id: &str) -> Result<SyncClaim, Self::Error> {
    self.inner.begin_sync(owner_id).await
  }

  async fn finish_sync(
    &self,
    owner_id: &str,
    completion: SyncCompletion,
  ) -> Result<SyncStatus, Self::Error> {
    self.inner.finish_sync(owner_id, completion).await
  }

  async fn set_sync_enabled(
    &self,
    owner_id: &str,
    enabled: bool,
  ) -> Result<SyncStatus, Self::Error> {
    self.inner.set_sync_enabled(owner_id, enabled).await
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

type TestReconciler = Reconciler<SqliteStore, MockProvider, MockPermission>;

struct Harness {
  store:      Arc<SqliteStore>,
  provider:   Arc<MockProvider>,
  permission: Arc<MockPermission>,
  reconciler: TestReconciler,
}

async fn harness(provider: MockProvider, permission: MockPermission) -> Harness {
  harness_with(provider, permission, SyncConfig::default()).await
}

async fn harness_with(
  provider: MockProvider,
  permission: MockPermission,
  config: SyncConfig,
) -> Harness {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let provider = Arc::new(provider);
  let permission = Arc::new(permission);
  let reconciler = Reconciler::new(
    Arc::clone(&store),
    Arc::clone(&provider),
    Arc::clone(&permission),
    config,
  );
  Harness { store, provider, permission, reconciler }
}

fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2025, 9, 18).unwrap() }

fn event(id: &str, title: &str, month: u32, day: u32) -> CalendarEvent {
  CalendarEvent {
    external_id:      id.into(),
    title:            title.into(),
    start_date:       NaiveDate::from_ymd_opt(2025, month, day).unwrap(),
    is_all_day:       true,
    calendar_label:   String::new(),
    is_birthday_hint: None,
  }
}

fn three_birthdays() -> Vec<CalendarEvent> {
  vec![
    event("e1", "Ada's Birthday", 9, 18),
    event("e2", "Grace's Birthday", 12, 9),
    event("e3", "Mum & Dad Anniversary", 6, 1),
  ]
}

async fn active(h: &Harness) -> Vec<annum_core::special_date::SpecialDate> {
  h.store.list(OWNER, &ListFilter::default()).await.unwrap()
}

// ─── Access ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn prompts_once_when_undetermined() {
  let h = harness(
    MockProvider::default(),
    MockPermission::new(PermissionStatus::NotDetermined, true),
  )
  .await;

  assert_eq!(h.reconciler.request_access(OWNER).await.unwrap(), SyncPhase::Authorized);
  assert_eq!(h.reconciler.request_access(OWNER).await.unwrap(), SyncPhase::Authorized);
  assert_eq!(h.permission.prompts(), 1);
}

#[tokio::test]
async fn denied_is_not_prompted_again() {
  let h = harness(
    MockProvider::default(),
    MockPermission::new(PermissionStatus::NotDetermined, false),
  )
  .await;

  let err = h.reconciler.request_access(OWNER).await.unwrap_err();
  assert!(matches!(err, SyncError::Access(PermissionStatus::Denied)));
  assert_eq!(h.reconciler.phase(OWNER), SyncPhase::Denied);

  let err = h.reconciler.request_access(OWNER).await.unwrap_err();
  assert!(matches!(err, SyncError::Access(PermissionStatus::Denied)));
  assert_eq!(h.permission.prompts(), 1);

  // Granted out of band.
  h.permission.set(PermissionStatus::Authorized);
  assert_eq!(h.reconciler.request_access(OWNER).await.unwrap(), SyncPhase::Authorized);
  assert_eq!(h.permission.prompts(), 1);
}

#[tokio::test]
async fn sync_without_access_fails_without_fetching() {
  let h = harness(
    MockProvider::with_events(three_birthdays()),
    MockPermission::new(PermissionStatus::Restricted, false),
  )
  .await;

  let err = h.reconciler.sync(OWNER, today()).await.unwrap_err();
  assert!(matches!(err, SyncError::Access(PermissionStatus::Restricted)));
  assert_eq!(h.reconciler.phase(OWNER), SyncPhase::Restricted);
  assert_eq!(h.provider.calls(), 0);
  assert_eq!(h.permission.prompts(), 0);
  assert!(active(&h).await.is_empty());
}

// ─── Merging ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_syncs_do_not_duplicate() {
  let h = harness(MockProvider::with_events(three_birthdays()), MockPermission::authorized()).await;

  let first = h.reconciler.sync(OWNER, today()).await.unwrap();
  assert_eq!(first.created, 3);
  assert_eq!(first.status.total_synced, 3);
  assert!(!first.status.in_progress);
  assert!(first.status.last_sync_at.is_some());
  assert_eq!(first.status.last_error, None);

  let second = h.reconciler.sync(OWNER, today()).await.unwrap();
  assert_eq!(second.created, 0);
  assert_eq!(second.unchanged, 3);
  assert_eq!(second.status.total_synced, 3);

  let records = active(&h).await;
  assert_eq!(records.len(), 3);
  assert!(records.iter().all(|r| r.source_origin == SourceOrigin::ImportedExternal));
  assert_eq!(h.reconciler.phase(OWNER), SyncPhase::Idle);
  assert_eq!(h.provider.calls(), 2);
}

#[tokio::test]
async fn imported_records_are_mapped() {
  let h = harness(MockProvider::with_events(three_birthdays()), MockPermission::authorized()).await;
  h.reconciler.sync(OWNER, today()).await.unwrap();

  let ada = h.store.find_by_external_id(OWNER, "e1").await.unwrap().unwrap();
  assert_eq!(ada.subject_name, "Ada");
  assert_eq!(ada.category, Category::Birthday);
  assert_eq!(ada.original_date, OriginalDate::new(9, 18));

  let parents = h.store.find_by_external_id(OWNER, "e3").await.unwrap().unwrap();
  assert_eq!(parents.subject_name, "Mum & Dad");
  assert_eq!(parents.category, Category::Anniversary);
}

#[tokio::test]
async fn fetch_window_surrounds_today() {
  let h = harness(MockProvider::default(), MockPermission::authorized()).await;
  h.reconciler.sync(OWNER, today()).await.unwrap();

  let ranges = h.provider.ranges.lock().unwrap().clone();
  assert_eq!(ranges, vec![DateRange::around(today(), 1, 366)]);
}

#[tokio::test]
async fn non_occasions_and_duplicates_are_skipped() {
  let events = vec![
    event("e1", "Ada's Birthday", 9, 18),
    event("e1", "Ada's Birthday", 9, 18),
    event("e2", "Dentist", 10, 2),
  ];
  let h = harness(MockProvider::with_events(events), MockPermission::authorized()).await;

  let report = h.reconciler.sync(OWNER, today()).await.unwrap();
  assert_eq!(report.created, 1);
  assert_eq!(report.skipped, 1);
  assert_eq!(report.status.total_synced, 1);
  assert_eq!(active(&h).await.len(), 1);
}

#[tokio::test]
async fn upstream_changes_update_in_place() {
  let h = harness(MockProvider::with_events(three_birthdays()), MockPermission::authorized()).await;
  h.reconciler.sync(OWNER, today()).await.unwrap();
  let before = h.store.find_by_external_id(OWNER, "e1").await.unwrap().unwrap();

  let mut events = three_birthdays();
  events[0] = event("e1", "Ada Lovelace's Birthday", 12, 10);
  h.provider.set_events(events);

  let report = h.reconciler.sync(OWNER, today()).await.unwrap();
  assert_eq!(report.updated, 1);
  assert_eq!(report.unchanged, 2);

  let after = h.store.find_by_external_id(OWNER, "e1").await.unwrap().unwrap();
  assert_eq!(after.id, before.id);
  assert_eq!(after.subject_name, "Ada Lovelace");
  assert_eq!(after.original_date, OriginalDate::new(12, 10));
  assert_eq!(active(&h).await.len(), 3);
}

#[tokio::test]
async fn known_year_survives_an_upstream_move() {
  let h = harness(MockProvider::with_events(three_birthdays()), MockPermission::authorized()).await;
  h.reconciler.sync(OWNER, today()).await.unwrap();
  let ada = h.store.find_by_external_id(OWNER, "e1").await.unwrap().unwrap();

  let patch = SpecialDatePatch {
    original_date: Some(OriginalDate::with_year(1990, 9, 18)),
    ..SpecialDatePatch::default()
  };
  h.store.update(ada.id, &patch).await.unwrap();

  let mut events = three_birthdays();
  events[0] = event("e1", "Ada's Birthday", 9, 19);
  h.provider.set_events(events);
  h.reconciler.sync(OWNER, today()).await.unwrap();

  let ada = h.store.get(ada.id).await.unwrap().unwrap();
  assert_eq!(ada.original_date, OriginalDate::with_year(1990, 9, 19));
}

#[tokio::test]
async fn manual_year_edit_during_a_pass_is_kept() {
  let store = Arc::new(EditAfterRead {
    inner: SqliteStore::open_in_memory().await.unwrap(),
    edit:  Mutex::new(None),
  });
  let provider = Arc::new(MockProvider::with_events(vec![event("e1", "Ada's Birthday", 9, 18)]));
  let reconciler = Reconciler::new(
    Arc::clone(&store),
    Arc::clone(&provider),
    Arc::new(MockPermission::authorized()),
    SyncConfig::default(),
  );
  reconciler.sync(OWNER, today()).await.unwrap();

  // The user sets the year while the next pass holds a copy without it.
  *store.edit.lock().unwrap() = Some(SpecialDatePatch {
    original_date: Some(OriginalDate::with_year(1990, 9, 18)),
    ..SpecialDatePatch::default()
  });
  provider.set_events(vec![event("e1", "Ada's Birthday", 9, 19)]);
  let report = reconciler.sync(OWNER, today()).await.unwrap();
  assert_eq!(report.updated, 1);

  let ada = store.find_by_external_id(OWNER, "e1").await.unwrap().unwrap();
  assert_eq!(ada.original_date, OriginalDate::with_year(1990, 9, 19));
}

#[tokio::test]
async fn upstream_reclassification_swaps_default_icon() {
  let h = harness(MockProvider::with_events(three_birthdays()), MockPermission::authorized()).await;
  h.reconciler.sync(OWNER, today()).await.unwrap();
  let ada = h.store.find_by_external_id(OWNER, "e1").await.unwrap().unwrap();
  assert_eq!(ada.icon, Category::Birthday.metadata().icon);

  let mut events = three_birthdays();
  events[0] = event("e1", "Ada & Bob - Anniversary", 9, 18);
  h.provider.set_events(events);
  h.reconciler.sync(OWNER, today()).await.unwrap();

  let ada = h.store.get(ada.id).await.unwrap().unwrap();
  assert_eq!(ada.category, Category::Anniversary);
  assert_eq!(ada.icon, "heart");
}

#[tokio::test]
async fn vanished_events_are_left_alone() {
  let h = harness(MockProvider::with_events(three_birthdays()), MockPermission::authorized()).await;
  h.reconciler.sync(OWNER, today()).await.unwrap();

  h.provider.set_events(vec![event("e1", "Ada's Birthday", 9, 18)]);
  let report = h.reconciler.sync(OWNER, today()).await.unwrap();

  assert_eq!(report.unchanged, 1);
  assert_eq!(report.status.total_synced, 1);
  assert_eq!(active(&h).await.len(), 3);
}

#[tokio::test]
async fn deleted_imports_are_not_resurrected() {
  let h = harness(MockProvider::with_events(three_birthdays()), MockPermission::authorized()).await;
  h.reconciler.sync(OWNER, today()).await.unwrap();
  let ada = h.store.find_by_external_id(OWNER, "e1").await.unwrap().unwrap();
  h.store.soft_delete(ada.id).await.unwrap();

  let report = h.reconciler.sync(OWNER, today()).await.unwrap();
  assert_eq!(report.skipped, 1);
  assert_eq!(report.created, 0);
  assert_eq!(active(&h).await.len(), 2);
  assert!(!h.store.get(ada.id).await.unwrap().unwrap().active);
}

#[tokio::test]
async fn bad_candidates_produce_a_partial_error() {
  let events = vec![event("e1", "Ada's Birthday", 9, 18), event("e2", "Birthday", 3, 4)];
  let h = harness(MockProvider::with_events(events), MockPermission::authorized()).await;

  let report = h.reconciler.sync(OWNER, today()).await.unwrap();
  assert_eq!(report.created, 1);

  let partial = report.partial.unwrap();
  assert_eq!(partial.attempted, 2);
  assert_eq!(partial.failures.len(), 1);
  assert_eq!(partial.failures[0].external_id, "e2");

  assert_eq!(report.status.total_synced, 1);
  assert_eq!(
    report.status.last_error.as_deref(),
    Some("1 of 2 candidates failed to merge")
  );
  assert!(!report.status.in_progress);
}

// ─── Failure and concurrency ─────────────────────────────────────────────────

#[tokio::test]
async fn provider_timeout_is_recorded() {
  let provider = MockProvider {
    delay: Some(Duration::from_millis(500)),
    ..MockProvider::with_events(three_birthdays())
  };
  let config = SyncConfig { fetch_timeout: Duration::from_millis(20), ..SyncConfig::default() };
  let h = harness_with(provider, MockPermission::authorized(), config).await;

  let err = h.reconciler.sync(OWNER, today()).await.unwrap_err();
  assert!(matches!(err, SyncError::Provider(ProviderError::Timeout(_))));

  let status = h.reconciler.status(OWNER).await.unwrap();
  assert!(!status.in_progress);
  assert!(status.last_error.is_some());
  assert_eq!(status.total_synced, 0);
  assert!(active(&h).await.is_empty());
  assert_eq!(h.reconciler.phase(OWNER), SyncPhase::Idle);
}

#[tokio::test]
async fn failed_fetch_keeps_previous_total() {
  let h = harness(MockProvider::with_events(three_birthdays()), MockPermission::authorized()).await;
  h.reconciler.sync(OWNER, today()).await.unwrap();

  let failing = MockProvider {
    fail: Some(ProviderError::Http("503 Service Unavailable".into())),
    ..MockProvider::default()
  };
  let reconciler = Reconciler::new(
    Arc::clone(&h.store),
    Arc::new(failing),
    Arc::clone(&h.permission),
    SyncConfig::default(),
  );
  let err = reconciler.sync(OWNER, today()).await.unwrap_err();
  assert!(matches!(err, SyncError::Provider(ProviderError::Http(_))));

  let status = reconciler.status(OWNER).await.unwrap();
  assert_eq!(status.total_synced, 3);
  assert!(status.last_error.unwrap().contains("503"));
}

#[tokio::test]
async fn sync_is_skipped_while_another_pass_runs() {
  let h = harness(MockProvider::with_events(three_birthdays()), MockPermission::authorized()).await;

  let SyncClaim::Claimed(held) = h.store.begin_sync(OWNER).await.unwrap() else {
    panic!("fresh owner should be claimable");
  };

  let report = h.reconciler.sync(OWNER, today()).await.unwrap();
  assert!(report.coalesced);
  assert_eq!(report.status, held);
  assert_eq!(h.provider.calls(), 0);
  assert!(active(&h).await.is_empty());
  assert_eq!(h.reconciler.phase(OWNER), SyncPhase::Idle);
}

#[tokio::test]
async fn concurrent_syncs_coalesce() {
  let provider = MockProvider {
    delay: Some(Duration::from_millis(50)),
    ..MockProvider::with_events(three_birthdays())
  };
  let h = harness(provider, MockPermission::authorized()).await;

  let (a, b) = tokio::join!(
    h.reconciler.sync(OWNER, today()),
    h.reconciler.sync(OWNER, today()),
  );
  let (a, b) = (a.unwrap(), b.unwrap());

  assert!(a.coalesced != b.coalesced);
  assert_eq!(h.provider.calls(), 1);
  assert_eq!(active(&h).await.len(), 3);
}

#[tokio::test]
async fn concurrent_reconcilers_share_the_store_flag() {
  let provider = MockProvider {
    delay: Some(Duration::from_millis(50)),
    ..MockProvider::with_events(three_birthdays())
  };
  let h = harness(provider, MockPermission::authorized()).await;
  let other = Reconciler::new(
    Arc::clone(&h.store),
    Arc::clone(&h.provider),
    Arc::clone(&h.permission),
    SyncConfig::default(),
  );

  let (a, b) = tokio::join!(h.reconciler.sync(OWNER, today()), other.sync(OWNER, today()));
  let (a, b) = (a.unwrap(), b.unwrap());

  assert!(a.coalesced != b.coalesced);
  assert_eq!(h.provider.calls(), 1);
  assert_eq!(active(&h).await.len(), 3);
}

#[tokio::test]
async fn disabled_owner_is_not_synced() {
  let h = harness(MockProvider::with_events(three_birthdays()), MockPermission::authorized()).await;
  h.reconciler.set_enabled(OWNER, false).await.unwrap();

  let err = h.reconciler.sync(OWNER, today()).await.unwrap_err();
  assert!(matches!(err, SyncError::Disabled(_)));
  assert_eq!(h.provider.calls(), 0);
  assert_eq!(h.reconciler.phase(OWNER), SyncPhase::Idle);

  h.reconciler.set_enabled(OWNER, true).await.unwrap();
  assert_eq!(h.reconciler.sync(OWNER, today()).await.unwrap().created, 3);
}

#[tokio::test]
async fn dropped_pass_releases_the_flag() {
  let provider = MockProvider {
    delay: Some(Duration::from_secs(5)),
    ..MockProvider::with_events(three_birthdays())
  };
  let h = harness(provider, MockPermission::authorized()).await;

  let pass = tokio::time::timeout(Duration::from_millis(50), h.reconciler.sync(OWNER, today()));
  assert!(pass.await.is_err());
  assert_eq!(h.reconciler.phase(OWNER), SyncPhase::Idle);

  // The flag is released by a spawned task.
  let mut status = h.reconciler.status(OWNER).await.unwrap();
  for _ in 0..50 {
    if !status.in_progress {
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    status = h.reconciler.status(OWNER).await.unwrap();
  }
  assert!(!status.in_progress);
  assert!(status.last_error.is_some());
}
