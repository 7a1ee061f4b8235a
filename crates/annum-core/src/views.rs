//! Day, upcoming, month, year and search views over an [`EventStore`].
//!
//! The aggregator holds no state of its own. Every call reads the current
//! store contents and recomputes occurrences against the caller's reference
//! date, so results never go stale across a day boundary.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{Datelike as _, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
  Error,
  category::Category,
  occurrence::{OccurrenceView, next_occurrence, occurs_on},
  special_date::SpecialDate,
  store::{EventStore, ListFilter},
};

/// Cells in a month grid: six Monday-first weeks.
pub const GRID_CELLS: usize = 42;

// ─── View types ──────────────────────────────────────────────────────────────

/// Occasions falling on the reference date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayView {
  pub as_of:       NaiveDate,
  pub occasions:   Vec<OccurrenceView>,
  /// How many of `occasions` fall in each category.
  pub by_category: BTreeMap<Category, usize>,
}

/// One cell of a [`MonthGrid`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridCell {
  /// Padding outside the month.
  Empty,
  Day {
    date:      NaiveDate,
    /// Records recurring on `date`, ordered by display name.
    occasions: Vec<SpecialDate>,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthGrid {
  pub year:  i32,
  pub month: u32,
  /// Always [`GRID_CELLS`] long.
  pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthSummary {
  pub month:      u32,
  pub has_events: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearOverview {
  pub year:   i32,
  /// January through December.
  pub months: Vec<MonthSummary>,
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

/// Read-only queries consumed by the presentation layer.
pub struct ViewAggregator<S> {
  store: Arc<S>,
}

impl<S> Clone for ViewAggregator<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: EventStore> ViewAggregator<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  async fn active(&self, owner_id: &str) -> Result<Vec<SpecialDate>, S::Error> {
    self.store.list(owner_id, &ListFilter::default()).await
  }

  /// Occasions whose next occurrence is `as_of`, with per-category counts.
  pub async fn today(
    &self,
    owner_id: &str,
    as_of: NaiveDate,
  ) -> Result<TodayView, S::Error> {
    let mut occasions: Vec<OccurrenceView> = self
      .active(owner_id)
      .await?
      .iter()
      .filter_map(|r| next_occurrence(r, as_of))
      .filter(|v| v.days_until == 0)
      .collect();
    sort_occurrences(&mut occasions);

    let mut by_category = BTreeMap::new();
    for view in &occasions {
      *by_category.entry(view.category).or_insert(0) += 1;
    }

    Ok(TodayView { as_of, occasions, by_category })
  }

  /// Occasions due within `within_days` days of `as_of` (inclusive),
  /// ascending by `days_until` and then by name.
  pub async fn upcoming(
    &self,
    owner_id: &str,
    as_of: NaiveDate,
    within_days: u32,
  ) -> Result<Vec<OccurrenceView>, S::Error> {
    let mut views: Vec<OccurrenceView> = self
      .active(owner_id)
      .await?
      .iter()
      .filter_map(|r| next_occurrence(r, as_of))
      .filter(|v| v.days_until <= within_days)
      .collect();
    sort_occurrences(&mut views);
    Ok(views)
  }

  /// A 6×7 Monday-first grid for `(year, month)`.
  pub async fn month_grid(
    &self,
    owner_id: &str,
    year: i32,
    month: u32,
  ) -> Result<MonthGrid, S::Error> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
      Error::Validation(format!("{year}-{month:02} is not a valid month"))
    })?;
    let records = self.active(owner_id).await?;

    let offset = first.weekday().num_days_from_monday() as usize;
    let mut cells = vec![GridCell::Empty; offset];
    let mut day = Some(first);
    while let Some(date) = day.filter(|d| d.month() == month) {
      let mut occasions: Vec<SpecialDate> = records
        .iter()
        .filter(|r| occurs_on(r, date))
        .cloned()
        .collect();
      occasions.sort_by(|a, b| {
        a.display_name().cmp(b.display_name()).then(a.id.cmp(&b.id))
      });
      cells.push(GridCell::Day { date, occasions });
      day = date.checked_add_days(Days::new(1));
    }
    cells.resize(GRID_CELLS, GridCell::Empty);

    Ok(MonthGrid { year, month, cells })
  }

  /// Whether any record recurs in each month of `year`.
  pub async fn year_overview(
    &self,
    owner_id: &str,
    year: i32,
  ) -> Result<YearOverview, S::Error> {
    let records = self.active(owner_id).await?;
    let mut has_events = [false; 12];
    for date in records.iter().filter_map(|r| r.original_date.in_year(year)) {
      has_events[date.month0() as usize] = true;
    }
    let months = (1..=12)
      .zip(has_events)
      .map(|(month, has_events)| MonthSummary { month, has_events })
      .collect();
    Ok(YearOverview { year, months })
  }

  /// Case-insensitive substring search over subject names and custom labels,
  /// ordered by display name. A blank query matches nothing.
  pub async fn search(
    &self,
    owner_id: &str,
    query: &str,
  ) -> Result<Vec<SpecialDate>, S::Error> {
    let query = query.trim();
    if query.is_empty() {
      return Ok(Vec::new());
    }
    let mut hits: Vec<SpecialDate> = self
      .active(owner_id)
      .await?
      .into_iter()
      .filter(|r| r.matches_text(query))
      .collect();
    hits.sort_by(|a, b| {
      a.display_name().cmp(b.display_name()).then(a.id.cmp(&b.id))
    });
    Ok(hits)
  }
}

/// Ascending by `days_until`, ties by name, then id for a total order.
fn sort_occurrences(views: &mut [OccurrenceView]) {
  views.sort_by(|a, b| {
    a.days_until
      .cmp(&b.days_until)
      .then_with(|| a.subject_name.cmp(&b.subject_name))
      .then_with(|| a.id.cmp(&b.id))
  });
}
