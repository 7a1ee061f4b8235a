//! Occurrence calculation: where a special date next falls relative to a
//! reference date.
//!
//! Everything here is pure. "Today" is whatever `NaiveDate` the caller passes
//! in; callers derive it once, in a single fixed timezone, so that the same
//! day boundary applies to every query.

use chrono::{Datelike as _, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{category::Category, date::OriginalDate, special_date::SpecialDate};

/// The derived, never-persisted view of a record's next occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceView {
  pub id:                   Uuid,
  pub subject_name:         String,
  pub icon:                 String,
  pub category:             Category,
  pub next_occurrence_date: NaiveDate,
  /// Whole days from the reference date; 0 means today.
  pub days_until:           u32,
  /// Age or years reached on the next occurrence, when the original year is
  /// known.
  pub attained_age:         Option<i32>,
}

/// The first date on or after `as_of` on which `date` falls.
///
/// A date equal to `as_of` counts as today, not as passed. Returns `None`
/// only for an invalid month/day or a year outside chrono's range.
pub fn next_occurrence_date(
  date: &OriginalDate,
  as_of: NaiveDate,
) -> Option<NaiveDate> {
  let candidate = date.in_year(as_of.year())?;
  if candidate >= as_of {
    Some(candidate)
  } else {
    date.in_year(as_of.year() + 1)
  }
}

/// Compute the next occurrence of `record` relative to `as_of`.
pub fn next_occurrence(
  record: &SpecialDate,
  as_of: NaiveDate,
) -> Option<OccurrenceView> {
  let next = next_occurrence_date(&record.original_date, as_of)?;
  let days_until = u32::try_from((next - as_of).num_days()).ok()?;
  let attained_age = record
    .original_date
    .year
    .map(|known| next.year() - known)
    .filter(|age| *age >= 0);

  Some(OccurrenceView {
    id: record.id,
    subject_name: record.display_name().to_owned(),
    icon: record.icon.clone(),
    category: record.category,
    next_occurrence_date: next,
    days_until,
    attained_age,
  })
}

/// Does `record` fall on `date` in `date`'s year?
pub fn occurs_on(record: &SpecialDate, date: NaiveDate) -> bool {
  record.original_date.in_year(date.year()) == Some(date)
}

// ─── Grouping predicates ─────────────────────────────────────────────────────

/// The next occurrence relative to `day` is `day` itself.
pub fn in_day(record: &SpecialDate, day: NaiveDate) -> bool {
  next_occurrence_date(&record.original_date, day) == Some(day)
}

/// The next occurrence relative to `start` falls within `[start, end]`.
pub fn in_week(record: &SpecialDate, start: NaiveDate, end: NaiveDate) -> bool {
  next_occurrence_date(&record.original_date, start)
    .is_some_and(|next| next <= end)
}

/// The recurring month/day lands in `(year, month)`, regardless of which
/// occurrence is next.
pub fn in_month(record: &SpecialDate, year: i32, month: u32) -> bool {
  record
    .original_date
    .in_year(year)
    .is_some_and(|d| d.month() == month)
}
