//! The recurring month/day of an occasion.

use chrono::{Datelike as _, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A leap year used to check month/day combinations when no year is known, so
/// that February 29 is accepted.
const LEAP_REFERENCE_YEAR: i32 = 2000;

/// The calendar month and day an occasion recurs on, plus the year it
/// originally happened when the author knows it (used for age computation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginalDate {
  pub month: u32,
  pub day:   u32,
  /// The year of the original event, if known.
  #[serde(default)]
  pub year:  Option<i32>,
}

/// A month/day without a year, for moving an occasion while keeping whatever
/// year the record already knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonthDay {
  pub month: u32,
  pub day:   u32,
}

impl OriginalDate {
  /// A month/day without a known year.
  pub fn new(month: u32, day: u32) -> Self { Self { month, day, year: None } }

  /// A month/day with a known year.
  pub fn with_year(year: i32, month: u32, day: u32) -> Self {
    Self { month, day, year: Some(year) }
  }

  /// Build from a full date, keeping its year.
  pub fn from_date(date: NaiveDate) -> Self {
    Self::with_year(date.year(), date.month(), date.day())
  }

  /// Reject month/day combinations that never occur, and a known year in
  /// which the month/day does not exist (e.g. Feb 29 of a non-leap year).
  pub fn validate(&self) -> Result<()> {
    if !(1..=12).contains(&self.month) {
      return Err(Error::Validation(format!(
        "month {} is out of range",
        self.month
      )));
    }
    let year = self.year.unwrap_or(LEAP_REFERENCE_YEAR);
    NaiveDate::from_ymd_opt(year, self.month, self.day)
      .map(|_| ())
      .ok_or_else(|| {
        Error::Validation(format!(
          "{:02}-{:02} is not a valid date{}",
          self.month,
          self.day,
          self.year.map(|y| format!(" in {y}")).unwrap_or_default()
        ))
      })
  }

  pub fn is_leap_day(&self) -> bool { self.month == 2 && self.day == 29 }

  /// Move to `to`, keeping the known year when the new month/day exists in
  /// it and dropping it otherwise.
  pub fn moved_to(&self, to: MonthDay) -> Self {
    let kept = Self { month: to.month, day: to.day, year: self.year };
    if self.year.is_some() && kept.validate().is_err() {
      Self::new(to.month, to.day)
    } else {
      kept
    }
  }

  /// The date this occasion falls on in `year`.
  ///
  /// February 29 falls on February 28 in non-leap years. Returns `None` only
  /// for an invalid month/day or a year outside chrono's range.
  pub fn in_year(&self, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, self.month, self.day).or_else(|| {
      self
        .is_leap_day()
        .then(|| NaiveDate::from_ymd_opt(year, 2, 28))
        .flatten()
    })
  }
}
