//! Special dates: the canonical recurring occasion records.
//!
//! A special date is owned by exactly one user. Imported records carry the
//! provider's event id so repeated imports can find and update them instead
//! of creating duplicates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  category::Category,
  date::{MonthDay, OriginalDate},
};

// ─── Origin ──────────────────────────────────────────────────────────────────

/// How a record entered the store.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceOrigin {
  /// Typed in by the user directly.
  #[default]
  Manual,
  /// Merged in from an external calendar provider.
  ImportedExternal,
}

// ─── SpecialDate ─────────────────────────────────────────────────────────────

/// A recurring annual occasion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialDate {
  /// Assigned by the store at creation; never changes.
  pub id:            Uuid,
  pub owner_id:      String,
  /// Composed name or label of the person or thing the occasion is about.
  pub subject_name:  String,
  pub category:      Category,
  /// Present iff `category` is [`Category::Custom`].
  pub custom_label:  Option<String>,
  pub original_date: OriginalDate,
  /// Decorative token; no behavioural meaning.
  pub icon:          String,
  pub source_origin: SourceOrigin,
  /// Present iff `source_origin` is [`SourceOrigin::ImportedExternal`].
  pub external_id:   Option<String>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
  /// Soft-delete flag. Inactive records stay readable by id.
  pub active:        bool,
}

impl SpecialDate {
  /// The name shown for this record: the subject name, else the custom
  /// label, else the category's default label.
  pub fn display_name(&self) -> &str {
    if !self.subject_name.trim().is_empty() {
      return &self.subject_name;
    }
    match self.custom_label.as_deref() {
      Some(label) if !label.trim().is_empty() => label,
      _ => self.category.metadata().default_label,
    }
  }

  /// Case-insensitive substring match over subject name and custom label.
  pub fn matches_text(&self, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    self.subject_name.to_lowercase().contains(&needle)
      || self
        .custom_label
        .as_deref()
        .is_some_and(|l| l.to_lowercase().contains(&needle))
  }
}

// ─── NewSpecialDate ──────────────────────────────────────────────────────────

/// Input to [`crate::store::EventStore::create`].
/// `id`, timestamps and `active` are always set by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSpecialDate {
  pub owner_id:      String,
  pub subject_name:  String,
  pub category:      Category,
  #[serde(default)]
  pub custom_label:  Option<String>,
  pub original_date: OriginalDate,
  /// Falls back to the category icon when absent.
  #[serde(default)]
  pub icon:          Option<String>,
  #[serde(default)]
  pub source_origin: SourceOrigin,
  #[serde(default)]
  pub external_id:   Option<String>,
}

impl NewSpecialDate {
  /// A manually entered record with no custom label or icon.
  pub fn new(
    owner_id: impl Into<String>,
    subject_name: impl Into<String>,
    category: Category,
    original_date: OriginalDate,
  ) -> Self {
    Self {
      owner_id: owner_id.into(),
      subject_name: subject_name.into(),
      category,
      custom_label: None,
      original_date,
      icon: None,
      source_origin: SourceOrigin::Manual,
      external_id: None,
    }
  }

  /// A record imported from an external provider under `external_id`.
  pub fn imported(
    owner_id: impl Into<String>,
    external_id: impl Into<String>,
    subject_name: impl Into<String>,
    category: Category,
    original_date: OriginalDate,
  ) -> Self {
    Self {
      source_origin: SourceOrigin::ImportedExternal,
      external_id: Some(external_id.into()),
      ..Self::new(owner_id, subject_name, category, original_date)
    }
  }

  pub fn with_custom_label(mut self, label: impl Into<String>) -> Self {
    self.custom_label = Some(label.into());
    self
  }

  pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
    self.icon = Some(icon.into());
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.owner_id.trim().is_empty() {
      return Err(Error::Validation("owner id must not be empty".into()));
    }
    validate_fields(
      &self.subject_name,
      self.category,
      self.custom_label.as_deref(),
      &self.original_date,
    )?;
    match (self.source_origin, self.external_id.as_deref()) {
      (SourceOrigin::ImportedExternal, Some(id)) if !id.trim().is_empty() => {
        Ok(())
      }
      (SourceOrigin::ImportedExternal, _) => Err(Error::Validation(
        "imported records require an external id".into(),
      )),
      (SourceOrigin::Manual, None) => Ok(()),
      (SourceOrigin::Manual, Some(_)) => Err(Error::Validation(
        "manual records must not carry an external id".into(),
      )),
    }
  }

  /// Build the stored record. The caller must have validated `self`.
  pub fn into_special_date(self, id: Uuid, now: DateTime<Utc>) -> SpecialDate {
    let icon = self
      .icon
      .unwrap_or_else(|| self.category.metadata().icon.to_owned());
    SpecialDate {
      id,
      owner_id: self.owner_id,
      subject_name: self.subject_name,
      category: self.category,
      custom_label: self.custom_label,
      original_date: self.original_date,
      icon,
      source_origin: self.source_origin,
      external_id: self.external_id,
      created_at: now,
      updated_at: now,
      active: true,
    }
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// A partial update. `None` fields are left untouched; `custom_label` uses a
/// double option so that `null` clears the label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialDatePatch {
  #[serde(default)]
  pub subject_name:  Option<String>,
  #[serde(default)]
  pub category:      Option<Category>,
  #[serde(default, deserialize_with = "double_option")]
  pub custom_label:  Option<Option<String>>,
  #[serde(default)]
  pub original_date: Option<OriginalDate>,
  /// Move the month/day but keep the stored record's known year. Resolved
  /// against the record the patch is applied to, after `original_date`.
  #[serde(default)]
  pub recurrence:    Option<MonthDay>,
  #[serde(default)]
  pub icon:          Option<String>,
}

impl SpecialDatePatch {
  pub fn is_empty(&self) -> bool { self == &Self::default() }

  /// Apply the patch to a copy of `record` and validate the result.
  ///
  /// Moving a record away from [`Category::Custom`] without touching the
  /// label clears it. A category change without an explicit icon replaces
  /// the old category's default icon with the new one; a custom icon stays.
  /// `updated_at` is left to the caller.
  pub fn apply_to(&self, record: &SpecialDate) -> Result<SpecialDate> {
    let mut next = record.clone();
    if let Some(name) = &self.subject_name {
      next.subject_name = name.clone();
    }
    if let Some(category) = self.category {
      if self.icon.is_none() && record.icon == record.category.metadata().icon {
        next.icon = category.metadata().icon.to_owned();
      }
      next.category = category;
    }
    match &self.custom_label {
      Some(label) => next.custom_label = label.clone(),
      None if !next.category.requires_custom_label() => {
        next.custom_label = None
      }
      None => {}
    }
    if let Some(date) = self.original_date {
      next.original_date = date;
    }
    if let Some(to) = self.recurrence {
      next.original_date = next.original_date.moved_to(to);
    }
    if let Some(icon) = &self.icon {
      next.icon = icon.clone();
    }
    validate_fields(
      &next.subject_name,
      next.category,
      next.custom_label.as_deref(),
      &next.original_date,
    )?;
    Ok(next)
  }
}

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(de).map(Some)
}

// ─── Validation ──────────────────────────────────────────────────────────────

fn validate_fields(
  subject_name: &str,
  category: Category,
  custom_label: Option<&str>,
  original_date: &OriginalDate,
) -> Result<()> {
  original_date.validate()?;

  let label = custom_label.map(str::trim).filter(|l| !l.is_empty());
  if category.requires_custom_label() && label.is_none() {
    return Err(Error::Validation(
      "custom occasions require a non-empty custom label".into(),
    ));
  }
  if !category.requires_custom_label() && custom_label.is_some() {
    return Err(Error::Validation(format!(
      "a custom label is only allowed on custom occasions, not {category}"
    )));
  }
  if subject_name.trim().is_empty() && label.is_none() {
    return Err(Error::Validation(
      "subject name and custom label must not both be empty".into(),
    ));
  }
  Ok(())
}
