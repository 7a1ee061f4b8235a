//! Occasion categories and the presentation metadata attached to each.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What kind of occasion a special date records.
///
/// The string form (`Display`/`FromStr`) matches the serde form and is what
/// the storage backends write to their `category` column.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
  Birthday,
  Anniversary,
  Graduation,
  Wedding,
  /// Requires a non-empty custom label on the record.
  Custom,
}

/// Display data for a category. Presentation code reads this instead of
/// switching over [`Category`] itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryMetadata {
  pub title:         &'static str,
  pub icon:          &'static str,
  /// Label used when a record has no subject name of its own.
  pub default_label: &'static str,
}

impl Category {
  /// The single category → metadata table.
  pub const fn metadata(self) -> CategoryMetadata {
    match self {
      Self::Birthday => CategoryMetadata {
        title:         "Birthday",
        icon:          "birthday.cake",
        default_label: "Birthday",
      },
      Self::Anniversary => CategoryMetadata {
        title:         "Anniversary",
        icon:          "heart",
        default_label: "Anniversary",
      },
      Self::Graduation => CategoryMetadata {
        title:         "Graduation",
        icon:          "graduationcap",
        default_label: "Graduation",
      },
      Self::Wedding => CategoryMetadata {
        title:         "Wedding",
        icon:          "rings",
        default_label: "Wedding",
      },
      Self::Custom => CategoryMetadata {
        title:         "Special Day",
        icon:          "star",
        default_label: "Special Day",
      },
    }
  }

  pub fn requires_custom_label(self) -> bool { matches!(self, Self::Custom) }
}
