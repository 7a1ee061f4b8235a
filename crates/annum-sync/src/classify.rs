//! Deciding which provider events are occasions, and turning them into
//! special dates.

use annum_core::{
  category::Category,
  date::OriginalDate,
  special_date::NewSpecialDate,
};
use chrono::Datelike as _;
use serde::{Deserialize, Serialize};

use crate::provider::CalendarEvent;

/// Characters trimmed from the ends of a derived subject name.
const SEPARATORS: &[char] = &['-', '–', '—', ':', ',', '|', '/', '(', ')'];

/// Maps a keyword found in an event title or calendar label to a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
  pub keyword:  String,
  pub category: Category,
}

/// Case-insensitive keyword classifier. Rules are tried in order; the first
/// keyword found in the title wins, then the first found in the calendar
/// label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
  rules: Vec<KeywordRule>,
}

impl Default for Classifier {
  fn default() -> Self {
    Self { rules: Vec::new() }
      .with_rule("birthday", Category::Birthday)
      .with_rule("anniversary", Category::Anniversary)
      .with_rule("wedding", Category::Wedding)
      .with_rule("graduation", Category::Graduation)
  }
}

impl Classifier {
  /// Append a rule after the existing ones. Blank keywords are ignored.
  pub fn with_rule(mut self, keyword: &str, category: Category) -> Self {
    let keyword = keyword.trim().to_lowercase();
    if !keyword.is_empty() {
      self.rules.push(KeywordRule { keyword, category });
    }
    self
  }

  pub fn rules(&self) -> &[KeywordRule] { &self.rules }

  /// The occasion category of `event`, or `None` if it is not an occasion.
  pub fn classify(&self, event: &CalendarEvent) -> Option<Category> {
    if event.is_birthday_hint == Some(true) {
      return Some(Category::Birthday);
    }
    let title = event.title.to_lowercase();
    let label = event.calendar_label.to_lowercase();
    self
      .rules
      .iter()
      .find(|r| title.contains(&r.keyword))
      .or_else(|| self.rules.iter().find(|r| label.contains(&r.keyword)))
      .map(|r| r.category)
  }

  /// Derive the subject from an event title by removing occasion keywords
  /// and possessives: `"Ada Lovelace's Birthday"` → `"Ada Lovelace"`.
  pub fn subject_name(&self, title: &str) -> String {
    let mut name = title.to_owned();
    for rule in &self.rules {
      while let Some(at) = name.to_ascii_lowercase().find(&rule.keyword) {
        name.replace_range(at..at + rule.keyword.len(), " ");
      }
    }
    tidy(&name)
  }

  /// Map a provider event to the shape of an imported special date, or
  /// `None` when the event is not an occasion. The result is not validated.
  pub fn to_special_date(
    &self,
    owner_id: &str,
    event: &CalendarEvent,
  ) -> Option<NewSpecialDate> {
    let category = self.classify(event)?;
    let original = OriginalDate::new(event.start_date.month(), event.start_date.day());
    let input = NewSpecialDate::imported(
      owner_id,
      event.external_id.clone(),
      self.subject_name(&event.title),
      category,
      original,
    );
    Some(if category.requires_custom_label() {
      input.with_custom_label(event.title.trim())
    } else {
      input
    })
  }
}

fn tidy(raw: &str) -> String {
  let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
  let trim = |s: &str| -> String {
    s.trim_matches(|c: char| c.is_whitespace() || SEPARATORS.contains(&c))
      .to_owned()
  };
  let name = trim(&collapsed);
  let name = ["'s", "’s", "'", "’"]
    .iter()
    .find_map(|suffix| name.strip_suffix(suffix))
    .map_or_else(|| name.clone(), trim);
  name
}
