//! Habit records for a single month.
//!
//! A [`HabitRecord`] owns the set of completed days; the completed count and
//! percentage are always recomputed from it and never taken from the wire.

use std::collections::{BTreeMap, BTreeSet};

use derive_more::{Display, From};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// Percentage at or above which progress counts as medium.
pub const MEDIUM_PROGRESS_THRESHOLD: u8 = 40;

/// Percentage at or above which progress counts as high.
pub const HIGH_PROGRESS_THRESHOLD: u8 = 70;

/// Opaque habit identifier assigned by the backend.
///
/// The backend may send it as a JSON string or number; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display, From)]
#[serde(transparent)]
pub struct HabitId(String);

impl HabitId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HabitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for HabitId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for HabitId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => Self(text),
            Raw::Number(number) => Self(number.to_string()),
        })
    }
}

/// Completed days of one month.
///
/// On the wire this is a `{ "<day>": bool }` map; `false` entries and absent
/// keys mean the same thing, so only completed days are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<u32, bool>", into = "BTreeMap<u32, bool>")]
pub struct CompletionDays(BTreeSet<u32>);

impl CompletionDays {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, day: u32) -> bool {
        self.0.contains(&day)
    }

    /// Mark `day` as completed or not.
    pub fn set(&mut self, day: u32, completed: bool) {
        if completed {
            self.0.insert(day);
        } else {
            self.0.remove(&day);
        }
    }

    /// Number of completed days.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Completed days in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    fn retain_range(&mut self, total_days: u32) {
        self.0.retain(|day| (1..=total_days).contains(day));
    }
}

impl From<BTreeMap<u32, bool>> for CompletionDays {
    fn from(map: BTreeMap<u32, bool>) -> Self {
        Self(
            map.into_iter()
                .filter_map(|(day, done)| done.then_some(day))
                .collect(),
        )
    }
}

impl From<CompletionDays> for BTreeMap<u32, bool> {
    fn from(days: CompletionDays) -> Self {
        days.0.into_iter().map(|day| (day, true)).collect()
    }
}

impl FromIterator<u32> for CompletionDays {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Coarse progress level used to colour the percentage indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressBand {
    Low,
    Medium,
    High,
}

impl ProgressBand {
    #[must_use]
    pub const fn from_percentage(percentage: u8) -> Self {
        if percentage >= HIGH_PROGRESS_THRESHOLD {
            Self::High
        } else if percentage >= MEDIUM_PROGRESS_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// One habit within one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "HabitRecordWire")]
pub struct HabitRecord {
    habit_id: HabitId,
    name: String,
    total_days: u32,
    days: CompletionDays,
    completed_days: u32,
    percentage: u8,
}

/// Server shape. `completedDays` and `percentage` are ignored and recomputed.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HabitRecordWire {
    habit_id: HabitId,
    name: String,
    total_days: u32,
    #[serde(default)]
    days: CompletionDays,
}

impl From<HabitRecordWire> for HabitRecord {
    fn from(wire: HabitRecordWire) -> Self {
        Self::new(wire.habit_id, wire.name, wire.total_days).with_days(wire.days)
    }
}

impl HabitRecord {
    /// A record with no completed days.
    #[must_use]
    pub fn new(habit_id: impl Into<HabitId>, name: impl Into<String>, total_days: u32) -> Self {
        Self {
            habit_id: habit_id.into(),
            name: name.into(),
            total_days,
            days: CompletionDays::new(),
            completed_days: 0,
            percentage: 0,
        }
    }

    #[must_use]
    pub const fn habit_id(&self) -> &HabitId {
        &self.habit_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn total_days(&self) -> u32 {
        self.total_days
    }

    #[must_use]
    pub const fn days(&self) -> &CompletionDays {
        &self.days
    }

    #[must_use]
    pub const fn completed_days(&self) -> u32 {
        self.completed_days
    }

    #[must_use]
    pub const fn percentage(&self) -> u8 {
        self.percentage
    }

    #[must_use]
    pub fn is_completed(&self, day: u32) -> bool {
        self.days.contains(day)
    }

    #[must_use]
    pub const fn progress_band(&self) -> ProgressBand {
        ProgressBand::from_percentage(self.percentage)
    }

    /// Copy with `day` flipped. Days outside the month leave the record unchanged.
    #[must_use]
    pub fn with_toggled_day(&self, day: u32) -> Self {
        self.with_day(day, !self.is_completed(day))
    }

    /// Copy with `day` set to `completed`.
    #[must_use]
    pub fn with_day(&self, day: u32, completed: bool) -> Self {
        if !(1..=self.total_days).contains(&day) {
            return self.clone();
        }
        let mut next = self.clone();
        next.days.set(day, completed);
        next.recompute();
        next
    }

    /// Copy with the whole day map replaced, as returned by the server.
    #[must_use]
    pub fn with_days(&self, days: CompletionDays) -> Self {
        let mut next = self.clone();
        next.days = days;
        next.days.retain_range(next.total_days);
        next.recompute();
        next
    }

    /// Copy with a new trimmed name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] when the trimmed name is empty.
    pub fn with_renamed(&self, new_name: &str) -> Result<Self, ValidationError> {
        let name = validate_habit_name(new_name)?;
        Ok(Self {
            name,
            ..self.clone()
        })
    }

    fn recompute(&mut self) {
        self.completed_days = u32::try_from(self.days.len()).unwrap_or(u32::MAX);
        self.percentage = completion_percentage(self.completed_days, self.total_days);
    }
}

/// `round(completed / total * 100)`, rounding halves up. Zero for an empty month.
#[must_use]
pub fn completion_percentage(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = u64::from(completed.min(total));
    let total = u64::from(total);
    let rounded = (200 * completed + total) / (2 * total);
    u8::try_from(rounded).unwrap_or(100)
}

/// Trim a habit name, rejecting blank input.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyName`] when nothing is left after trimming.
pub fn validate_habit_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed.to_string())
}
