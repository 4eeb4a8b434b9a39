//! Terminal rendering for the month view.
//!
//! Everything here builds `String`s from a [`MonthView`]; printing is left to
//! the CLI so the layout can be tested.
//!
//! # Functions
//!
//! - [`truncate`] - Truncate strings to a maximum length with ellipsis
//! - [`make_bar`] - Create a progress bar for a completion percentage
//! - [`render_habit_row`] - Render one habit's line of the grid
//! - [`render_month`] - Render the whole month grid

use crate::controller::MonthView;
use crate::habit::{HabitRecord, ProgressBand};

/// Width of the habit name column.
pub const NAME_WIDTH: usize = 20;

/// Width of the progress bar after each row.
pub const BAR_WIDTH: usize = 10;

const DONE: char = '●';
const OPEN: char = '·';
const EDITABLE: char = '○';
const PENDING: char = '◌';

/// Truncate a string to a maximum length, adding "..." if truncated.
///
/// Counts characters rather than bytes. For `max_len < 3`, truncates without
/// ellipsis since there's no room for "...".
///
/// # Examples
///
/// ```
/// use lockin::display::truncate;
///
/// assert_eq!(truncate("hello", 10), "hello");
/// assert_eq!(truncate("hello world", 8), "hello...");
/// assert_eq!(truncate("hello", 2), "he");
/// ```
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else if max_len < 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}

/// Create a bar for a percentage in `0..=100`.
///
/// Values above 100 draw a full bar.
#[must_use]
pub fn make_bar(percentage: u8, width: usize) -> String {
    let percentage = usize::from(percentage.min(100));
    let filled = percentage * width / 100;
    let empty = width.saturating_sub(filled);
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

/// Word shown next to the percentage.
#[must_use]
pub const fn band_label(band: ProgressBand) -> &'static str {
    match band {
        ProgressBand::Low => "low",
        ProgressBand::Medium => "medium",
        ProgressBand::High => "high",
    }
}

/// Symbol for one cell of the grid.
fn cell(view: &MonthView, record: &HabitRecord, day: u32) -> char {
    if view.is_pending(record.habit_id(), day) {
        PENDING
    } else if record.is_completed(day) {
        DONE
    } else if view.is_editable(day) {
        EDITABLE
    } else {
        OPEN
    }
}

/// Day numbers over the grid, units digit only, with `^` under today.
fn day_header(view: &MonthView, total_days: u32) -> (String, String) {
    let digits: String = (1..=total_days).map(|day| (day % 10).to_string()).collect();
    let marker: String = (1..=total_days)
        .map(|day| {
            if view.window.is_today(day, view.selected) {
                '^'
            } else {
                ' '
            }
        })
        .collect();
    (digits, marker.trim_end().to_string())
}

/// One line per habit: id, name, day cells, counts and progress.
#[must_use]
pub fn render_habit_row(view: &MonthView, record: &HabitRecord) -> String {
    let cells: String = (1..=record.total_days())
        .map(|day| cell(view, record, day))
        .collect();
    format!(
        "{:>6}  {:<width$} {} {:>2}/{:<2} {:>3}% {} {}",
        truncate(record.habit_id().as_str(), 6),
        truncate(record.name(), NAME_WIDTH),
        cells,
        record.completed_days(),
        record.total_days(),
        record.percentage(),
        make_bar(record.percentage(), BAR_WIDTH),
        band_label(record.progress_band()),
        width = NAME_WIDTH
    )
}

/// Render the selected month as a grid.
#[must_use]
pub fn render_month(view: &MonthView) -> String {
    let back = if view.can_navigate_backward { "<" } else { " " };
    let mut out = format!("{back} {} >\n", view.selected);

    if view.is_loading {
        out.push_str("Loading...\n");
        return out;
    }
    if view.records.is_empty() {
        out.push_str("No habits yet. Add one with `lockin add <name>`.\n");
        return out;
    }

    let total_days = view.selected.days();
    let (digits, marker) = day_header(view, total_days);
    let pad = " ".repeat(6 + 2 + NAME_WIDTH + 1);
    out.push_str(&format!("{pad}{digits}\n"));
    if !marker.is_empty() {
        out.push_str(&format!("{pad}{marker}\n"));
    }
    for record in &view.records {
        out.push_str(&render_habit_row(view, record));
        out.push('\n');
    }
    out.push_str(&format!(
        "\n{DONE} done  {EDITABLE} open (editable)  {OPEN} open  {PENDING} saving\n"
    ));
    out
}
