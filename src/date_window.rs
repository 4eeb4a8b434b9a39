//! Month arithmetic and date comparisons for the habit calendar.
//!
//! Everything here is pure: no clock reads except [`DateWindow::from_local_now`],
//! no I/O and no errors. Months are 1-based (`1` = January).

use std::fmt;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Short month labels, indexed by `month - 1`.
pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Month following `(month, year)`, rolling December into January of the next year.
#[must_use]
pub const fn next_month(month: u32, year: i32) -> (u32, i32) {
    if month == 12 {
        (1, year + 1)
    } else {
        (month + 1, year)
    }
}

/// Month preceding `(month, year)`, rolling January into December of the previous year.
#[must_use]
pub const fn prev_month(month: u32, year: i32) -> (u32, i32) {
    if month == 1 {
        (12, year - 1)
    } else {
        (month - 1, year)
    }
}

/// `(month, year)` lies strictly before `(today_month, today_year)`.
#[must_use]
pub const fn is_past(month: u32, year: i32, today_month: u32, today_year: i32) -> bool {
    year < today_year || (year == today_year && month < today_month)
}

/// `(month, year)` lies strictly after `(today_month, today_year)`.
#[must_use]
pub const fn is_future(month: u32, year: i32, today_month: u32, today_year: i32) -> bool {
    year > today_year || (year == today_year && month > today_month)
}

/// `(month, year)` is the month containing today.
#[must_use]
pub const fn is_current(month: u32, year: i32, today_month: u32, today_year: i32) -> bool {
    year == today_year && month == today_month
}

/// Whether `day` of `(month, year)` may still be toggled.
///
/// Only today and yesterday are editable, whichever month is on screen.
/// Yesterday may belong to the previous month (or year) when today is the 1st.
#[must_use]
pub fn is_editable_day(day: u32, month: u32, year: i32, today: NaiveDate) -> bool {
    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
        return false;
    };
    date == today || today.pred_opt() == Some(date)
}

/// Number of days in `(month, year)`, or 0 for an out-of-range month.
#[must_use]
pub fn days_in_month(month: u32, year: i32) -> u32 {
    if !(1..=12).contains(&month) {
        return 0;
    }
    let (next_m, next_y) = next_month(month, year);
    NaiveDate::from_ymd_opt(next_y, next_m, 1)
        .and_then(|first| first.pred_opt())
        .map_or(0, |last| last.day())
}

/// Short label for a month number, e.g. `"Mar"`.
#[must_use]
pub fn month_label(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|idx| MONTH_LABELS.get(idx as usize))
        .copied()
        .unwrap_or("???")
}

/// A calendar month. Orders by year, then month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// Create a new year/month pair. The month is not range-checked.
    #[must_use]
    pub const fn new(month: u32, year: i32) -> Self {
        Self { year, month }
    }

    /// The month containing `date`.
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self::new(date.month(), date.year())
    }

    #[must_use]
    pub const fn next(self) -> Self {
        let (month, year) = next_month(self.month, self.year);
        Self::new(month, year)
    }

    #[must_use]
    pub const fn prev(self) -> Self {
        let (month, year) = prev_month(self.month, self.year);
        Self::new(month, year)
    }

    /// Whether the month number is in `1..=12`.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.month >= 1 && self.month <= 12
    }

    #[must_use]
    pub fn days(self) -> u32 {
        days_in_month(self.month, self.year)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", month_label(self.month), self.year)
    }
}

/// Navigation direction for the month selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// Today plus the earliest month the user may navigate back to.
///
/// `today` is captured once when the window is built and never re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub today: NaiveDate,
    /// First month with habit data; `None` until the backend has told us.
    pub earliest: Option<YearMonth>,
}

impl DateWindow {
    #[must_use]
    pub const fn new(today: NaiveDate) -> Self {
        Self {
            today,
            earliest: None,
        }
    }

    /// Build a window anchored on the local calendar date.
    #[must_use]
    pub fn from_local_now() -> Self {
        Self::new(Local::now().date_naive())
    }

    #[must_use]
    pub const fn with_earliest(mut self, earliest: YearMonth) -> Self {
        self.earliest = Some(earliest);
        self
    }

    /// The month containing today.
    #[must_use]
    pub fn current_month(&self) -> YearMonth {
        YearMonth::of(self.today)
    }

    /// False exactly when `selected` is the earliest month.
    #[must_use]
    pub fn can_navigate_backward(&self, selected: YearMonth) -> bool {
        self.earliest != Some(selected)
    }

    /// Whether `month` lies before the earliest boundary (if known).
    #[must_use]
    pub fn is_before_earliest(&self, month: YearMonth) -> bool {
        self.earliest.is_some_and(|earliest| month < earliest)
    }

    /// Target of a navigation step, or `None` when stepping back past the boundary.
    #[must_use]
    pub fn step(&self, selected: YearMonth, direction: Direction) -> Option<YearMonth> {
        match direction {
            Direction::Previous if !self.can_navigate_backward(selected) => None,
            Direction::Previous => Some(selected.prev()),
            Direction::Next => Some(selected.next()),
        }
    }

    #[must_use]
    pub fn is_past(&self, month: YearMonth) -> bool {
        let today = self.current_month();
        is_past(month.month, month.year, today.month, today.year)
    }

    #[must_use]
    pub fn is_future(&self, month: YearMonth) -> bool {
        let today = self.current_month();
        is_future(month.month, month.year, today.month, today.year)
    }

    #[must_use]
    pub fn is_current(&self, month: YearMonth) -> bool {
        let today = self.current_month();
        is_current(month.month, month.year, today.month, today.year)
    }

    /// Whether `day` of `month` may be toggled relative to today.
    #[must_use]
    pub fn is_editable(&self, day: u32, month: YearMonth) -> bool {
        is_editable_day(day, month.month, month.year, self.today)
    }

    /// Whether `day` of `month` is today.
    #[must_use]
    pub fn is_today(&self, day: u32, month: YearMonth) -> bool {
        NaiveDate::from_ymd_opt(month.year, month.month, day) == Some(self.today)
    }
}
