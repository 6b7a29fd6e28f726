//! Calendar ranges, the 26th-to-26th billing cycle and pivot lookback windows.

use serde::{Deserialize, Serialize};
use time::{Date, Duration};

/// First day of every billing cycle.
pub const CYCLE_START_DAY: u8 = 26;
/// Days added to the cycle start to reach its (inclusive) last day.
pub const CYCLE_SPAN_DAYS: i64 = 30;

pub const ALLOWED_LOOKBACK_DAYS: [u16; 3] = [30, 60, 90];
pub const DEFAULT_LOOKBACK_DAYS: u16 = 30;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid date range: {from} is after {to}")]
pub struct InvalidRange {
    pub from: Date,
    pub to: Date,
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    pub from: Date,
    pub to: Date,
}

impl DateRange {
    pub fn new(from: Date, to: Date) -> Result<Self, InvalidRange> {
        if from > to {
            return Err(InvalidRange { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn single(date: Date) -> Self {
        Self { from: date, to: date }
    }

    /// The `days` days ending at `to`, inclusive.
    pub fn ending_at(to: Date, days: u16) -> Self {
        let back = i64::from(days.max(1)) - 1;
        Self {
            from: to.checked_sub(Duration::days(back)).unwrap_or(Date::MIN),
            to,
        }
    }

    /// Zero for a reversed range.
    pub fn len_days(&self) -> usize {
        usize::try_from((self.to - self.from).whole_days() + 1).unwrap_or(0)
    }

    /// Re-check a range that may have been built from its public fields.
    pub fn validated(self) -> Result<Self, InvalidRange> {
        Self::new(self.from, self.to)
    }

    pub fn contains(&self, date: Date) -> bool {
        self.from <= date && date <= self.to
    }

    pub fn days(&self) -> impl Iterator<Item = Date> {
        let to = self.to;
        let first = Some(self.from).filter(|from| *from <= to);
        std::iter::successors(first, move |d| d.next_day().filter(|next| *next <= to))
    }

    /// Same range with `days` extra days in front, used to fetch the
    /// baseline a day-over-day delta subtracts from.
    pub fn extend_back(&self, days: i64) -> Self {
        Self {
            from: self.from.checked_sub(Duration::days(days)).unwrap_or(Date::MIN),
            to: self.to,
        }
    }
}

/// Reporting period running from the 26th of one month through the 26th of
/// the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BillingCycle {
    start: Date,
}

impl BillingCycle {
    pub fn containing(date: Date) -> Self {
        let anchor = if date.day() >= CYCLE_START_DAY {
            date
        } else {
            date.replace_day(1)
                .ok()
                .and_then(|first| first.previous_day())
                .unwrap_or(date)
        };
        Self {
            start: anchor.replace_day(CYCLE_START_DAY).unwrap_or(anchor),
        }
    }

    pub fn start(&self) -> Date {
        self.start
    }

    pub fn range(&self) -> DateRange {
        DateRange {
            from: self.start,
            to: self
                .start
                .checked_add(Duration::days(CYCLE_SPAN_DAYS))
                .unwrap_or(Date::MAX),
        }
    }

    pub fn previous(&self) -> Self {
        match self.start.previous_day() {
            Some(day) => Self::containing(day),
            None => *self,
        }
    }
}

/// Trailing window of 30, 60 or 90 days anchored on the newest stored date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub struct Lookback(u16);

impl Lookback {
    /// Unsupported window sizes fall back to 30 days.
    pub fn new(days: u16) -> Self {
        if ALLOWED_LOOKBACK_DAYS.contains(&days) {
            Self(days)
        } else {
            Self(DEFAULT_LOOKBACK_DAYS)
        }
    }

    pub fn days(&self) -> u16 {
        self.0
    }

    pub fn ending_at(&self, latest: Date) -> DateRange {
        DateRange::ending_at(latest, self.0)
    }
}

impl Default for Lookback {
    fn default() -> Self {
        Self(DEFAULT_LOOKBACK_DAYS)
    }
}

impl From<u16> for Lookback {
    fn from(days: u16) -> Self {
        Self::new(days)
    }
}

impl From<Lookback> for u16 {
    fn from(lookback: Lookback) -> Self {
        lookback.0
    }
}
