//! Day-over-day deltas of cumulative meter counters.

use std::collections::BTreeMap;

use time::Date;
use water_client::domain::ReadingPoint;

use crate::period::DateRange;

/// Cumulative values of one entity, keyed by day.
pub type Series = BTreeMap<Date, f64>;

/// Totalizers restart from a fresh baseline on the first day of each month.
pub fn is_cycle_boundary(date: Date) -> bool {
    date.day() == 1
}

/// Raw increase of a production counter attributed to `date`.
///
/// - no reading on `date`: 0
/// - first day of the month: the reading itself
/// - no reading the day before: the reading itself
/// - otherwise: today minus yesterday, which may be negative after a meter
///   swap; callers clamp with [`clamp`] only when displaying.
pub fn delta(series: &Series, date: Date) -> f64 {
    let Some(&current) = series.get(&date) else {
        return 0.0;
    };

    if is_cycle_boundary(date) {
        return current;
    }

    match date.previous_day().and_then(|prev| series.get(&prev)) {
        Some(&previous) => current - previous,
        None => current,
    }
}

pub fn clamp(value: f64) -> f64 {
    // f64::max returns the non-NaN operand.
    value.max(0.0)
}

pub fn clamped_delta(series: &Series, date: Date) -> f64 {
    clamp(delta(series, date))
}

/// Customer register variant: no month reset, and nothing is attributed to a
/// day unless both it and the previous day were read.
pub fn register_delta(current: Option<f64>, previous: Option<f64>) -> f64 {
    match (current, previous) {
        (Some(current), Some(previous)) => clamp(current - previous),
        _ => 0.0,
    }
}

/// Raw deltas for every day of `range`, in order.
pub fn delta_series(series: &Series, range: DateRange) -> Vec<(Date, f64)> {
    range.days().map(|d| (d, delta(series, d))).collect()
}

/// Split a flat list of points into one series per entity.
pub fn series_by_entity(points: &[ReadingPoint]) -> BTreeMap<i32, Series> {
    let mut out: BTreeMap<i32, Series> = BTreeMap::new();
    for p in points {
        out.entry(p.entity_id).or_default().insert(p.date, p.value);
    }
    out
}
