//! Top-N customer selection and per-date aggregation with summary statistics.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::Date;

use crate::delta::Series;
use crate::period::DateRange;

pub const DEFAULT_TOP_N: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: Date,
    pub value: f64,
}

/// Totals over a series.
///
/// `min` only looks at strictly positive values so days without readings do
/// not pin it to zero; it is 0 when no value is positive. `average` divides by
/// the number of days, reading or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total: f64,
    pub average: f64,
    pub max: f64,
    pub min: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let total: f64 = values.iter().sum();
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = values
            .iter()
            .copied()
            .filter(|v| *v > 0.0)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.min(v))))
            .unwrap_or(0.0);

        Self {
            total,
            average: total / values.len() as f64,
            max,
            min,
        }
    }

    pub fn of_points(points: &[SeriesPoint]) -> Self {
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        Self::of(&values)
    }
}

/// Orders by total descending, then id ascending, and keeps the first `n`.
pub fn rank_top_n<I>(totals: I, n: usize) -> Vec<i32>
where
    I: IntoIterator<Item = (i32, f64)>,
{
    let mut totals: Vec<(i32, f64)> = totals.into_iter().collect();
    totals.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    totals.into_iter().take(n).map(|(id, _)| id).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSeries {
    pub entity_ids: Vec<i32>,
    pub points: Vec<SeriesPoint>,
    pub summary: Summary,
}

/// Sum the selected entities' values for every day of `range`.
///
/// Ids are a set, so an entity listed twice is counted once. Days an entity has
/// no value for contribute zero.
pub fn aggregate(per_entity: &BTreeMap<i32, Series>, ids: &BTreeSet<i32>, range: DateRange) -> AggregateSeries {
    let points: Vec<SeriesPoint> = range
        .days()
        .map(|date| SeriesPoint {
            date,
            value: ids
                .iter()
                .filter_map(|id| per_entity.get(id))
                .filter_map(|series| series.get(&date))
                .sum(),
        })
        .collect();

    AggregateSeries {
        entity_ids: ids.iter().copied().collect(),
        summary: Summary::of_points(&points),
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn summary_min_ignores_zero_days() {
        let s = Summary::of(&[0.0, 12.0, 0.0, 4.0, 9.0]);
        assert_eq!(s.total, 25.0);
        assert_eq!(s.average, 5.0);
        assert_eq!(s.max, 12.0);
        assert_eq!(s.min, 4.0);
    }

    #[test]
    fn summary_of_all_zero_or_empty_series() {
        assert_eq!(Summary::of(&[0.0, 0.0]), Summary::default());
        assert_eq!(Summary::of(&[]), Summary::default());
    }

    #[test]
    fn top_n_breaks_ties_by_ascending_id() {
        let totals = vec![(9, 50.0), (3, 80.0), (5, 50.0), (1, 10.0), (2, 50.0)];
        assert_eq!(rank_top_n(totals.clone(), 4), vec![3, 2, 5, 9]);
        // Same input, same answer.
        assert_eq!(rank_top_n(totals, 4), vec![3, 2, 5, 9]);
    }

    #[test]
    fn top_n_with_fewer_candidates_than_n() {
        assert_eq!(rank_top_n(vec![(4, 1.0)], DEFAULT_TOP_N), vec![4]);
        assert!(rank_top_n(Vec::new(), DEFAULT_TOP_N).is_empty());
    }

    #[test]
    fn aggregate_total_equals_sum_of_points() {
        let d1 = date!(2024 - 03 - 01);
        let d2 = date!(2024 - 03 - 02);
        let d3 = date!(2024 - 03 - 03);
        let mut per_entity = BTreeMap::new();
        per_entity.insert(1, [(d1, 10.0), (d2, 20.0)].into_iter().collect::<Series>());
        per_entity.insert(2, [(d2, 5.0), (d3, 7.0)].into_iter().collect::<Series>());
        per_entity.insert(3, [(d1, 1_000.0)].into_iter().collect::<Series>());

        let ids: BTreeSet<i32> = [1, 2, 2, 1].into_iter().collect();
        let range = DateRange::new(d1, d3).unwrap();
        let agg = aggregate(&per_entity, &ids, range);

        let values: Vec<f64> = agg.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![10.0, 25.0, 7.0]);
        assert_eq!(agg.summary.total, values.iter().sum::<f64>());
        assert_eq!(agg.entity_ids, vec![1, 2]);
    }
}
