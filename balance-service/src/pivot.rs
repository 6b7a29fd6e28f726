//! Date-row / entity-column tables paginated by distinct reading date.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use time::Date;
use water_client::domain::ReadingPoint;

use crate::period::{DateRange, Lookback};

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Which dates a pivot covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotWindow {
    /// Explicit bounds; overrides any lookback.
    Range(DateRange),
    /// Trailing window ending at the newest stored date.
    Lookback(Lookback),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    pub date: Date,
    /// One value per column, same order as [`PivotTable::columns`].
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotMeta {
    pub page: usize,
    pub pages: usize,
    pub page_size: usize,
    pub total_dates: usize,
    pub range_days: usize,
    pub range: Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub columns: Vec<String>,
    pub entity_ids: Vec<i32>,
    pub rows: Vec<PivotRow>,
    pub meta: PivotMeta,
}

impl PivotTable {
    pub fn empty(page_size: usize, range_days: usize, range: Option<DateRange>) -> Self {
        Self {
            columns: Vec::new(),
            entity_ids: Vec::new(),
            rows: Vec::new(),
            meta: PivotMeta {
                page: 1,
                pages: 1,
                page_size,
                total_dates: 0,
                range_days,
                range,
            },
        }
    }

    /// Every cell as (date, entity id, value).
    pub fn triples(&self) -> Vec<(Date, i32, f64)> {
        self.rows
            .iter()
            .flat_map(|row| {
                self.entity_ids
                    .iter()
                    .zip(&row.values)
                    .map(move |(id, value)| (row.date, *id, *value))
            })
            .collect()
    }
}

/// A page of dates, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePage {
    pub page: usize,
    pub pages: usize,
    pub dates: Vec<Date>,
}

/// Slice `dates` (any order) into pages of `page_size`, newest first. A page
/// past the end is clamped to the last page.
pub fn paginate(dates: &[Date], page: usize, page_size: usize) -> DatePage {
    let page_size = page_size.max(1);
    let mut sorted = dates.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();

    let pages = sorted.len().div_ceil(page_size).max(1);
    let page = page.clamp(1, pages);
    let dates = sorted
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    DatePage { page, pages, dates }
}

/// One row per date in `dates`, one column per id in `entity_ids`; cells
/// without a point are zero.
pub fn build_rows(dates: &[Date], entity_ids: &[i32], points: &[ReadingPoint]) -> Vec<PivotRow> {
    let mut cells: HashMap<(Date, i32), f64> = HashMap::with_capacity(points.len());
    for p in points {
        cells.insert((p.date, p.entity_id), p.value);
    }

    dates
        .iter()
        .map(|date| PivotRow {
            date: *date,
            values: entity_ids
                .iter()
                .map(|id| cells.get(&(*date, *id)).copied().unwrap_or(0.0))
                .collect(),
        })
        .collect()
}

/// Reassemble pages into (date, entity) -> value, for comparing paged output with
/// a single-page request.
pub fn merge_pages(pages: &[PivotTable]) -> BTreeMap<(Date, i32), f64> {
    pages
        .iter()
        .flat_map(|t| t.triples())
        .map(|(date, id, value)| ((date, id), value))
        .collect()
}
