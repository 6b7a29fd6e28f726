//! Caller-facing computations over a [`ReadingStore`].
//!
//! The engine keeps no state between calls: every operation reads the bounded
//! window it needs and derives its result from scratch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use time::Date;
use water_client::domain::{Customer, WastewaterPlantRecord};

use crate::consumption::{
    history_by_customer, CoefficientTable, ConsumptionCalculator, CustomerDelta, NonDailyPolicy, ReadingHistory,
    DEFAULT_WATER_RATIO,
};
use crate::delta::{self, Series};
use crate::mass_balance::{BalanceInputs, MassBalance, DEFAULT_OUTPUT_FACTOR};
use crate::period::{DateRange, InvalidRange, Lookback};
use crate::pivot::{self, PivotMeta, PivotTable, PivotWindow, DEFAULT_PAGE_SIZE};
use crate::ranking::{self, AggregateSeries, SeriesPoint, Summary, DEFAULT_TOP_N};
use crate::store::{EntityKind, ReadingStore, StoreError};

/// Days searched before a period for the opening register reading of
/// accounts read once per cycle.
pub const PERIOD_BASELINE_DAYS: i64 = 62;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub output_factor: f64,
    pub top_n: usize,
    pub page_size: usize,
    pub default_lookback: Lookback,
    pub non_daily: NonDailyPolicy,
    pub default_water_ratio: f64,
    pub coefficients: CoefficientTable,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            output_factor: DEFAULT_OUTPUT_FACTOR,
            top_n: DEFAULT_TOP_N,
            page_size: DEFAULT_PAGE_SIZE,
            default_lookback: Lookback::default(),
            non_daily: NonDailyPolicy::default(),
            default_water_ratio: DEFAULT_WATER_RATIO,
            coefficients: CoefficientTable::default(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    InvalidRange(#[from] InvalidRange),
    #[error("page numbers start at 1")]
    InvalidPage,
    #[error("unknown customer {0}")]
    UnknownCustomer(i32),
}

/// Daily series a dashboard can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Sum of per-well deltas.
    WellProduction,
    /// Mass-balance output.
    CleanWaterOutput,
    WastewaterInflow,
    WastewaterOutflow,
    /// Combined register deltas of the selected customers.
    CustomerClean,
    CustomerWastewater,
    /// Plant PAC, NaOH and polymer plus wastewater-plant chemicals.
    Chemicals,
    Sludge,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::WellProduction,
        Metric::CleanWaterOutput,
        Metric::WastewaterInflow,
        Metric::WastewaterOutflow,
        Metric::CustomerClean,
        Metric::CustomerWastewater,
        Metric::Chemicals,
        Metric::Sludge,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::WellProduction => "well_production",
            Metric::CleanWaterOutput => "clean_water_output",
            Metric::WastewaterInflow => "wastewater_inflow",
            Metric::WastewaterOutflow => "wastewater_outflow",
            Metric::CustomerClean => "customer_clean",
            Metric::CustomerWastewater => "customer_wastewater",
            Metric::Chemicals => "chemicals",
            Metric::Sludge => "sludge",
        }
    }
}

/// Entity selection for [`BalanceEngine::series`]: well ids, wastewater plant
/// numbers or customer ids depending on the metric. `None` means every well or
/// plant, and the top-N default set for customer metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesFilter {
    pub entity_ids: Option<Vec<i32>>,
}

impl SeriesFilter {
    pub fn entities<I: IntoIterator<Item = i32>>(ids: I) -> Self {
        Self {
            entity_ids: Some(ids.into_iter().collect()),
        }
    }

    fn ids(&self) -> Option<&[i32]> {
        self.entity_ids.as_deref()
    }
}

/// Headline figures for one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KpiSnapshot {
    pub date: Date,
    pub wells_delta: f64,
    pub month_to_date_production: f64,
    pub clean_water_output: f64,
    pub wastewater_inflow: f64,
    pub active_customers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupLine {
    pub label: &'static str,
    pub points: Vec<SeriesPoint>,
    pub summary: Summary,
}

impl RollupLine {
    fn new(label: &'static str, points: Vec<SeriesPoint>) -> Self {
        Self {
            label,
            summary: Summary::of_points(&points),
            points,
        }
    }
}

/// Period report: one line per figure, all aligned to the same dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRollup {
    pub range: DateRange,
    pub lines: Vec<RollupLine>,
    /// Wastewater inflow + chemicals + sludge.
    pub waste_total: RollupLine,
    /// Period consumption of every customer the non-daily policy counts in
    /// period totals.
    pub customer_period_total: CustomerDelta,
}

type CustomerDays = BTreeMap<i32, BTreeMap<Date, CustomerDelta>>;
type WastewaterField = fn(&WastewaterPlantRecord) -> Option<f64>;

/// One point per day of `range`; days without a sum are zero.
fn align(range: DateRange, sums: &Series) -> Vec<SeriesPoint> {
    range
        .days()
        .map(|date| SeriesPoint {
            date,
            value: sums.get(&date).copied().unwrap_or(0.0),
        })
        .collect()
}

fn customer_totals(days: &CustomerDays) -> BTreeMap<Date, CustomerDelta> {
    let mut totals: BTreeMap<Date, CustomerDelta> = BTreeMap::new();
    for per_day in days.values() {
        for (date, delta) in per_day {
            *totals.entry(*date).or_default() += *delta;
        }
    }
    totals
}

fn finish(op: &'static str, started: Instant) {
    metrics::counter!("engine_computations_total", "op" => op).increment(1);
    metrics::histogram!("engine_compute_seconds", "op" => op).record(started.elapsed().as_secs_f64());
}

#[derive(Clone)]
pub struct BalanceEngine {
    store: Arc<dyn ReadingStore>,
    settings: EngineSettings,
}

impl BalanceEngine {
    pub fn new(store: Arc<dyn ReadingStore>, settings: EngineSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn calculator(&self) -> ConsumptionCalculator<'_> {
        ConsumptionCalculator::new(&self.settings.coefficients, self.settings.default_water_ratio)
    }

    /// Raw (unclamped) sum of per-well deltas for every day of `range`.
    async fn well_deltas(&self, ids: Option<&[i32]>, range: DateRange) -> Result<Series, EngineError> {
        let points = self.store.points(EntityKind::Well, ids, range.extend_back(1)).await?;
        let mut sums: Series = range.days().map(|d| (d, 0.0)).collect();
        for series in delta::series_by_entity(&points).values() {
            for (date, value) in delta::delta_series(series, range) {
                *sums.entry(date).or_insert(0.0) += value;
            }
        }
        Ok(sums)
    }

    async fn balance_inputs(&self, range: DateRange) -> Result<BalanceInputs, EngineError> {
        let window = range.extend_back(1);
        let wells = self.store.points(EntityKind::Well, None, window).await?;
        let plants = self.store.plant_records(range).await?;
        let tanks = self.store.sum_by_date(EntityKind::Tank, None, window).await?;
        Ok(BalanceInputs::new(&wells, &plants, tanks))
    }

    async fn wastewater_sums(
        &self,
        plant_numbers: Option<&[i32]>,
        range: DateRange,
        field: WastewaterField,
    ) -> Result<Series, EngineError> {
        let records = self.store.wastewater_records(plant_numbers, range).await?;
        let mut sums = Series::new();
        for r in &records {
            *sums.entry(r.date).or_insert(0.0) += field(r).unwrap_or(0.0);
        }
        Ok(sums)
    }

    async fn customer_directory(&self) -> Result<BTreeMap<i32, Customer>, EngineError> {
        Ok(self.store.customers().await?.into_iter().map(|c| (c.id, c)).collect())
    }

    /// Explicit ids are taken as given (each once); otherwise every customer
    /// the non-daily policy admits to daily series.
    async fn select_customers(&self, ids: Option<&[i32]>) -> Result<Vec<Customer>, EngineError> {
        let mut directory = self.customer_directory().await?;
        match ids {
            Some(ids) => ids
                .iter()
                .copied()
                .collect::<BTreeSet<i32>>()
                .into_iter()
                .map(|id| directory.remove(&id).ok_or(EngineError::UnknownCustomer(id)))
                .collect(),
            None => Ok(directory
                .into_values()
                .filter(|c| self.settings.non_daily.in_daily_series(c))
                .collect()),
        }
    }

    async fn customer_histories(
        &self,
        customers: &[Customer],
        window: DateRange,
    ) -> Result<BTreeMap<i32, ReadingHistory>, EngineError> {
        if customers.is_empty() {
            return Ok(BTreeMap::new());
        }
        let ids: Vec<i32> = customers.iter().map(|c| c.id).collect();
        let readings = self.store.customer_readings(Some(ids.as_slice()), window).await?;
        Ok(history_by_customer(readings))
    }

    async fn customer_days(&self, customers: &[Customer], range: DateRange) -> Result<CustomerDays, EngineError> {
        let histories = self.customer_histories(customers, range.extend_back(1)).await?;
        let calc = self.calculator();
        let empty = ReadingHistory::new();

        Ok(customers
            .iter()
            .map(|c| {
                let history = histories.get(&c.id).unwrap_or(&empty);
                let days = range.days().map(|d| (d, calc.daily(c, history, d))).collect();
                (c.id, days)
            })
            .collect())
    }

    /// Per-entity daily quantities: clamped deltas for wells and customers,
    /// stored values for tanks and wastewater plants.
    async fn daily_values(
        &self,
        kind: EntityKind,
        ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<BTreeMap<i32, Series>, EngineError> {
        match kind {
            EntityKind::Well => {
                let points = self.store.points(kind, ids, range.extend_back(1)).await?;
                Ok(delta::series_by_entity(&points)
                    .into_iter()
                    .map(|(id, series)| {
                        let deltas = range.days().map(|d| (d, delta::clamped_delta(&series, d))).collect();
                        (id, deltas)
                    })
                    .collect())
            }
            EntityKind::Tank | EntityKind::WastewaterPlant => {
                let points = self.store.points(kind, ids, range).await?;
                Ok(delta::series_by_entity(&points))
            }
            EntityKind::Customer => {
                let customers = self.select_customers(ids).await?;
                let days = self.customer_days(&customers, range).await?;
                Ok(days
                    .into_iter()
                    .map(|(id, per_day)| (id, per_day.into_iter().map(|(d, v)| (d, v.clean)).collect()))
                    .collect())
            }
        }
    }

    /// Net clean water supplied on `date`, unclamped, with every term.
    pub async fn daily_clean_water_output(&self, date: Date) -> Result<MassBalance, EngineError> {
        let started = Instant::now();
        let inputs = self.balance_inputs(DateRange::single(date)).await?;
        let balance = inputs.balance(date, self.settings.output_factor);
        tracing::debug!(%date, output = balance.output, "computed mass balance");
        finish("daily_clean_water_output", started);
        Ok(balance)
    }

    pub async fn customer_delta(&self, customer_id: i32, date: Date) -> Result<CustomerDelta, EngineError> {
        let started = Instant::now();
        let customers = self.select_customers(Some(&[customer_id][..])).await?;
        let histories = self
            .customer_histories(&customers, DateRange::single(date).extend_back(1))
            .await?;
        let calc = self.calculator();
        let delta = customers
            .first()
            .map(|c| {
                histories
                    .get(&c.id)
                    .map(|h| calc.daily(c, h, date))
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        finish("customer_delta", started);
        Ok(delta)
    }

    /// Consumption over a whole period, whatever the account's reading
    /// frequency.
    pub async fn period_consumption(&self, customer_id: i32, range: DateRange) -> Result<CustomerDelta, EngineError> {
        let range = range.validated()?;
        let started = Instant::now();
        let customers = self.select_customers(Some(&[customer_id][..])).await?;
        let histories = self
            .customer_histories(&customers, range.extend_back(PERIOD_BASELINE_DAYS))
            .await?;
        let calc = self.calculator();
        let total = customers
            .first()
            .and_then(|c| histories.get(&c.id).map(|h| calc.period(c, h, range)))
            .unwrap_or_default();
        finish("period_consumption", started);
        Ok(total)
    }

    /// The `n` largest clean-water consumers over `range` among customers
    /// eligible for daily series that have at least one reading in it.
    pub async fn top_n_customers(&self, range: DateRange, n: usize) -> Result<Vec<i32>, EngineError> {
        let range = range.validated()?;
        let started = Instant::now();
        let customers = self.select_customers(None).await?;
        let histories = self.customer_histories(&customers, range.extend_back(1)).await?;
        let calc = self.calculator();

        let totals: Vec<(i32, f64)> = customers
            .iter()
            .filter_map(|c| {
                let history = histories.get(&c.id)?;
                history.range(range.from..=range.to).next()?;
                let total: f64 = range.days().map(|d| calc.daily(c, history, d).clean).sum();
                Some((c.id, total))
            })
            .collect();
        let candidates = totals.len();
        let top = ranking::rank_top_n(totals, n);

        tracing::debug!(from = %range.from, to = %range.to, candidates, selected = ?top, "ranked customers");
        finish("top_n_customers", started);
        Ok(top)
    }

    /// Sum the daily quantities of the chosen entities (all of them when `ids`
    /// is `None`) into one series with its summary.
    pub async fn aggregate_series(
        &self,
        kind: EntityKind,
        ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<AggregateSeries, EngineError> {
        let range = range.validated()?;
        let started = Instant::now();
        let per_entity = self.daily_values(kind, ids, range).await?;
        let selected: BTreeSet<i32> = match ids {
            Some(ids) => ids.iter().copied().collect(),
            None => per_entity.keys().copied().collect(),
        };
        let aggregate = ranking::aggregate(&per_entity, &selected, range);
        finish("aggregate_series", started);
        Ok(aggregate)
    }

    /// One point per day of `range` for `metric`, clamped for display.
    pub async fn series(
        &self,
        metric: Metric,
        range: DateRange,
        filter: &SeriesFilter,
    ) -> Result<Vec<SeriesPoint>, EngineError> {
        let range = range.validated()?;
        let started = Instant::now();
        let ids = filter.ids();

        let sums: Series = match metric {
            Metric::WellProduction => self
                .well_deltas(ids, range)
                .await?
                .into_iter()
                .map(|(d, v)| (d, delta::clamp(v)))
                .collect(),
            Metric::CleanWaterOutput => {
                let inputs = self.balance_inputs(range).await?;
                range
                    .days()
                    .map(|d| (d, inputs.balance(d, self.settings.output_factor).display_output()))
                    .collect()
            }
            Metric::WastewaterInflow => self.wastewater_sums(ids, range, |r| r.input_flow).await?,
            Metric::WastewaterOutflow => self.wastewater_sums(ids, range, |r| r.output_flow).await?,
            Metric::Sludge => self.wastewater_sums(ids, range, |r| r.sludge_output).await?,
            Metric::Chemicals => {
                let mut sums = self.wastewater_sums(ids, range, |r| r.chemical_usage).await?;
                for p in self.store.plant_records(range).await? {
                    *sums.entry(p.date).or_insert(0.0) += p.chemical_total();
                }
                sums
            }
            Metric::CustomerClean | Metric::CustomerWastewater => {
                let customers = match ids {
                    Some(ids) => self.select_customers(Some(ids)).await?,
                    None => {
                        let top = self.top_n_customers(range, self.settings.top_n).await?;
                        self.select_customers(Some(top.as_slice())).await?
                    }
                };
                let days = self.customer_days(&customers, range).await?;
                customer_totals(&days)
                    .into_iter()
                    .map(|(d, t)| match metric {
                        Metric::CustomerClean => (d, t.clean),
                        _ => (d, t.wastewater),
                    })
                    .collect()
            }
        };

        tracing::debug!(metric = metric.label(), from = %range.from, to = %range.to, "computed series");
        finish("series", started);
        Ok(align(range, &sums))
    }

    pub fn summary(&self, series: &[SeriesPoint]) -> Summary {
        Summary::of_points(series)
    }

    /// A page of `kind` readings as date rows and entity columns.
    ///
    /// Columns are the requested ids, or every entity with a reading anywhere
    /// in the window, so every page of one request has the same columns.
    pub async fn pivot(
        &self,
        kind: EntityKind,
        window: PivotWindow,
        entity_ids: Option<&[i32]>,
        page: usize,
    ) -> Result<PivotTable, EngineError> {
        if page == 0 {
            return Err(EngineError::InvalidPage);
        }
        let started = Instant::now();
        let page_size = self.settings.page_size;

        let range = match window {
            PivotWindow::Range(range) => range.validated()?,
            PivotWindow::Lookback(lookback) => match self.store.latest_date(kind).await? {
                Some(latest) => lookback.ending_at(latest),
                None => {
                    finish("pivot", started);
                    return Ok(PivotTable::empty(page_size, usize::from(lookback.days()), None));
                }
            },
        };

        let points = self.store.points(kind, entity_ids, range).await?;
        let dates: Vec<Date> = points
            .iter()
            .map(|p| p.date)
            .collect::<BTreeSet<Date>>()
            .into_iter()
            .collect();
        let date_page = pivot::paginate(&dates, page, page_size);

        let ids: Vec<i32> = match entity_ids {
            Some(ids) => ids.iter().copied().collect::<BTreeSet<i32>>().into_iter().collect(),
            None => points
                .iter()
                .map(|p| p.entity_id)
                .collect::<BTreeSet<i32>>()
                .into_iter()
                .collect(),
        };
        let rows = pivot::build_rows(&date_page.dates, &ids, &points);

        tracing::debug!(
            ?kind,
            page = date_page.page,
            pages = date_page.pages,
            total_dates = dates.len(),
            "built pivot page"
        );
        finish("pivot", started);

        Ok(PivotTable {
            columns: ids.iter().map(|id| kind.column_label(*id)).collect(),
            entity_ids: ids,
            rows,
            meta: PivotMeta {
                page: date_page.page,
                pages: date_page.pages,
                page_size,
                total_dates: dates.len(),
                range_days: range.len_days(),
                range: Some(range),
            },
        })
    }

    pub async fn kpi(&self, date: Date) -> Result<KpiSnapshot, EngineError> {
        let started = Instant::now();
        let month = DateRange {
            from: date.replace_day(1).unwrap_or(date),
            to: date,
        };

        let wells = self.well_deltas(None, month).await?;
        let wells_delta = delta::clamp(wells.get(&date).copied().unwrap_or(0.0));
        let month_to_date_production = wells.values().map(|v| delta::clamp(*v)).sum();

        let balance = self
            .balance_inputs(DateRange::single(date))
            .await?
            .balance(date, self.settings.output_factor);
        let wastewater_inflow = self
            .wastewater_sums(None, DateRange::single(date), |r| r.input_flow)
            .await?
            .values()
            .sum();
        let active_customers = self.store.customers().await?.iter().filter(|c| c.is_active).count();

        finish("kpi", started);
        Ok(KpiSnapshot {
            date,
            wells_delta,
            month_to_date_production,
            clean_water_output: balance.display_output(),
            wastewater_inflow,
            active_customers,
        })
    }

    pub async fn period_rollup(&self, range: DateRange) -> Result<PeriodRollup, EngineError> {
        let range = range.validated()?;
        let started = Instant::now();
        let all = SeriesFilter::default();

        let well_production = self.series(Metric::WellProduction, range, &all).await?;
        let clean_water_output = self.series(Metric::CleanWaterOutput, range, &all).await?;
        let wastewater = self.series(Metric::WastewaterInflow, range, &all).await?;
        let chemicals = self.series(Metric::Chemicals, range, &all).await?;
        let sludge = self.series(Metric::Sludge, range, &all).await?;

        let daily_customers = self.select_customers(None).await?;
        let clean_by_day: Series = customer_totals(&self.customer_days(&daily_customers, range).await?)
            .into_iter()
            .map(|(d, t)| (d, t.clean))
            .collect();
        let customer_clean = align(range, &clean_by_day);

        let waste_total: Vec<SeriesPoint> = wastewater
            .iter()
            .zip(&chemicals)
            .zip(&sludge)
            .map(|((w, c), s)| SeriesPoint {
                date: w.date,
                value: w.value + c.value + s.value,
            })
            .collect();

        let period_customers: Vec<Customer> = self
            .customer_directory()
            .await?
            .into_values()
            .filter(|c| self.settings.non_daily.in_period_totals(c))
            .collect();
        let histories = self
            .customer_histories(&period_customers, range.extend_back(PERIOD_BASELINE_DAYS))
            .await?;
        let calc = self.calculator();
        let mut customer_period_total = CustomerDelta::default();
        for c in &period_customers {
            if let Some(history) = histories.get(&c.id) {
                customer_period_total += calc.period(c, history, range);
            }
        }

        tracing::info!(
            from = %range.from,
            to = %range.to,
            customers = period_customers.len(),
            "computed period rollup"
        );
        finish("period_rollup", started);

        Ok(PeriodRollup {
            range,
            lines: vec![
                RollupLine::new(Metric::WellProduction.label(), well_production),
                RollupLine::new(Metric::CleanWaterOutput.label(), clean_water_output),
                RollupLine::new(Metric::CustomerClean.label(), customer_clean),
                RollupLine::new(Metric::WastewaterInflow.label(), wastewater),
                RollupLine::new(Metric::Chemicals.label(), chemicals),
                RollupLine::new(Metric::Sludge.label(), sludge),
            ],
            waste_total: RollupLine::new("waste_total", waste_total),
            customer_period_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumption::Coefficients;
    use crate::store::MemoryReadingStore;
    use time::macros::date;
    use water_client::domain::{CustomerMeterReading, PlantRecord, TankSnapshot, WellReading};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn engine(store: MemoryReadingStore, settings: EngineSettings) -> BalanceEngine {
        BalanceEngine::new(Arc::new(store), settings)
    }

    fn range(from: Date, to: Date) -> DateRange {
        DateRange::new(from, to).unwrap()
    }

    fn well(store: &mut MemoryReadingStore, id: i32, date: Date, production: f64) {
        store
            .insert_well(WellReading {
                well_id: id,
                date,
                production: Some(production),
            })
            .unwrap();
    }

    fn tank(store: &mut MemoryReadingStore, id: i32, date: Date, level: f64) {
        store
            .insert_tank(TankSnapshot {
                tank_id: id,
                date,
                level: Some(level),
            })
            .unwrap();
    }

    fn customer(id: i32, daily_reading: bool, water_ratio: Option<f64>) -> Customer {
        Customer {
            id,
            company_name: format!("customer {id}"),
            is_active: true,
            daily_reading,
            water_ratio,
        }
    }

    fn meter(store: &mut MemoryReadingStore, id: i32, date: Date, register_1: f64) {
        store
            .insert_customer_reading(CustomerMeterReading {
                clean_water_reading: Some(register_1),
                ..CustomerMeterReading::new(id, date)
            })
            .unwrap();
    }

    #[tokio::test]
    async fn mass_balance_for_one_day() {
        let mut store = MemoryReadingStore::default();
        well(&mut store, 1, date!(2024 - 03 - 09), 4000.0);
        well(&mut store, 1, date!(2024 - 03 - 10), 4600.0);
        well(&mut store, 2, date!(2024 - 03 - 09), 1000.0);
        well(&mut store, 2, date!(2024 - 03 - 10), 1400.0);
        store
            .insert_plant(PlantRecord {
                raw_water_secondary: Some(200.0),
                ..PlantRecord::new(date!(2024 - 03 - 10))
            })
            .unwrap();
        tank(&mut store, 1, date!(2024 - 03 - 09), 300.0);
        tank(&mut store, 2, date!(2024 - 03 - 09), 200.0);
        tank(&mut store, 1, date!(2024 - 03 - 10), 250.0);
        tank(&mut store, 2, date!(2024 - 03 - 10), 200.0);
        let engine = engine(store, EngineSettings::default());

        let balance = engine.daily_clean_water_output(date!(2024 - 03 - 10)).await.unwrap();
        assert!(approx(balance.wells_delta, 1000.0));
        assert!(approx(balance.secondary_offtake, 200.0));
        assert!(approx(balance.inventory_previous, 500.0));
        assert!(approx(balance.inventory_current, 450.0));
        assert!(approx(balance.output, 826.0));

        let day = DateRange::single(date!(2024 - 03 - 10));
        let series = engine
            .series(Metric::CleanWaterOutput, day, &SeriesFilter::default())
            .await
            .unwrap();
        assert_eq!(series.len(), 1);
        assert!(approx(series[0].value, 826.0));
    }

    #[tokio::test]
    async fn missing_inputs_balance_to_zero() {
        let engine = engine(MemoryReadingStore::default(), EngineSettings::default());
        let balance = engine.daily_clean_water_output(date!(2024 - 03 - 10)).await.unwrap();
        assert_eq!(balance.output, 0.0);
    }

    #[tokio::test]
    async fn well_production_resets_on_first_of_month() {
        let mut store = MemoryReadingStore::default();
        well(&mut store, 1, date!(2024 - 01 - 30), 450.0);
        well(&mut store, 1, date!(2024 - 02 - 01), 500.0);
        well(&mut store, 1, date!(2024 - 02 - 02), 530.0);
        well(&mut store, 1, date!(2024 - 02 - 04), 600.0);
        let engine = engine(store, EngineSettings::default());

        let series = engine
            .series(
                Metric::WellProduction,
                range(date!(2024 - 02 - 01), date!(2024 - 02 - 04)),
                &SeriesFilter::default(),
            )
            .await
            .unwrap();
        let values: Vec<f64> = series.iter().map(|p| p.value).collect();
        // day 3 has no reading, day 4 follows a gap
        assert_eq!(values, vec![500.0, 30.0, 0.0, 600.0]);
    }

    #[tokio::test]
    async fn first_of_month_ignores_previous_day() {
        let mut store = MemoryReadingStore::default();
        well(&mut store, 1, date!(2024 - 01 - 31), 480.0);
        well(&mut store, 1, date!(2024 - 02 - 01), 500.0);
        let engine = engine(store, EngineSettings::default());

        let series = engine
            .series(
                Metric::WellProduction,
                DateRange::single(date!(2024 - 02 - 01)),
                &SeriesFilter::entities([1]),
            )
            .await
            .unwrap();
        assert_eq!(series[0].value, 500.0);
    }

    #[tokio::test]
    async fn customer_delta_applies_coefficients_and_ratio() {
        let mut store = MemoryReadingStore::default();
        store.insert_customer(customer(7, true, Some(0.5))).unwrap();
        store.insert_customer(customer(9, true, None)).unwrap();
        store
            .insert_customer_reading(CustomerMeterReading {
                clean_water_reading: Some(100.0),
                clean_water_reading_2: Some(50.0),
                ..CustomerMeterReading::new(7, date!(2024 - 03 - 09))
            })
            .unwrap();
        store
            .insert_customer_reading(CustomerMeterReading {
                clean_water_reading: Some(103.0),
                clean_water_reading_2: Some(55.0),
                ..CustomerMeterReading::new(7, date!(2024 - 03 - 10))
            })
            .unwrap();
        meter(&mut store, 9, date!(2024 - 03 - 09), 1000.0);
        meter(&mut store, 9, date!(2024 - 03 - 10), 1100.0);

        let settings = EngineSettings {
            coefficients: CoefficientTable::default().with_override(7, Coefficients([10.0, 1.0, 0.0])),
            ..EngineSettings::default()
        };
        let engine = engine(store, settings);

        let d7 = engine.customer_delta(7, date!(2024 - 03 - 10)).await.unwrap();
        assert!(approx(d7.clean, 35.0));
        assert!(approx(d7.wastewater, 17.5));

        let d9 = engine.customer_delta(9, date!(2024 - 03 - 10)).await.unwrap();
        assert!(approx(d9.clean, 100.0));
        assert!(approx(d9.wastewater, 80.0));

        // no previous day: nothing attributed
        let first = engine.customer_delta(9, date!(2024 - 03 - 09)).await.unwrap();
        assert_eq!(first, CustomerDelta::default());
    }

    #[tokio::test]
    async fn metered_wastewater_wins_over_ratio() {
        let mut store = MemoryReadingStore::default();
        store.insert_customer(customer(10, true, Some(0.8))).unwrap();
        for (date, clean, waste) in [
            (date!(2024 - 03 - 09), 500.0, 40.0),
            (date!(2024 - 03 - 10), 520.0, 46.0),
        ] {
            store
                .insert_customer_reading(CustomerMeterReading {
                    clean_water_reading: Some(clean),
                    wastewater_reading: Some(waste),
                    ..CustomerMeterReading::new(10, date)
                })
                .unwrap();
        }
        let engine = engine(store, EngineSettings::default());

        let d = engine.customer_delta(10, date!(2024 - 03 - 10)).await.unwrap();
        assert!(approx(d.clean, 20.0));
        assert!(approx(d.wastewater, 6.0));
    }

    #[tokio::test]
    async fn unknown_customer_is_an_error() {
        let engine = engine(MemoryReadingStore::default(), EngineSettings::default());
        let err = engine.customer_delta(99, date!(2024 - 03 - 10)).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownCustomer(99)));
    }

    /// Customers 1-5 daily with totals 10, 30, 30, 5, 20 on 2024-03-02; 6 is read
    /// once per cycle, 7 is inactive, 8 has no reading in the window.
    fn ranking_store() -> MemoryReadingStore {
        let mut store = MemoryReadingStore::default();
        for (id, total) in [(1, 10.0), (2, 30.0), (3, 30.0), (4, 5.0), (5, 20.0), (6, 100.0), (7, 200.0)] {
            let mut c = customer(id, id != 6, None);
            c.is_active = id != 7;
            store.insert_customer(c).unwrap();
            meter(&mut store, id, date!(2024 - 03 - 01), 100.0);
            meter(&mut store, id, date!(2024 - 03 - 02), 100.0 + total);
        }
        store.insert_customer(customer(8, true, None)).unwrap();
        meter(&mut store, 8, date!(2024 - 02 - 20), 10.0);
        store
    }

    #[tokio::test]
    async fn top_n_is_deterministic_with_id_tiebreak() {
        let engine = engine(ranking_store(), EngineSettings::default());
        let window = DateRange::single(date!(2024 - 03 - 02));

        let first = engine.top_n_customers(window, 4).await.unwrap();
        let second = engine.top_n_customers(window, 4).await.unwrap();
        assert_eq!(first, vec![2, 3, 5, 1]);
        assert_eq!(first, second);

        assert_eq!(engine.top_n_customers(window, 10).await.unwrap(), vec![2, 3, 5, 1, 4]);
    }

    #[tokio::test]
    async fn customer_series_defaults_to_top_n() {
        let engine = engine(ranking_store(), EngineSettings::default());
        let window = range(date!(2024 - 03 - 01), date!(2024 - 03 - 02));

        let default_set = engine
            .series(Metric::CustomerClean, window, &SeriesFilter::default())
            .await
            .unwrap();
        assert_eq!(default_set.len(), 2);
        assert_eq!(default_set[0].value, 0.0);
        assert!(approx(default_set[1].value, 90.0));

        let chosen = engine
            .series(Metric::CustomerWastewater, window, &SeriesFilter::entities([4, 4]))
            .await
            .unwrap();
        assert!(approx(chosen[1].value, 4.0));
    }

    #[tokio::test]
    async fn include_policy_ranks_non_daily_customers() {
        let settings = EngineSettings {
            non_daily: NonDailyPolicy::Include,
            ..EngineSettings::default()
        };
        let engine = engine(ranking_store(), settings);
        let window = DateRange::single(date!(2024 - 03 - 02));
        assert_eq!(engine.top_n_customers(window, 4).await.unwrap(), vec![6, 2, 3, 5]);
    }

    fn period_store() -> MemoryReadingStore {
        let mut store = MemoryReadingStore::default();
        store.insert_customer(customer(1, true, None)).unwrap();
        store.insert_customer(customer(6, false, None)).unwrap();
        meter(&mut store, 1, date!(2024 - 02 - 29), 100.0);
        meter(&mut store, 1, date!(2024 - 03 - 31), 150.0);
        meter(&mut store, 6, date!(2024 - 02 - 26), 1000.0);
        meter(&mut store, 6, date!(2024 - 03 - 26), 1300.0);
        store
    }

    #[tokio::test]
    async fn non_daily_policy_controls_period_totals() {
        let march = range(date!(2024 - 03 - 01), date!(2024 - 03 - 31));

        let excluded = engine(period_store(), EngineSettings::default());
        let rollup = excluded.period_rollup(march).await.unwrap();
        assert!(approx(rollup.customer_period_total.clean, 50.0));

        for policy in [NonDailyPolicy::PeriodOnly, NonDailyPolicy::Include] {
            let settings = EngineSettings {
                non_daily: policy,
                ..EngineSettings::default()
            };
            let rollup = engine(period_store(), settings).period_rollup(march).await.unwrap();
            assert!(approx(rollup.customer_period_total.clean, 350.0));
            assert!(approx(rollup.customer_period_total.wastewater, 280.0));
        }

        let period_only = engine(
            period_store(),
            EngineSettings {
                non_daily: NonDailyPolicy::PeriodOnly,
                ..EngineSettings::default()
            },
        );
        assert!(period_only.top_n_customers(march, 4).await.unwrap().iter().all(|id| *id != 6));

        let c6 = excluded.period_consumption(6, march).await.unwrap();
        assert!(approx(c6.clean, 300.0));
        assert!(approx(c6.wastewater, 240.0));
    }

    #[tokio::test]
    async fn period_rollup_lines_share_dates() {
        let mut store = period_store();
        store
            .insert_wastewater(WastewaterPlantRecord {
                input_flow: Some(70.0),
                chemical_usage: Some(3.0),
                sludge_output: Some(2.0),
                ..WastewaterPlantRecord::new(1, date!(2024 - 03 - 05))
            })
            .unwrap();
        store
            .insert_plant(PlantRecord {
                pac_usage: Some(1.0),
                naoh_usage: Some(0.5),
                ..PlantRecord::new(date!(2024 - 03 - 05))
            })
            .unwrap();
        let engine = engine(store, EngineSettings::default());
        let week = range(date!(2024 - 03 - 01), date!(2024 - 03 - 07));

        let rollup = engine.period_rollup(week).await.unwrap();
        assert_eq!(rollup.lines.len(), 6);
        assert!(rollup.lines.iter().all(|line| line.points.len() == 7));
        assert_eq!(rollup.waste_total.points.len(), 7);
        assert!(approx(rollup.waste_total.summary.total, 70.0 + 3.0 + 1.5 + 2.0));
        let chemicals = rollup.lines.iter().find(|l| l.label == "chemicals").unwrap();
        assert!(approx(chemicals.summary.total, 4.5));
        assert!(approx(chemicals.summary.min, 4.5));
    }

    #[tokio::test]
    async fn aggregate_total_matches_points() {
        let mut store = MemoryReadingStore::default();
        let days = range(date!(2024 - 03 - 01), date!(2024 - 03 - 03));
        for (i, d) in days.days().enumerate() {
            tank(&mut store, 1, d, 100.0 + i as f64);
            tank(&mut store, 2, d, 50.0);
        }
        tank(&mut store, 3, date!(2024 - 03 - 02), 999.0);
        let engine = engine(store, EngineSettings::default());

        let agg = engine
            .aggregate_series(EntityKind::Tank, Some(&[1, 2, 2][..]), days)
            .await
            .unwrap();
        assert_eq!(agg.entity_ids, vec![1, 2]);
        let point_sum: f64 = agg.points.iter().map(|p| p.value).sum();
        assert!(approx(agg.summary.total, point_sum));
        assert!(approx(agg.summary.total, 303.0 + 150.0));

        let all = engine.aggregate_series(EntityKind::Tank, None, days).await.unwrap();
        assert_eq!(all.entity_ids, vec![1, 2, 3]);
        assert!(approx(all.summary.total, 303.0 + 150.0 + 999.0));
    }

    fn pivot_store() -> MemoryReadingStore {
        let mut store = MemoryReadingStore::default();
        let days = range(date!(2024 - 01 - 01), date!(2024 - 01 - 25));
        for (i, d) in days.days().enumerate() {
            if d == date!(2024 - 01 - 13) {
                continue;
            }
            well(&mut store, 1, d, 1000.0 + i as f64);
            well(&mut store, 2, d, 2000.0 + 2.0 * i as f64);
            if d.day() % 2 == 1 {
                well(&mut store, 3, d, 3000.0 + 3.0 * i as f64);
            }
        }
        store
    }

    fn paged(page_size: usize) -> BalanceEngine {
        engine(
            pivot_store(),
            EngineSettings {
                page_size,
                ..EngineSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn pivot_pages_reassemble_to_single_page() {
        let window = PivotWindow::Range(range(date!(2024 - 01 - 01), date!(2024 - 01 - 31)));

        let whole = paged(100).pivot(EntityKind::Well, window, None, 1).await.unwrap();
        assert_eq!(whole.meta.pages, 1);
        assert_eq!(whole.meta.total_dates, 24);
        assert_eq!(whole.meta.range_days, 31);
        assert_eq!(whole.columns, vec!["well-1", "well-2", "well-3"]);

        let small = paged(10);
        let mut pages = Vec::new();
        for page in 1..=3 {
            let t = small.pivot(EntityKind::Well, window, None, page).await.unwrap();
            assert_eq!(t.meta.pages, 3);
            assert_eq!(t.columns, whole.columns);
            pages.push(t);
        }
        assert_eq!(pages[0].rows[0].date, date!(2024 - 01 - 25));
        assert_eq!(pages[2].rows.len(), 4);
        assert_eq!(pivot::merge_pages(&pages), pivot::merge_pages(&[whole]));
    }

    #[tokio::test]
    async fn pivot_fills_gaps_and_clamps_pages() {
        let engine = paged(10);
        let window = PivotWindow::Range(range(date!(2024 - 01 - 01), date!(2024 - 01 - 25)));

        let past_end = engine.pivot(EntityKind::Well, window, None, 7).await.unwrap();
        assert_eq!(past_end.meta.page, 3);

        let first = engine.pivot(EntityKind::Well, window, None, 1).await.unwrap();
        // 2024-01-24 has no well 3 reading
        assert_eq!(first.rows[1].date, date!(2024 - 01 - 24));
        assert_eq!(first.rows[1].values[2], 0.0);

        let err = engine.pivot(EntityKind::Well, window, None, 0).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidPage));

        let chosen = engine
            .pivot(EntityKind::Well, window, Some(&[3, 1][..]), 1)
            .await
            .unwrap();
        assert_eq!(chosen.columns, vec!["well-1", "well-3"]);
    }

    #[tokio::test]
    async fn pivot_lookback_anchors_on_latest_date() {
        let engine = paged(20);
        let t = engine
            .pivot(EntityKind::Well, PivotWindow::Lookback(Lookback::new(60)), None, 1)
            .await
            .unwrap();
        assert_eq!(t.meta.range_days, 60);
        assert_eq!(
            t.meta.range,
            Some(DateRange::ending_at(date!(2024 - 01 - 25), 60))
        );

        let empty = engine
            .pivot(EntityKind::Tank, PivotWindow::Lookback(Lookback::new(7)), None, 1)
            .await
            .unwrap();
        assert!(empty.rows.is_empty());
        assert_eq!(empty.meta.range_days, 30);
        assert_eq!(empty.meta.range, None);
    }

    #[tokio::test]
    async fn kpi_snapshot_for_one_day() {
        let mut store = MemoryReadingStore::default();
        well(&mut store, 1, date!(2024 - 03 - 01), 100.0);
        well(&mut store, 1, date!(2024 - 03 - 02), 160.0);
        well(&mut store, 1, date!(2024 - 03 - 03), 150.0);
        store.insert_customer(customer(1, true, None)).unwrap();
        let mut dormant = customer(2, true, None);
        dormant.is_active = false;
        store.insert_customer(dormant).unwrap();
        store
            .insert_wastewater(WastewaterPlantRecord {
                input_flow: Some(12.5),
                ..WastewaterPlantRecord::new(2, date!(2024 - 03 - 03))
            })
            .unwrap();
        let engine = engine(store, EngineSettings::default());

        let kpi = engine.kpi(date!(2024 - 03 - 03)).await.unwrap();
        // a meter regression is shown as zero
        assert_eq!(kpi.wells_delta, 0.0);
        assert!(approx(kpi.month_to_date_production, 160.0));
        assert!(approx(kpi.wastewater_inflow, 12.5));
        assert_eq!(kpi.active_customers, 1);
        assert_eq!(kpi.clean_water_output, 0.0);
    }

    #[tokio::test]
    async fn reversed_range_is_rejected() {
        let engine = paged(20);
        let reversed = DateRange {
            from: date!(2024 - 01 - 10),
            to: date!(2024 - 01 - 05),
        };

        let err = engine
            .series(Metric::WellProduction, reversed, &SeriesFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidRange(InvalidRange { from, to })
                if from == date!(2024 - 01 - 10) && to == date!(2024 - 01 - 05)
        ));

        let err = engine
            .pivot(EntityKind::Well, PivotWindow::Range(reversed), None, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRange(_)));

        assert!(matches!(
            engine.aggregate_series(EntityKind::Well, None, reversed).await,
            Err(EngineError::InvalidRange(_))
        ));
        assert!(matches!(
            engine.top_n_customers(reversed, 4).await,
            Err(EngineError::InvalidRange(_))
        ));
        assert!(matches!(
            engine.period_rollup(reversed).await,
            Err(EngineError::InvalidRange(_))
        ));
    }

    #[tokio::test]
    async fn summary_uses_positive_minimum() {
        let engine = engine(MemoryReadingStore::default(), EngineSettings::default());
        let points: Vec<SeriesPoint> = [0.0, 8.0, 2.0, 0.0]
            .iter()
            .zip(range(date!(2024 - 03 - 01), date!(2024 - 03 - 04)).days())
            .map(|(v, date)| SeriesPoint { date, value: *v })
            .collect();
        let s = engine.summary(&points);
        assert_eq!(s.total, 10.0);
        assert_eq!(s.average, 2.5);
        assert_eq!(s.max, 8.0);
        assert_eq!(s.min, 2.0);
    }
}
