//! Per-customer clean-water and wastewater deltas.
//!
//! Multi-meter accounts are wired so that one register counts in tens; the
//! [`CoefficientTable`] scales each register before the three are summed.
//! Accounts without a wastewater meter are billed on a fixed ratio of their
//! clean-water consumption.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use time::Date;
use water_client::domain::{Customer, CustomerMeterReading, REGISTER_COUNT};

use crate::delta;
use crate::period::DateRange;

pub const DEFAULT_WATER_RATIO: f64 = 0.8;

/// Multipliers for registers 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients(pub [f64; REGISTER_COUNT]);

impl Coefficients {
    pub fn combine(&self, register_deltas: [f64; REGISTER_COUNT]) -> f64 {
        self.0
            .iter()
            .zip(register_deltas)
            .map(|(coefficient, delta)| coefficient * delta)
            .sum()
    }
}

impl Default for Coefficients {
    /// Only the first register counts.
    fn default() -> Self {
        Self([1.0, 0.0, 0.0])
    }
}

/// Register coefficients keyed by customer id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoefficientTable {
    overrides: HashMap<i32, Coefficients>,
}

impl CoefficientTable {
    pub fn with_override(mut self, customer_id: i32, coefficients: Coefficients) -> Self {
        self.overrides.insert(customer_id, coefficients);
        self
    }

    pub fn for_customer(&self, customer_id: i32) -> Coefficients {
        self.overrides.get(&customer_id).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

impl FromIterator<(i32, Coefficients)> for CoefficientTable {
    fn from_iter<I: IntoIterator<Item = (i32, Coefficients)>>(iter: I) -> Self {
        Self {
            overrides: iter.into_iter().collect(),
        }
    }
}

/// How accounts read once per billing cycle take part in the figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonDailyPolicy {
    /// Left out of daily series, top-N and period totals.
    #[default]
    Exclude,
    /// Left out of daily series and top-N, counted in period totals.
    PeriodOnly,
    /// Treated like daily accounts everywhere.
    Include,
}

impl NonDailyPolicy {
    pub fn in_daily_series(self, customer: &Customer) -> bool {
        customer.is_active && (customer.daily_reading || self == Self::Include)
    }

    pub fn in_period_totals(self, customer: &Customer) -> bool {
        customer.is_active && (customer.daily_reading || self != Self::Exclude)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CustomerDelta {
    pub clean: f64,
    pub wastewater: f64,
}

impl std::ops::AddAssign for CustomerDelta {
    fn add_assign(&mut self, rhs: Self) {
        self.clean += rhs.clean;
        self.wastewater += rhs.wastewater;
    }
}

/// Readings of one account keyed by day.
pub type ReadingHistory = BTreeMap<Date, CustomerMeterReading>;

pub fn history_by_customer(readings: Vec<CustomerMeterReading>) -> BTreeMap<i32, ReadingHistory> {
    let mut out: BTreeMap<i32, ReadingHistory> = BTreeMap::new();
    for r in readings {
        out.entry(r.customer_id).or_default().insert(r.date, r);
    }
    out
}

/// Computes customer deltas with a fixed coefficient table and ratio default.
#[derive(Debug, Clone)]
pub struct ConsumptionCalculator<'a> {
    coefficients: &'a CoefficientTable,
    default_water_ratio: f64,
}

impl<'a> ConsumptionCalculator<'a> {
    pub fn new(coefficients: &'a CoefficientTable, default_water_ratio: f64) -> Self {
        Self {
            coefficients,
            default_water_ratio,
        }
    }

    fn water_ratio(&self, customer: &Customer) -> f64 {
        customer.water_ratio.unwrap_or(self.default_water_ratio)
    }

    /// Day-over-day consumption of `customer` on `date`.
    pub fn daily(&self, customer: &Customer, history: &ReadingHistory, date: Date) -> CustomerDelta {
        let current = history.get(&date);
        let previous = date.previous_day().and_then(|prev| history.get(&prev));

        let current_registers = current.map(|r| r.registers()).unwrap_or([None; REGISTER_COUNT]);
        let previous_registers = previous.map(|r| r.registers()).unwrap_or([None; REGISTER_COUNT]);
        let register_deltas: [f64; REGISTER_COUNT] =
            std::array::from_fn(|i| delta::register_delta(current_registers[i], previous_registers[i]));

        let clean = self.coefficients.for_customer(customer.id).combine(register_deltas);

        let metered = match (
            current.and_then(|r| r.wastewater_reading),
            previous.and_then(|r| r.wastewater_reading),
        ) {
            (Some(current), Some(previous)) => Some(delta::clamp(current - previous)),
            _ => None,
        };
        let wastewater = metered.unwrap_or_else(|| clean * self.water_ratio(customer));

        CustomerDelta { clean, wastewater }
    }

    /// Consumption over a whole period: the last reading at or before
    /// `range.to` minus the last reading before `range.from`, per register.
    /// This is how accounts read once per cycle are billed.
    pub fn period(&self, customer: &Customer, history: &ReadingHistory, range: DateRange) -> CustomerDelta {
        let closing = |pick: fn(&CustomerMeterReading) -> Option<f64>| {
            history.range(..=range.to).rev().find_map(|(_, r)| pick(r))
        };
        let opening = |pick: fn(&CustomerMeterReading) -> Option<f64>| {
            history.range(..range.from).rev().find_map(|(_, r)| pick(r))
        };

        let pickers: [fn(&CustomerMeterReading) -> Option<f64>; REGISTER_COUNT] = [
            |r| r.clean_water_reading,
            |r| r.clean_water_reading_2,
            |r| r.clean_water_reading_3,
        ];
        let register_deltas: [f64; REGISTER_COUNT] =
            std::array::from_fn(|i| delta::register_delta(closing(pickers[i]), opening(pickers[i])));
        let clean = self.coefficients.for_customer(customer.id).combine(register_deltas);

        let wastewater_meter: fn(&CustomerMeterReading) -> Option<f64> = |r| r.wastewater_reading;
        let wastewater = match (closing(wastewater_meter), opening(wastewater_meter)) {
            (Some(close), Some(open)) => delta::clamp(close - open),
            _ => clean * self.water_ratio(customer),
        };

        CustomerDelta { clean, wastewater }
    }
}
