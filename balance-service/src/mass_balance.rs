//! Net clean water supplied per day, from well deltas, the secondary raw-water
//! offtake and the change in tank inventory.

use std::collections::BTreeMap;

use serde::Serialize;
use time::Date;
use water_client::domain::{PlantRecord, ReadingPoint};

use crate::delta::{self, Series};

/// Calibration applied to the wells-minus-offtake term.
pub const DEFAULT_OUTPUT_FACTOR: f64 = 0.97;

/// One day's balance with every term kept for report tables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MassBalance {
    pub date: Date,
    pub wells_delta: f64,
    pub secondary_offtake: f64,
    pub inventory_previous: f64,
    pub inventory_current: f64,
    pub factor: f64,
    /// Raw result; may be negative when tanks filled faster than wells produced.
    pub output: f64,
}

impl MassBalance {
    /// `factor * max(wells - offtake, 0) + (inventory(d-1) - inventory(d))`
    pub fn compute(
        date: Date,
        wells_delta: f64,
        secondary_offtake: f64,
        inventory_previous: f64,
        inventory_current: f64,
        factor: f64,
    ) -> Self {
        let net_wells = delta::clamp(wells_delta - secondary_offtake);
        let output = factor * net_wells + (inventory_previous - inventory_current);
        Self {
            date,
            wells_delta,
            secondary_offtake,
            inventory_previous,
            inventory_current,
            factor,
            output,
        }
    }

    pub fn inventory_change(&self) -> f64 {
        self.inventory_previous - self.inventory_current
    }

    /// Value shown on dashboards; the raw `output` stays untouched.
    pub fn display_output(&self) -> f64 {
        delta::clamp(self.output)
    }
}

/// Raw readings needed to balance any day of a window. The window must start
/// one day before the first balanced day so yesterday's terms are present.
#[derive(Debug, Clone, Default)]
pub struct BalanceInputs {
    wells: BTreeMap<i32, Series>,
    offtake: Series,
    inventory: Series,
}

impl BalanceInputs {
    pub fn new(well_points: &[ReadingPoint], plants: &[PlantRecord], tank_totals: Series) -> Self {
        let mut offtake = Series::new();
        for p in plants {
            *offtake.entry(p.date).or_insert(0.0) += p.raw_water_secondary.unwrap_or(0.0);
        }

        Self {
            wells: delta::series_by_entity(well_points),
            offtake,
            inventory: tank_totals,
        }
    }

    /// Sum of the raw per-well deltas.
    pub fn wells_delta(&self, date: Date) -> f64 {
        self.wells.values().map(|s| delta::delta(s, date)).sum()
    }

    pub fn secondary_offtake(&self, date: Date) -> f64 {
        self.offtake.get(&date).copied().unwrap_or(0.0)
    }

    pub fn tank_inventory(&self, date: Date) -> f64 {
        self.inventory.get(&date).copied().unwrap_or(0.0)
    }

    pub fn balance(&self, date: Date, factor: f64) -> MassBalance {
        let inventory_previous = date
            .previous_day()
            .map(|prev| self.tank_inventory(prev))
            .unwrap_or(0.0);

        MassBalance::compute(
            date,
            self.wells_delta(date),
            self.secondary_offtake(date),
            inventory_previous,
            self.tank_inventory(date),
            factor,
        )
    }
}
