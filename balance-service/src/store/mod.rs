//! The reading store the engine reads from.
//!
//! Absence of a reading is a normal state and comes back as an empty result,
//! never as an error.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::Date;
use water_client::db::ReadingTable;
use water_client::domain::{Customer, CustomerMeterReading, PlantRecord, ReadingPoint, WastewaterPlantRecord};

use crate::config::StoreConfig;
use crate::period::DateRange;

pub mod memory;
pub mod postgres;

pub use memory::MemoryReadingStore;
pub use postgres::PgReadingStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] water_client::ClientError),
    #[error("source error: {0}")]
    Source(String),
    #[error("duplicate {record} reading for entity {entity_id} on {date}")]
    DuplicateKey {
        record: &'static str,
        entity_id: i32,
        date: Date,
    },
    #[error("invalid record: {0}")]
    Invalid(String),
}

/// Entities with one value per (id, date) that pivots and aggregates address
/// generically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Cumulative production counter.
    Well,
    /// Inventory level in m3.
    Tank,
    /// Daily inflow.
    WastewaterPlant,
    /// First clean-water register.
    Customer,
}

impl EntityKind {
    pub fn table(self) -> ReadingTable {
        match self {
            Self::Well => ReadingTable::WellProduction,
            Self::Tank => ReadingTable::TankLevel,
            Self::WastewaterPlant => ReadingTable::WastewaterInflow,
            Self::Customer => ReadingTable::CustomerRegister,
        }
    }

    pub fn column_label(self, id: i32) -> String {
        match self {
            Self::Well => format!("well-{id}"),
            Self::Tank => format!("tank-{id}"),
            Self::WastewaterPlant => format!("plant-{id}"),
            Self::Customer => format!("customer-{id}"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "well" | "wells" => Ok(Self::Well),
            "tank" | "tanks" => Ok(Self::Tank),
            "wastewater" | "wastewater_plant" | "plants" => Ok(Self::WastewaterPlant),
            "customer" | "customers" => Ok(Self::Customer),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    /// Values of `kind` in `range`, ordered by date then entity id. `None`
    /// selects every entity.
    async fn points(
        &self,
        kind: EntityKind,
        ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<Vec<ReadingPoint>, StoreError>;

    async fn get(&self, kind: EntityKind, id: i32, date: Date) -> Result<Option<f64>, StoreError> {
        let ids = [id];
        let points = self.points(kind, Some(&ids[..]), DateRange::single(date)).await?;
        Ok(points.first().map(|p| p.value))
    }

    /// Ascending dates in `range` that have at least one reading.
    async fn distinct_dates(
        &self,
        kind: EntityKind,
        ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<Vec<Date>, StoreError> {
        let points = self.points(kind, ids, range).await?;
        let dates: BTreeSet<Date> = points.into_iter().map(|p| p.date).collect();
        Ok(dates.into_iter().collect())
    }

    async fn sum_by_date(
        &self,
        kind: EntityKind,
        ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<BTreeMap<Date, f64>, StoreError> {
        let points = self.points(kind, ids, range).await?;
        let mut sums = BTreeMap::new();
        for p in points {
            *sums.entry(p.date).or_insert(0.0) += p.value;
        }
        Ok(sums)
    }

    async fn latest_date(&self, kind: EntityKind) -> Result<Option<Date>, StoreError>;

    async fn plant_records(&self, range: DateRange) -> Result<Vec<PlantRecord>, StoreError>;

    async fn wastewater_records(
        &self,
        plant_numbers: Option<&[i32]>,
        range: DateRange,
    ) -> Result<Vec<WastewaterPlantRecord>, StoreError>;

    async fn customer_readings(
        &self,
        customer_ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<Vec<CustomerMeterReading>, StoreError>;

    async fn customers(&self) -> Result<Vec<Customer>, StoreError>;
}

/// Open the store described by the config.
pub async fn open(cfg: &StoreConfig) -> Result<Arc<dyn ReadingStore>, StoreError> {
    match cfg {
        StoreConfig::Postgres { uri, max_connections } => {
            let store = PgReadingStore::connect(uri, *max_connections).await?;
            tracing::info!(max_connections, "connected to postgres reading store");
            Ok(Arc::new(store))
        }
        StoreConfig::Fixture {
            readings_path,
            customers_path,
        } => {
            let store = MemoryReadingStore::load(readings_path, customers_path.as_deref()).await?;
            tracing::info!(
                readings = %readings_path.display(),
                records = store.len(),
                "loaded fixture reading store"
            );
            Ok(Arc::new(store))
        }
    }
}
