use std::collections::BTreeMap;

use sqlx::postgres::{PgPool, PgPoolOptions};
use time::Date;
use water_client::db;
use water_client::domain::{Customer, CustomerMeterReading, PlantRecord, ReadingPoint, WastewaterPlantRecord};

use super::{EntityKind, ReadingStore, StoreError};
use crate::period::DateRange;

/// Reading store backed by the data-entry application's Postgres tables.
#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(uri)
            .await
            .map_err(water_client::ClientError::from)?;
        Ok(Self::new(pool))
    }
}

fn record_read(query: &'static str) {
    metrics::counter!("store_reads_total", "query" => query).increment(1);
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn points(
        &self,
        kind: EntityKind,
        ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<Vec<ReadingPoint>, StoreError> {
        record_read("points");
        Ok(db::points(&self.pool, kind.table(), ids, range.from, range.to).await?)
    }

    async fn distinct_dates(
        &self,
        kind: EntityKind,
        ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<Vec<Date>, StoreError> {
        record_read("distinct_dates");
        Ok(db::distinct_dates(&self.pool, kind.table(), ids, range.from, range.to).await?)
    }

    async fn sum_by_date(
        &self,
        kind: EntityKind,
        ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<BTreeMap<Date, f64>, StoreError> {
        record_read("sum_by_date");
        let rows = db::sum_by_date(&self.pool, kind.table(), ids, range.from, range.to).await?;
        Ok(rows.into_iter().map(|r| (r.date, r.total)).collect())
    }

    async fn latest_date(&self, kind: EntityKind) -> Result<Option<Date>, StoreError> {
        record_read("latest_date");
        Ok(db::latest_date(&self.pool, kind.table()).await?)
    }

    async fn plant_records(&self, range: DateRange) -> Result<Vec<PlantRecord>, StoreError> {
        record_read("plant_records");
        Ok(db::plant_records(&self.pool, range.from, range.to).await?)
    }

    async fn wastewater_records(
        &self,
        plant_numbers: Option<&[i32]>,
        range: DateRange,
    ) -> Result<Vec<WastewaterPlantRecord>, StoreError> {
        record_read("wastewater_records");
        Ok(db::wastewater_records(&self.pool, plant_numbers, range.from, range.to).await?)
    }

    async fn customer_readings(
        &self,
        customer_ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<Vec<CustomerMeterReading>, StoreError> {
        record_read("customer_readings");
        Ok(db::customer_readings(&self.pool, customer_ids, range.from, range.to).await?)
    }

    async fn customers(&self) -> Result<Vec<Customer>, StoreError> {
        record_read("customers");
        Ok(db::customers(&self.pool).await?)
    }
}
