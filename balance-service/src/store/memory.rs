use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

use futures::StreamExt;
use time::Date;
use water_client::domain::{
    Customer, CustomerMeterReading, PlantRecord, ReadingPoint, TankSnapshot, WastewaterPlantRecord, WellReading,
};

use super::{EntityKind, ReadingStore, StoreError};
use crate::period::DateRange;
use crate::sources::{customers_csv, FixtureRecord, ReadingsNdjsonSource};
use crate::validate;

/// In-process reading store. Backs the fixture mode of the binaries and the
/// engine tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryReadingStore {
    wells: BTreeMap<(Date, i32), Option<f64>>,
    tanks: BTreeMap<(Date, i32), Option<f64>>,
    plants: BTreeMap<Date, PlantRecord>,
    wastewater: BTreeMap<(Date, i32), WastewaterPlantRecord>,
    customer_readings: BTreeMap<(Date, i32), CustomerMeterReading>,
    customers: BTreeMap<i32, Customer>,
}

fn insert_unique<V>(
    map: &mut BTreeMap<(Date, i32), V>,
    record: &'static str,
    date: Date,
    entity_id: i32,
    value: V,
) -> Result<(), StoreError> {
    match map.entry((date, entity_id)) {
        Entry::Occupied(_) => Err(StoreError::DuplicateKey {
            record,
            entity_id,
            date,
        }),
        Entry::Vacant(slot) => {
            slot.insert(value);
            Ok(())
        }
    }
}

fn collect_points<V>(
    map: &BTreeMap<(Date, i32), V>,
    ids: Option<&[i32]>,
    range: DateRange,
    value: impl Fn(&V) -> Option<f64>,
) -> Vec<ReadingPoint> {
    map.range((range.from, i32::MIN)..=(range.to, i32::MAX))
        .filter(|((_, id), _)| ids.map_or(true, |ids| ids.contains(id)))
        .filter_map(|(&(date, entity_id), v)| {
            value(v).map(|value| ReadingPoint {
                entity_id,
                date,
                value,
            })
        })
        .collect()
}

impl MemoryReadingStore {
    /// Load an NDJSON readings file and, optionally, a CSV customer directory.
    /// Records failing validation are skipped; duplicate keys abort the load.
    pub async fn load(readings_path: &Path, customers_path: Option<&Path>) -> Result<Self, StoreError> {
        let mut store = Self::default();

        let mut records = ReadingsNdjsonSource::new(readings_path).records();
        while let Some(record) = records.next().await {
            let record = record?;
            if let Err(e) = validate::validate_record(&record) {
                metrics::counter!("fixture_records_rejected_total").increment(1);
                tracing::warn!(error = %e, "skipping invalid fixture record");
                continue;
            }
            store.insert(record)?;
        }

        if let Some(path) = customers_path {
            for customer in customers_csv::read_customers(path)? {
                let record = FixtureRecord::Customer(customer);
                if let Err(e) = validate::validate_record(&record) {
                    metrics::counter!("fixture_records_rejected_total").increment(1);
                    tracing::warn!(error = %e, "skipping invalid customer row");
                    continue;
                }
                store.insert(record)?;
            }
        }

        Ok(store)
    }

    pub fn insert(&mut self, record: FixtureRecord) -> Result<(), StoreError> {
        match record {
            FixtureRecord::Well(r) => self.insert_well(r),
            FixtureRecord::Tank(r) => self.insert_tank(r),
            FixtureRecord::Plant(r) => self.insert_plant(r),
            FixtureRecord::Wastewater(r) => self.insert_wastewater(r),
            FixtureRecord::CustomerReading(r) => self.insert_customer_reading(r),
            FixtureRecord::Customer(c) => self.insert_customer(c),
        }
    }

    pub fn insert_well(&mut self, r: WellReading) -> Result<(), StoreError> {
        insert_unique(&mut self.wells, "well", r.date, r.well_id, r.production)
    }

    pub fn insert_tank(&mut self, r: TankSnapshot) -> Result<(), StoreError> {
        insert_unique(&mut self.tanks, "tank", r.date, r.tank_id, r.level)
    }

    pub fn insert_plant(&mut self, r: PlantRecord) -> Result<(), StoreError> {
        match self.plants.entry(r.date) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey {
                record: "plant",
                entity_id: 0,
                date: r.date,
            }),
            Entry::Vacant(slot) => {
                slot.insert(r);
                Ok(())
            }
        }
    }

    pub fn insert_wastewater(&mut self, r: WastewaterPlantRecord) -> Result<(), StoreError> {
        let (date, plant_number) = (r.date, r.plant_number);
        insert_unique(&mut self.wastewater, "wastewater", date, plant_number, r)
    }

    pub fn insert_customer_reading(&mut self, r: CustomerMeterReading) -> Result<(), StoreError> {
        let (date, customer_id) = (r.date, r.customer_id);
        insert_unique(&mut self.customer_readings, "customer", date, customer_id, r)
    }

    pub fn insert_customer(&mut self, c: Customer) -> Result<(), StoreError> {
        match self.customers.entry(c.id) {
            Entry::Occupied(_) => Err(StoreError::Invalid(format!("customer {} listed twice", c.id))),
            Entry::Vacant(slot) => {
                slot.insert(c);
                Ok(())
            }
        }
    }

    /// Number of stored records of every kind.
    pub fn len(&self) -> usize {
        self.wells.len()
            + self.tanks.len()
            + self.plants.len()
            + self.wastewater.len()
            + self.customer_readings.len()
            + self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn points(
        &self,
        kind: EntityKind,
        ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<Vec<ReadingPoint>, StoreError> {
        let points = match kind {
            EntityKind::Well => collect_points(&self.wells, ids, range, |v| *v),
            EntityKind::Tank => collect_points(&self.tanks, ids, range, |v| *v),
            EntityKind::WastewaterPlant => collect_points(&self.wastewater, ids, range, |r| r.input_flow),
            EntityKind::Customer => collect_points(&self.customer_readings, ids, range, |r| r.clean_water_reading),
        };
        Ok(points)
    }

    async fn latest_date(&self, kind: EntityKind) -> Result<Option<Date>, StoreError> {
        let latest = match kind {
            EntityKind::Well => self.wells.keys().next_back(),
            EntityKind::Tank => self.tanks.keys().next_back(),
            EntityKind::WastewaterPlant => self.wastewater.keys().next_back(),
            EntityKind::Customer => self.customer_readings.keys().next_back(),
        };
        Ok(latest.map(|(date, _)| *date))
    }

    async fn plant_records(&self, range: DateRange) -> Result<Vec<PlantRecord>, StoreError> {
        Ok(self.plants.range(range.from..=range.to).map(|(_, r)| r.clone()).collect())
    }

    async fn wastewater_records(
        &self,
        plant_numbers: Option<&[i32]>,
        range: DateRange,
    ) -> Result<Vec<WastewaterPlantRecord>, StoreError> {
        Ok(self
            .wastewater
            .range((range.from, i32::MIN)..=(range.to, i32::MAX))
            .filter(|((_, plant), _)| plant_numbers.map_or(true, |ids| ids.contains(plant)))
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn customer_readings(
        &self,
        customer_ids: Option<&[i32]>,
        range: DateRange,
    ) -> Result<Vec<CustomerMeterReading>, StoreError> {
        let mut rows: Vec<CustomerMeterReading> = self
            .customer_readings
            .range((range.from, i32::MIN)..=(range.to, i32::MAX))
            .filter(|((_, id), _)| customer_ids.map_or(true, |ids| ids.contains(id)))
            .map(|(_, r)| r.clone())
            .collect();
        rows.sort_by_key(|r| (r.customer_id, r.date));
        Ok(rows)
    }

    async fn customers(&self) -> Result<Vec<Customer>, StoreError> {
        Ok(self.customers.values().cloned().collect())
    }
}
