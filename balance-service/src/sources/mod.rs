pub mod customers_csv;
pub mod readings_ndjson;

pub use readings_ndjson::ReadingsNdjsonSource;

use water_client::domain::{
    Customer, CustomerMeterReading, PlantRecord, TankSnapshot, WastewaterPlantRecord, WellReading,
};

/// One line of a readings fixture, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixtureRecord {
    Well(WellReading),
    Tank(TankSnapshot),
    Plant(PlantRecord),
    Wastewater(WastewaterPlantRecord),
    CustomerReading(CustomerMeterReading),
    Customer(Customer),
}
