mod customer;
mod plant;
mod production;

pub use customer::{Customer, CustomerMeterReading, REGISTER_COUNT};
pub use plant::{PlantRecord, WastewaterPlantRecord};
pub use production::{DailyTotal, ReadingPoint, TankSnapshot, WellReading};
