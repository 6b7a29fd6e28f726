mod customer_queries;
mod reading_queries;

pub use customer_queries::{customer_readings, customers};
pub use reading_queries::{
    distinct_dates, latest_date, plant_records, points, sum_by_date, wastewater_records, ReadingTable,
};
