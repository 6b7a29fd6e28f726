use time::Date;

pub const REGISTER_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Customer {
    pub id: i32,
    pub company_name: String,
    pub is_active: bool,
    /// Large accounts are read every day; the rest once per billing cycle.
    pub daily_reading: bool,
    /// Wastewater produced per unit of clean water, used when the account
    /// has no wastewater meter.
    pub water_ratio: Option<f64>,
}

/// Cumulative meter registers of one customer on one day.
///
/// Register 2 and 3 only exist on multi-meter accounts. `wastewater_calculated`
/// is the ratio-derived figure stored by data entry for accounts without a
/// wastewater meter.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CustomerMeterReading {
    pub customer_id: i32,
    pub date: Date,
    pub clean_water_reading: Option<f64>,
    pub clean_water_reading_2: Option<f64>,
    pub clean_water_reading_3: Option<f64>,
    pub wastewater_reading: Option<f64>,
    pub wastewater_calculated: Option<f64>,
}

impl CustomerMeterReading {
    pub fn new(customer_id: i32, date: Date) -> Self {
        Self {
            customer_id,
            date,
            clean_water_reading: None,
            clean_water_reading_2: None,
            clean_water_reading_3: None,
            wastewater_reading: None,
            wastewater_calculated: None,
        }
    }

    pub fn registers(&self) -> [Option<f64>; REGISTER_COUNT] {
        [
            self.clean_water_reading,
            self.clean_water_reading_2,
            self.clean_water_reading_3,
        ]
    }
}
