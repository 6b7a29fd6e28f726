use time::Date;

/// Daily figures of the clean-water plant. One row per date.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlantRecord {
    pub date: Date,
    /// Raw water taken in from the secondary (non-well) source, m3.
    pub raw_water_secondary: Option<f64>,
    pub electricity: Option<f64>,
    pub pac_usage: Option<f64>,
    pub naoh_usage: Option<f64>,
    pub polymer_usage: Option<f64>,
    /// Output figure typed in by the operator. Informational only.
    pub clean_water_output: Option<f64>,
}

impl PlantRecord {
    pub fn new(date: Date) -> Self {
        Self {
            date,
            raw_water_secondary: None,
            electricity: None,
            pac_usage: None,
            naoh_usage: None,
            polymer_usage: None,
            clean_water_output: None,
        }
    }

    /// PAC + NaOH + polymer, missing entries counted as zero.
    pub fn chemical_total(&self) -> f64 {
        self.pac_usage.unwrap_or(0.0) + self.naoh_usage.unwrap_or(0.0) + self.polymer_usage.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WastewaterPlantRecord {
    pub plant_number: i32,
    pub date: Date,
    pub wastewater_meter: Option<f64>,
    pub input_flow: Option<f64>,
    pub output_flow: Option<f64>,
    pub sludge_output: Option<f64>,
    pub electricity: Option<f64>,
    pub chemical_usage: Option<f64>,
}

impl WastewaterPlantRecord {
    pub fn new(plant_number: i32, date: Date) -> Self {
        Self {
            plant_number,
            date,
            wastewater_meter: None,
            input_flow: None,
            output_flow: None,
            sludge_output: None,
            electricity: None,
            chemical_usage: None,
        }
    }
}
