use time::macros::date;
use time::Date;

use crate::sources::FixtureRecord;
use crate::store::StoreError;

const MIN_DATE: Date = date!(2000 - 01 - 01);
const MAX_DATE: Date = date!(2100 - 01 - 01);

fn check_date(date: Date) -> Result<(), StoreError> {
    if date < MIN_DATE || date >= MAX_DATE {
        return Err(StoreError::Invalid(format!("date {date} out of allowed range")));
    }
    Ok(())
}

fn check_values(field_values: &[(&str, Option<f64>)]) -> Result<(), StoreError> {
    for (field, value) in field_values {
        if let Some(v) = value {
            if !v.is_finite() || *v < 0.0 {
                return Err(StoreError::Invalid(format!("{field} must be a non-negative number, got {v}")));
            }
        }
    }
    Ok(())
}

/// Pure validation of a fixture record before it enters the store.
///
/// Rules:
/// - dates must fall in [2000-01-01, 2100-01-01).
/// - every present quantity must be finite and non-negative.
pub fn validate_record(record: &FixtureRecord) -> Result<(), StoreError> {
    match record {
        FixtureRecord::Well(r) => {
            check_date(r.date)?;
            check_values(&[("production", r.production)])
        }
        FixtureRecord::Tank(r) => {
            check_date(r.date)?;
            check_values(&[("level", r.level)])
        }
        FixtureRecord::Plant(r) => {
            check_date(r.date)?;
            check_values(&[
                ("raw_water_secondary", r.raw_water_secondary),
                ("electricity", r.electricity),
                ("pac_usage", r.pac_usage),
                ("naoh_usage", r.naoh_usage),
                ("polymer_usage", r.polymer_usage),
                ("clean_water_output", r.clean_water_output),
            ])
        }
        FixtureRecord::Wastewater(r) => {
            check_date(r.date)?;
            check_values(&[
                ("wastewater_meter", r.wastewater_meter),
                ("input_flow", r.input_flow),
                ("output_flow", r.output_flow),
                ("sludge_output", r.sludge_output),
                ("electricity", r.electricity),
                ("chemical_usage", r.chemical_usage),
            ])
        }
        FixtureRecord::CustomerReading(r) => {
            check_date(r.date)?;
            check_values(&[
                ("clean_water_reading", r.clean_water_reading),
                ("clean_water_reading_2", r.clean_water_reading_2),
                ("clean_water_reading_3", r.clean_water_reading_3),
                ("wastewater_reading", r.wastewater_reading),
                ("wastewater_calculated", r.wastewater_calculated),
            ])
        }
        FixtureRecord::Customer(c) => {
            if c.company_name.trim().is_empty() {
                return Err(StoreError::Invalid(format!("customer {} has no company name", c.id)));
            }
            check_values(&[("water_ratio", c.water_ratio)])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use water_client::domain::{Customer, WellReading};

    fn well(date: Date, production: Option<f64>) -> FixtureRecord {
        FixtureRecord::Well(WellReading {
            well_id: 1,
            date,
            production,
        })
    }

    #[test]
    fn accepts_valid_record() {
        assert!(validate_record(&well(date!(2024 - 01 - 01), Some(1.0))).is_ok());
        assert!(validate_record(&well(date!(2024 - 01 - 01), None)).is_ok());
    }

    #[test]
    fn rejects_negative_or_nan_value() {
        let res = validate_record(&well(date!(2024 - 01 - 01), Some(-0.1)));
        assert!(matches!(res, Err(StoreError::Invalid(_))));
        let res = validate_record(&well(date!(2024 - 01 - 01), Some(f64::NAN)));
        assert!(matches!(res, Err(StoreError::Invalid(_))));
    }

    #[test]
    fn rejects_out_of_range_date() {
        let res = validate_record(&well(date!(1800 - 01 - 01), Some(1.0)));
        assert!(matches!(res, Err(StoreError::Invalid(_))));
        let res = validate_record(&well(date!(2100 - 01 - 01), Some(1.0)));
        assert!(matches!(res, Err(StoreError::Invalid(_))));
    }

    #[test]
    fn rejects_negative_water_ratio() {
        let c = Customer {
            id: 4,
            company_name: "Dye Works".into(),
            is_active: true,
            daily_reading: false,
            water_ratio: Some(-0.5),
        };
        assert!(validate_record(&FixtureRecord::Customer(c)).is_err());
    }
}
