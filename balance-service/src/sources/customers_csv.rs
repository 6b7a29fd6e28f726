use std::{fs::File, path::Path};

use csv::StringRecord;
use water_client::domain::Customer;

use crate::store::StoreError;

/// Customer directory export.
///
/// Expected header columns (by name):
/// - id
/// - company_name
/// - is_active (optional, default true)
/// - daily_reading (optional, default false)
/// - water_ratio (optional)
///
/// Rows with malformed values are logged, counted and skipped; I/O errors and
/// missing columns fail the read.
pub fn read_customers(path: &Path) -> Result<Vec<Customer>, StoreError> {
    let file = File::open(path)
        .map_err(|e| StoreError::Source(format!("failed to open customers CSV {}: {e}", path.display())))?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr
        .headers()
        .map_err(|e| StoreError::Source(format!("failed to read CSV headers: {e}")))?
        .clone();

    let mut customers = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| StoreError::Source(format!("failed to read CSV record: {e}")))?;
        match record_to_customer(&record, &headers) {
            Ok(customer) => customers.push(customer),
            Err(e @ StoreError::Invalid(_)) => {
                metrics::counter!("fixture_records_rejected_total").increment(1);
                tracing::warn!(error = %e, "skipping invalid customer row");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(customers)
}

fn parse_optional_f64(field: &str, s: &str) -> Result<Option<f64>, StoreError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    s.parse()
        .map(Some)
        .map_err(|e| StoreError::Invalid(format!("invalid {field} '{s}': {e}")))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.trim().to_ascii_lowercase().as_str() {
        "" => default,
        "1" | "true" | "yes" | "on" => true,
        _ => false,
    }
}

fn record_to_customer(record: &StringRecord, headers: &StringRecord) -> Result<Customer, StoreError> {
    let get = |name: &str| -> Result<&str, StoreError> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
            .ok_or_else(|| StoreError::Source(format!("missing column '{name}' in CSV record")))
    };

    let id_str = get("id")?;
    let id: i32 = id_str
        .trim()
        .parse()
        .map_err(|e| StoreError::Invalid(format!("invalid customer id '{id_str}': {e}")))?;

    Ok(Customer {
        id,
        company_name: get("company_name")?.trim().to_string(),
        is_active: parse_bool(get("is_active").unwrap_or(""), true),
        daily_reading: parse_bool(get("daily_reading").unwrap_or(""), false),
        water_ratio: parse_optional_f64("water_ratio", get("water_ratio").unwrap_or(""))?,
    })
}
