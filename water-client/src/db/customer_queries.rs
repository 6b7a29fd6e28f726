use sqlx::PgPool;
use time::Date;

use crate::domain::{Customer, CustomerMeterReading};
use crate::error::Result;

pub async fn customers(pool: &PgPool) -> Result<Vec<Customer>> {
    let rows = sqlx::query_as::<_, Customer>(
        r#"
        SELECT id, company_name, is_active, daily_reading, water_ratio
        FROM customer
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Register readings per customer over `[from, to]`, ordered by customer then
/// date so callers can walk each account's series in one pass.
pub async fn customer_readings(
    pool: &PgPool,
    customer_ids: Option<&[i32]>,
    from: Date,
    to: Date,
) -> Result<Vec<CustomerMeterReading>> {
    let rows = sqlx::query_as::<_, CustomerMeterReading>(
        r#"
        SELECT
            customer_id,
            date,
            clean_water_reading,
            clean_water_reading_2,
            clean_water_reading_3,
            wastewater_reading,
            wastewater_calculated
        FROM customer_reading
        WHERE date >= $1
          AND date <= $2
          AND ($3::int4[] IS NULL OR customer_id = ANY($3))
        ORDER BY customer_id, date
        "#,
    )
    .bind(from)
    .bind(to)
    .bind(customer_ids.map(|ids| ids.to_vec()))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
