use sqlx::PgPool;
use time::Date;

use crate::domain::{DailyTotal, PlantRecord, ReadingPoint, WastewaterPlantRecord};
use crate::error::Result;

/// The single-valued reading tables that can be addressed generically by
/// (entity id, date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingTable {
    WellProduction,
    TankLevel,
    WastewaterInflow,
    CustomerRegister,
}

impl ReadingTable {
    fn table(self) -> &'static str {
        match self {
            Self::WellProduction => "well_production",
            Self::TankLevel => "water_tank_level",
            Self::WastewaterInflow => "wastewater_plant",
            Self::CustomerRegister => "customer_reading",
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            Self::WellProduction => "well_id",
            Self::TankLevel => "tank_id",
            Self::WastewaterInflow => "plant_number",
            Self::CustomerRegister => "customer_id",
        }
    }

    fn value_column(self) -> &'static str {
        match self {
            Self::WellProduction => "production",
            Self::TankLevel => "level",
            Self::WastewaterInflow => "input_flow",
            Self::CustomerRegister => "clean_water_reading",
        }
    }
}

fn id_filter(ids: Option<&[i32]>) -> Option<Vec<i32>> {
    ids.map(|ids| ids.to_vec())
}

/// Non-null values of `table` in `[from, to]`, ordered by date then entity.
pub async fn points(
    pool: &PgPool,
    table: ReadingTable,
    ids: Option<&[i32]>,
    from: Date,
    to: Date,
) -> Result<Vec<ReadingPoint>> {
    // Identifiers come from the closed `ReadingTable` set, never from callers.
    let sql = format!(
        r#"
        SELECT
            {id} AS entity_id,
            date,
            {value} AS value
        FROM {table}
        WHERE date >= $1
          AND date <= $2
          AND ($3::int4[] IS NULL OR {id} = ANY($3))
          AND {value} IS NOT NULL
        ORDER BY date, {id}
        "#,
        id = table.id_column(),
        value = table.value_column(),
        table = table.table(),
    );

    let rows = sqlx::query_as::<_, ReadingPoint>(&sql)
        .bind(from)
        .bind(to)
        .bind(id_filter(ids))
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Dates carrying at least one non-null value, matching what `points` returns.
fn distinct_dates_sql(table: ReadingTable) -> String {
    format!(
        r#"
        SELECT DISTINCT date
        FROM {table}
        WHERE date >= $1
          AND date <= $2
          AND ($3::int4[] IS NULL OR {id} = ANY($3))
          AND {value} IS NOT NULL
        ORDER BY date
        "#,
        id = table.id_column(),
        value = table.value_column(),
        table = table.table(),
    )
}

pub async fn distinct_dates(
    pool: &PgPool,
    table: ReadingTable,
    ids: Option<&[i32]>,
    from: Date,
    to: Date,
) -> Result<Vec<Date>> {
    let sql = distinct_dates_sql(table);

    let dates = sqlx::query_scalar::<_, Date>(&sql)
        .bind(from)
        .bind(to)
        .bind(id_filter(ids))
        .fetch_all(pool)
        .await?;

    Ok(dates)
}

pub async fn sum_by_date(
    pool: &PgPool,
    table: ReadingTable,
    ids: Option<&[i32]>,
    from: Date,
    to: Date,
) -> Result<Vec<DailyTotal>> {
    let sql = format!(
        r#"
        SELECT
            date,
            SUM({value}) AS total
        FROM {table}
        WHERE date >= $1
          AND date <= $2
          AND ($3::int4[] IS NULL OR {id} = ANY($3))
          AND {value} IS NOT NULL
        GROUP BY date
        ORDER BY date
        "#,
        id = table.id_column(),
        value = table.value_column(),
        table = table.table(),
    );

    let rows = sqlx::query_as::<_, DailyTotal>(&sql)
        .bind(from)
        .bind(to)
        .bind(id_filter(ids))
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn latest_date(pool: &PgPool, table: ReadingTable) -> Result<Option<Date>> {
    let sql = format!("SELECT MAX(date) FROM {}", table.table());
    let latest = sqlx::query_scalar::<_, Option<Date>>(&sql).fetch_one(pool).await?;
    Ok(latest)
}

pub async fn plant_records(pool: &PgPool, from: Date, to: Date) -> Result<Vec<PlantRecord>> {
    let rows = sqlx::query_as::<_, PlantRecord>(
        r#"
        SELECT
            date,
            raw_water_secondary,
            electricity,
            pac_usage,
            naoh_usage,
            polymer_usage,
            clean_water_output
        FROM clean_water_plant
        WHERE date >= $1
          AND date <= $2
        ORDER BY date
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn wastewater_records(
    pool: &PgPool,
    plant_numbers: Option<&[i32]>,
    from: Date,
    to: Date,
) -> Result<Vec<WastewaterPlantRecord>> {
    let rows = sqlx::query_as::<_, WastewaterPlantRecord>(
        r#"
        SELECT
            plant_number,
            date,
            wastewater_meter,
            input_flow,
            output_flow,
            sludge_output,
            electricity,
            chemical_usage
        FROM wastewater_plant
        WHERE date >= $1
          AND date <= $2
          AND ($3::int4[] IS NULL OR plant_number = ANY($3))
        ORDER BY date, plant_number
        "#,
    )
    .bind(from)
    .bind(to)
    .bind(id_filter(plant_numbers))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
