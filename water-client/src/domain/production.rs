use time::Date;

/// Cumulative totalizer value of one production well on one day.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WellReading {
    pub well_id: i32,
    pub date: Date,
    pub production: Option<f64>,
}

/// Storage tank level, already expressed as a volume (m3).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TankSnapshot {
    pub tank_id: i32,
    pub date: Date,
    pub level: Option<f64>,
}

/// One non-null value of an entity on a date, whatever table it came from.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadingPoint {
    pub entity_id: i32,
    pub date: Date,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DailyTotal {
    pub date: Date,
    pub total: f64,
}
