use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::consumption::{CoefficientTable, Coefficients, NonDailyPolicy, DEFAULT_WATER_RATIO};
use crate::engine::EngineSettings;
use crate::mass_balance::DEFAULT_OUTPUT_FACTOR;
use crate::period::{Lookback, DEFAULT_LOOKBACK_DAYS};
use crate::pivot::DEFAULT_PAGE_SIZE;
use crate::ranking::DEFAULT_TOP_N;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    Postgres {
        uri: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
    Fixture {
        readings_path: PathBuf,
        #[serde(default)]
        customers_path: Option<PathBuf>,
    },
}

fn default_max_connections() -> u32 {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoefficientOverride {
    pub customer_id: i32,
    pub registers: Coefficients,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub output_factor: f64,
    pub top_n: usize,
    pub page_size: usize,
    pub default_lookback_days: u16,
    pub non_daily: NonDailyPolicy,
    pub default_water_ratio: f64,
    pub coefficients: Vec<CoefficientOverride>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_factor: DEFAULT_OUTPUT_FACTOR,
            top_n: DEFAULT_TOP_N,
            page_size: DEFAULT_PAGE_SIZE,
            default_lookback_days: DEFAULT_LOOKBACK_DAYS,
            non_daily: NonDailyPolicy::default(),
            default_water_ratio: DEFAULT_WATER_RATIO,
            coefficients: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            output_factor: self.output_factor,
            top_n: self.top_n,
            page_size: self.page_size.max(1),
            default_lookback: Lookback::new(self.default_lookback_days),
            non_daily: self.non_daily,
            default_water_ratio: self.default_water_ratio,
            coefficients: self
                .coefficients
                .iter()
                .map(|o| (o.customer_id, o.registers))
                .collect::<CoefficientTable>(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("BALANCE_CONFIG").unwrap_or_else(|_| "balance-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_config_with_engine_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [store]
            kind = "fixture"
            readings_path = "fixtures/readings.ndjson"
            "#,
        )
        .unwrap();

        match &cfg.store {
            StoreConfig::Fixture {
                readings_path,
                customers_path,
            } => {
                assert_eq!(readings_path, &PathBuf::from("fixtures/readings.ndjson"));
                assert!(customers_path.is_none());
            }
            other => panic!("unexpected store config {other:?}"),
        }
        assert!(cfg.metrics.is_none());

        let settings = cfg.engine.settings();
        assert_eq!(settings.output_factor, 0.97);
        assert_eq!(settings.top_n, 4);
        assert_eq!(settings.page_size, 20);
        assert_eq!(settings.default_lookback.days(), 30);
        assert_eq!(settings.non_daily, NonDailyPolicy::Exclude);
        assert!(settings.coefficients.is_empty());
    }

    #[test]
    fn full_config_builds_coefficient_table() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [store]
            kind = "postgres"
            uri = "postgres://balance@localhost/water"

            [engine]
            output_factor = 1.0
            default_lookback_days = 45
            non_daily = "period_only"

            [[engine.coefficients]]
            customer_id = 12
            registers = [10.0, 1.0, 1.0]

            [[engine.coefficients]]
            customer_id = 31
            registers = [1.0, 10.0, 0.0]

            [metrics]
            bind_addr = "127.0.0.1:9187"
            "#,
        )
        .unwrap();

        assert!(matches!(cfg.store, StoreConfig::Postgres { max_connections: 4, .. }));
        assert_eq!(cfg.metrics.unwrap().bind_addr, "127.0.0.1:9187");

        let settings = cfg.engine.settings();
        assert_eq!(settings.output_factor, 1.0);
        // 45 is not an offered window
        assert_eq!(settings.default_lookback.days(), 30);
        assert_eq!(settings.non_daily, NonDailyPolicy::PeriodOnly);
        assert_eq!(settings.coefficients.len(), 2);
        assert_eq!(settings.coefficients.for_customer(31), Coefficients([1.0, 10.0, 0.0]));
        assert_eq!(settings.coefficients.for_customer(99), Coefficients::default());
    }

    #[test]
    fn unknown_store_kind_is_rejected() {
        let res = AppConfig::from_toml_str(
            r#"
            [store]
            kind = "questdb"
            "#,
        );
        assert!(res.is_err());
    }
}
