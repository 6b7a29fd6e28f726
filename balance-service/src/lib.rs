pub mod config;
pub mod consumption;
pub mod delta;
pub mod engine;
pub mod mass_balance;
pub mod metrics_server;
pub mod observability;
pub mod period;
pub mod pivot;
pub mod ranking;
pub mod sources;
pub mod store;
pub mod validate;

pub use engine::{BalanceEngine, EngineError, EngineSettings, Metric, SeriesFilter};
pub use period::{BillingCycle, DateRange};
pub use store::{EntityKind, ReadingStore, StoreError};
