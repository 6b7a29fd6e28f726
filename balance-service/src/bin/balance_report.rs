use std::collections::BTreeMap;
use std::env;

use anyhow::{bail, Context, Result};
use balance_service::{
    config::AppConfig,
    engine::{KpiSnapshot, PeriodRollup},
    metrics_server, observability,
    ranking::{SeriesPoint, Summary},
    store, BalanceEngine, BillingCycle, DateRange, EngineError, Metric, SeriesFilter,
};
use serde::Serialize;
use time::{macros::format_description, Date, OffsetDateTime};

#[derive(Serialize)]
struct SeriesReport {
    points: Vec<SeriesPoint>,
    summary: Summary,
}

#[derive(Serialize)]
struct Report {
    range: DateRange,
    top_customers: Vec<i32>,
    series: BTreeMap<&'static str, SeriesReport>,
    kpi: KpiSnapshot,
    rollup: PeriodRollup,
}

fn parse_date(s: &str) -> Result<Date> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    let range = match args.len() {
        1 => BillingCycle::containing(OffsetDateTime::now_utc().date()).range(),
        3 => DateRange::new(parse_date(&args[1])?, parse_date(&args[2])?).map_err(EngineError::from)?,
        _ => bail!("usage: balance_report [<from YYYY-MM-DD> <to YYYY-MM-DD>]"),
    };

    // Point BALANCE_CONFIG at a fixture config to report without a database.
    let cfg = AppConfig::load()?;
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let store = store::open(&cfg.store).await?;
    let engine = BalanceEngine::new(store, cfg.engine.settings());

    let mut series = BTreeMap::new();
    for metric in Metric::ALL {
        let points = engine.series(metric, range, &SeriesFilter::default()).await?;
        let summary = engine.summary(&points);
        series.insert(metric.label(), SeriesReport { points, summary });
    }

    let report = Report {
        range,
        top_customers: engine.top_n_customers(range, engine.settings().top_n).await?,
        series,
        kpi: engine.kpi(range.to).await?,
        rollup: engine.period_rollup(range).await?,
    };

    tracing::info!(from = %range.from, to = %range.to, "balance report complete");
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
