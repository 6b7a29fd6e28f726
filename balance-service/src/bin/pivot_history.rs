use std::env;

use anyhow::{anyhow, bail, Context, Result};
use balance_service::{
    config::AppConfig,
    observability,
    period::Lookback,
    pivot::PivotWindow,
    store, BalanceEngine, EntityKind,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 4 {
        bail!("usage: pivot_history <wells|tanks|plants|customers> [page] [lookback_days]");
    }
    let kind: EntityKind = args[1].parse().map_err(|e: String| anyhow!(e))?;
    let page: usize = match args.get(2) {
        Some(s) => s.parse().with_context(|| format!("invalid page '{s}'"))?,
        None => 1,
    };

    let cfg = AppConfig::load()?;
    let settings = cfg.engine.settings();
    let lookback = match args.get(3) {
        Some(s) => Lookback::new(s.parse().with_context(|| format!("invalid lookback '{s}'"))?),
        None => settings.default_lookback,
    };

    let store = store::open(&cfg.store).await?;
    let engine = BalanceEngine::new(store, settings);
    let table = engine.pivot(kind, PivotWindow::Lookback(lookback), None, page).await?;

    println!("{}", serde_json::to_string_pretty(&table)?);

    Ok(())
}
