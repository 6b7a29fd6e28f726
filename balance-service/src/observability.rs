use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set; otherwise the service and client crates log at
/// info.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("balance_service=info,water_client=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
