//! `casefile` serves the search box and the change stream over HTTP.
//!
//! Usage: `casefile [config.json]` (defaults to `casefile.json`, which may be
//! absent). Log verbosity follows `RUST_LOG`.

use std::sync::Arc;

use casefile::access::DatabaseAccess;
use casefile::config::Settings;
use casefile::server::{AppState, router};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "casefile.json".into());
    if let Err(e) = run(&config_path).await {
        error!(error = %e, "casefile stopped");
        std::process::exit(1);
    }
}

async fn run(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load(config_path)?;
    info!(config = config_path, data_dir = %settings.data_dir().display(), "starting");
    let access = Arc::new(DatabaseAccess::open(&settings)?);
    let notifier = Arc::new(access.notifier().spawn(settings.change_poll())?);
    let app = router(AppState { access, notifier });
    let listener = tokio::net::TcpListener::bind(&settings.listen).await?;
    info!(addr = %settings.listen, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
