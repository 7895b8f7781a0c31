use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::Config;
use dbus_interface::KioskService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();

    // Fail fast: model, database, and gallery must all be ready before
    // the bus name is claimed. A kiosk that cannot recognize anyone
    // must not accept requests.
    let handle = engine::spawn_engine(&config)
        .context("startup failed; refusing to serve partially initialized")?;

    let _conn = zbus::connection::Builder::session()?
        .name("org.rollcall.Kiosk1")?
        .serve_at("/org/rollcall/Kiosk1", KioskService::new(handle))?
        .build()
        .await
        .context("failed to claim bus name org.rollcall.Kiosk1")?;

    tracing::info!("rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
