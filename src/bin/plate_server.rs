//! plate_server - streaming plate recognition service
//!
//! Loads configuration (PLATE_CONFIG + PLATE_* overrides), opens the record
//! store (falling back to no persistence if it is unreachable), loads the
//! detector and recognizer, and serves producer streams until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::{mpsc, Arc};

use plate_stream::{build_pipeline, PlateServer, ServerConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::load()?;
    log::info!(
        "plate_server {} starting ({} workers, idle timeout {}s)",
        env!("CARGO_PKG_VERSION"),
        config.workers,
        config.idle_timeout.as_secs()
    );

    let pipeline = Arc::new(build_pipeline(&config)?);
    let handle = PlateServer::new(config, pipeline).spawn()?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("plate_server accepting streams on {} (Ctrl-C to stop)", handle.addr);
    let _ = rx.recv();
    log::info!("shutdown signal received, draining sessions...");
    handle.stop()?;

    Ok(())
}
