pub mod controller;
pub mod debuglog;
pub mod persistence;

use std::sync::Arc;

use color_eyre::eyre::{eyre, Result};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::controller::{ButtonKind, MonitorHandle, MonitorSettings, Pad};
use crate::debuglog::DebugLog;
use crate::persistence::label_store::LabelStore;
use crate::persistence::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    AppConfig::ensure_default_config().await?;
    let config = AppConfig::load_or_default().await?;
    info!("Loaded configuration: {:?}", config);

    let labels = Arc::new(LabelStore::load().await?);
    let debug_log = Arc::new(DebugLog::new(config.debug_log.capacity));

    let settings = MonitorSettings {
        poll_interval_ms: config.monitor.poll_interval_ms,
        rumble_duration_ms: config.monitor.rumble_duration_ms,
    };
    let monitor = MonitorHandle::spawn(Some(settings))
        .map_err(|e| eyre!("Failed to spawn pad monitor: {}", e))?;

    let infos = monitor
        .pads()
        .await
        .map_err(|e| eyre!("Failed to enumerate pads: {}", e))?;
    if infos.is_empty() {
        warn!("No gamepads connected, nothing to monitor");
    }

    let mut pads = Vec::new();
    for pad_info in infos {
        let pad = Pad::new(pad_info, monitor.clone(), Arc::clone(&labels)).await;
        info!(
            "Using pad [{}] '{}' ({})",
            pad.index(),
            pad.label(),
            pad.color()
        );
        pads.push(Arc::new(pad));
    }

    // One republishing task per button: log press/release edges into the
    // debug display and rumble briefly on every press.
    for pad in &pads {
        for kind in ButtonKind::ALL {
            let mut subscription = pad.button(kind).subscribe();
            let log = Arc::clone(&debug_log);
            let pad = Arc::clone(pad);
            tokio::spawn(async move {
                while let Ok(pressed) = subscription.changed().await {
                    if pressed {
                        log.info(format!("{} {:?} pressed", pad.label(), kind));
                        pad.rumble(None);
                    } else {
                        log.debug(format!("{} {:?} released", pad.label(), kind));
                    }
                }
            });
        }
    }

    let mut display = debug_log.subscribe();
    tokio::spawn(async move {
        while display.changed().await.is_ok() {
            let rendered = display.borrow_and_update().clone();
            println!("--------\n{}", rendered);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to wait for ctrl-c: {}", e))?;
    info!("Shutting down");
    monitor.shutdown();

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
