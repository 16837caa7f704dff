mod bluetooth;
mod config;
mod error;
mod events;
mod models;
mod protocol;
mod supervisor;
mod utils;

use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use bluetooth::BluezTransport;
use config::ReaderConfig;
use events::RetrievalEvent;
use supervisor::RetrievalSupervisor;
use utils::{format_timestamp, summarize_records};

/// Log every event until the retrieval reaches its terminal event
async fn follow_events(mut events: mpsc::UnboundedReceiver<RetrievalEvent>) -> bool {
    while let Some(event) = events.recv().await {
        let terminal = event.is_terminal();
        let mut succeeded = false;

        match event {
            RetrievalEvent::Connected => info!("Connected, waiting for log data"),
            RetrievalEvent::DataReceived { count } => {
                if count % 100 == 0 {
                    info!("Received {} records", count);
                }
            }
            RetrievalEvent::Completed { records } => {
                info!("Log retrieval complete: {} records", records.len());
                let summary = summarize_records(&records);
                for (sensor, stats) in summary.iter() {
                    info!("Summary for {}:", sensor);
                    info!("  Samples: {} ({} rejected)", stats.samples, stats.rejected);
                    info!("  Minimum: {:.2}", stats.min);
                    info!("  Maximum: {:.2}", stats.max);
                    info!("  Average: {:.2}", stats.average);
                    info!(
                        "  Covering {} to {}",
                        format_timestamp(stats.first_timestamp),
                        format_timestamp(stats.last_timestamp)
                    );
                }
                if summary.is_empty() {
                    warn!("No log data in the requested range!");
                }
                succeeded = true;
            }
            RetrievalEvent::Failed { reason } => error!("Log retrieval failed: {}", reason),
        }

        if terminal {
            return succeeded;
        }
    }

    false
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match ReaderConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let transport = Arc::new(BluezTransport::new().await?);
    let (tx, rx) = mpsc::unbounded_channel();
    let supervisor = RetrievalSupervisor::new(transport, Arc::new(tx), config.supervisor);

    let follower = tokio::spawn(follow_events(rx));

    let Some(handle) =
        supervisor.request_retrieval(&config.device_address, config.range_start, &config.sensor)
    else {
        // The rejection has already been reported as an event
        let _ = follower.await;
        return Err("invalid log request".into());
    };

    // Handle Ctrl+C gracefully
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Cancelling log retrieval");
            cancel.cancel();
        }
    });

    handle.wait().await;
    // Dropping the supervisor closes the event channel once the follower is done
    drop(supervisor);

    match follower.await {
        Ok(true) => Ok(()),
        Ok(false) => Err("log retrieval failed".into()),
        Err(e) => Err(e.into()),
    }
}
