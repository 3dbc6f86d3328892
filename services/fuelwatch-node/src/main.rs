use anyhow::{bail, Context};
use fuelwatch_core::{logging, Diagnostic, EngineConfig, EventKind, UplinkEvent};
use fuelwatch_engine::UplinkEngine;
use fuelwatch_uplink::{HttpsTransport, SystemPlatform};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

const NODE_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config_path = parse_config_path(&args)?;
    let config = EngineConfig::load(config_path.as_deref())
        .with_context(|| format!("loading configuration from {:?}", config_path))?;

    logging::init_from_config(&config.logging);
    info!(
        scan_interval_secs = config.effective_scan_interval(),
        process_pattern = config.process_pattern.as_str(),
        "fuelwatch-node starting"
    );

    let platform = SystemPlatform::new(&config.process_pattern);
    let transport = HttpsTransport::new().context("building loopback transport")?;
    let engine = UplinkEngine::new(platform, transport, &config);

    let _subscription = engine.subscribe(log_event);
    engine.start_periodic_scans(config.scan_interval_secs);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutdown requested");
    engine.dispose();
    Ok(())
}

/// `--config <path>` wins over `FUELWATCH_CONFIG`; neither means defaults.
fn parse_config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            match args_iter.next() {
                Some(path) => return Ok(Some(PathBuf::from(path))),
                None => bail!("--config was provided without a path"),
            }
        }
    }

    Ok(std::env::var_os("FUELWATCH_CONFIG").map(PathBuf::from))
}

fn log_event(event: &UplinkEvent) {
    match &event.kind {
        EventKind::UplinkEstablished(payload) => {
            info!(port = payload.port, pid = payload.pid, "Uplink up")
        }
        EventKind::UplinkLost(_) => warn!("Uplink lost; rediscovering on next scan"),
        EventKind::TelemetryReceived(snapshot) => {
            info!(
                systems = snapshot.systems.len(),
                overall = ?snapshot.overall_readiness,
                alerts = snapshot.active_alert_count,
                "Snapshot"
            );
            for system in &snapshot.systems {
                info!(
                    system = system.system_id.as_str(),
                    fuel_percent = system.fuel_level * 100.0,
                    readiness = ?system.readiness,
                    pool = system.quota_pool_id.as_deref().unwrap_or("-"),
                    "  {}",
                    system.designation
                );
            }
        }
        EventKind::ScanStarted | EventKind::ScanCompleted(_) => {}
        EventKind::Error(Diagnostic::ConsecutiveFailures {
            failure_count,
            reason,
        }) => warn!(
            failures = failure_count,
            reason = reason.as_str(),
            "Language server unreachable after repeated attempts"
        ),
        EventKind::Error(Diagnostic::Failure { .. }) => {}
    }
}
