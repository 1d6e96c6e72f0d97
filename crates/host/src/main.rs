use anyhow::Result;
use bridge_host::{logging, transport};
use peer_bridge::{loopback_platform, BridgeConfig, Orchestrator, OsVersion};
use tokio::io::{self, BufReader};

/// OS version the loopback platform reports
const LOOPBACK_OS: OsVersion = OsVersion::new(17, 0);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (.env is honoured)
    let config = BridgeConfig::from_env()?;
    logging::init_logging(config.log_format);

    tracing::info!("Starting peer bridge host");

    let device_name = std::env::var("HOSTNAME").unwrap_or_else(|_| "bridge-host".to_string());
    let platform = loopback_platform(device_name, LOOPBACK_OS);
    tracing::info!(
        platform = platform.sessions.platform_name(),
        os = %LOOPBACK_OS,
        service_type = %config.default_service_type,
        "Platform initialized"
    );

    let orchestrator = Orchestrator::spawn(config, platform);

    tokio::select! {
        result = transport::serve(orchestrator.clone(), BufReader::new(io::stdin()), io::stdout()) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            orchestrator.shutdown().await;
        }
    }

    tracing::info!("Peer bridge host stopped");
    Ok(())
}
