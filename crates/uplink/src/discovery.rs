//! Discovery pipeline: beacon, frequency scan, ordered probing.

use fuelwatch_core::{Credential, Result, UplinkError};
use tracing::{debug, info};

use crate::beacon::locate;
use crate::frequency::scan_frequencies;
use crate::platform::ProcessPlatform;
use crate::transport::UplinkTransport;

/// A credential together with the port that accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkTarget {
    pub credential: Credential,
    pub port: u16,
}

/// Probe `ports` in order and return the first one that answers.
pub async fn find_responsive_port<T>(transport: &T, ports: &[u16], token: &str) -> Option<u16>
where
    T: UplinkTransport + ?Sized,
{
    for &port in ports {
        if transport.probe(port, token).await {
            return Some(port);
        }
        debug!(port, "Port did not answer the capability probe");
    }
    None
}

/// Run the full discovery pipeline.
///
/// Fails with [`UplinkError::Discovery`] when no beacon is found and with
/// [`UplinkError::PortExhaustion`] when no candidate port answers.
pub async fn discover<P, T>(platform: &P, transport: &T) -> Result<UplinkTarget>
where
    P: ProcessPlatform + ?Sized,
    T: UplinkTransport + ?Sized,
{
    let credential = locate(platform).await?;

    let ports = scan_frequencies(platform, credential.pid()).await;
    if ports.is_empty() {
        return Err(UplinkError::PortExhaustion { attempted: 0 });
    }

    let port = find_responsive_port(transport, &ports, credential.token())
        .await
        .ok_or(UplinkError::PortExhaustion {
            attempted: ports.len(),
        })?;

    info!(pid = credential.pid(), port, "Uplink target discovered");
    Ok(UplinkTarget { credential, port })
}
