//! Frequency Scanner: candidate listening ports owned by the beacon PID.
//!
//! Output tokens that are malformed or out of range are discarded. The result
//! is sorted, deduplicated and capped at [`MAX_CANDIDATE_PORTS`].

use std::collections::BTreeSet;
use tracing::debug;

use crate::platform::{PlatformKind, ProcessPlatform};

/// Upper bound on ports handed to the prober.
pub const MAX_CANDIDATE_PORTS: usize = 32;

fn parse_port(raw: &str) -> Option<u16> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|port| (1..=65_535).contains(port))
        .map(|port| port as u16)
}

/// Port of `host:port`, `*:port` or `[v6]:port`.
fn port_of_address(address: &str) -> Option<u16> {
    let (_, port) = address.rsplit_once(':')?;
    parse_port(port)
}

fn windows_ports(output: &str) -> impl Iterator<Item = u16> + '_ {
    output.lines().filter_map(parse_port)
}

/// `lsof -nP -a -iTCP -sTCP:LISTEN -p <pid>` rows end in `host:port (LISTEN)`.
fn lsof_ports(output: &str, pid: u32) -> impl Iterator<Item = u16> + '_ {
    output.lines().filter_map(move |line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[fields.len() - 1] != "(LISTEN)" {
            return None;
        }
        if let Some(owner) = fields.get(1).and_then(|f| f.parse::<u32>().ok()) {
            if owner != pid {
                return None;
            }
        }
        port_of_address(fields[fields.len() - 2])
    })
}

/// `ss -tlnp` rows carry the local address in the fourth column and the owner as `pid=<pid>,`.
fn ss_ports(output: &str, pid: u32) -> impl Iterator<Item = u16> + '_ {
    let owner = format!("pid={},", pid);
    output.lines().filter_map(move |line| {
        if !line.contains(owner.as_str()) {
            return None;
        }
        port_of_address(line.split_whitespace().nth(3)?)
    })
}

fn finalize(ports: impl Iterator<Item = u16>) -> Vec<u16> {
    ports
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(MAX_CANDIDATE_PORTS)
        .collect()
}

/// Parse listening sockets in the dialect of `kind`.
pub fn parse_listening_ports(kind: PlatformKind, output: &str, pid: u32) -> Vec<u16> {
    match kind {
        PlatformKind::Windows => finalize(windows_ports(output)),
        PlatformKind::MacOs => finalize(lsof_ports(output, pid)),
        PlatformKind::Linux => finalize(ss_ports(output, pid)),
    }
}

/// Candidate ports for `pid`; empty on any failure.
pub async fn scan_frequencies<P>(platform: &P, pid: u32) -> Vec<u16>
where
    P: ProcessPlatform + ?Sized,
{
    match platform.list_listening_ports(pid).await {
        Ok(output) => {
            let ports = parse_listening_ports(platform.kind(), &output, pid);
            debug!(pid, ?ports, "Listening ports discovered");
            ports
        }
        Err(error) => {
            debug!(pid, %error, "Port enumeration failed");
            Vec::new()
        }
    }
}
