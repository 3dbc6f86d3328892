//! Beacon Locator: find the language server and lift its CSRF token.
//!
//! Process listings are untrusted input. Every token candidate is checked
//! against the token charset/length rule and every PID against the PID range
//! before a [`Credential`] is built. When several processes qualify, the
//! first valid pair in listing order wins.

use fuelwatch_core::types::is_valid_token;
use fuelwatch_core::{Credential, Result, UplinkError};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::platform::{PlatformKind, ProcessPlatform};

static TOKEN_PATTERN: OnceLock<Regex> = OnceLock::new();

fn token_pattern() -> &'static Regex {
    TOKEN_PATTERN.get_or_init(|| {
        Regex::new(r#"--csrf[-_]?token[=\s]+["']?([^\s"']+)"#).expect("token pattern is valid")
    })
}

/// First valid CSRF token in a command line.
pub fn extract_token(command_line: &str) -> Option<String> {
    token_pattern()
        .captures_iter(command_line)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str())
        .find(|candidate| is_valid_token(candidate))
        .map(str::to_string)
}

/// Parse `pid command...` lines from `ps`.
pub fn parse_unix_listing(output: &str) -> Option<Credential> {
    output.lines().find_map(|line| {
        let (pid, command_line) = line.trim().split_once(char::is_whitespace)?;
        let pid = pid.parse::<u32>().ok()?;
        Credential::new(pid, extract_token(command_line)?)
    })
}

/// Parse `ConvertTo-Json` output of `{ProcessId, CommandLine}` records.
///
/// PowerShell emits a bare object for a single match and an array otherwise.
pub fn parse_windows_listing(output: &str) -> Option<Credential> {
    let parsed: Value = serde_json::from_str(output.trim()).ok()?;
    let records: Vec<&Value> = match &parsed {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![&parsed],
        _ => return None,
    };

    records.into_iter().find_map(|record| {
        let pid = u32::try_from(record.get("ProcessId")?.as_u64()?).ok()?;
        let command_line = record.get("CommandLine")?.as_str()?;
        Credential::new(pid, extract_token(command_line)?)
    })
}

/// Parse a process listing in the dialect of `kind`.
pub fn parse_process_listing(kind: PlatformKind, output: &str) -> Option<Credential> {
    match kind {
        PlatformKind::Windows => parse_windows_listing(output),
        PlatformKind::MacOs | PlatformKind::Linux => parse_unix_listing(output),
    }
}

/// Locate the language server, describing why when it cannot be found.
pub async fn locate<P>(platform: &P) -> Result<Credential>
where
    P: ProcessPlatform + ?Sized,
{
    let output = platform.list_candidate_processes().await?;
    if output.trim().is_empty() {
        return Err(UplinkError::Discovery(
            "no language server process found".to_string(),
        ));
    }

    let credential = parse_process_listing(platform.kind(), &output).ok_or_else(|| {
        UplinkError::Discovery("no process carried a valid pid and csrf token".to_string())
    })?;

    info!(pid = credential.pid(), "Beacon located");
    Ok(credential)
}

/// Locate the language server; `None` on any failure.
pub async fn locate_beacon<P>(platform: &P) -> Option<Credential>
where
    P: ProcessPlatform + ?Sized,
{
    match locate(platform).await {
        Ok(credential) => Some(credential),
        Err(error) => {
            debug!(%error, "Beacon not located");
            None
        }
    }
}
