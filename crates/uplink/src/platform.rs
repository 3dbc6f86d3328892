//! OS capability layer.
//!
//! The only code in the workspace that spawns subprocesses. It returns raw
//! command output; parsing is done by [`crate::beacon`] and
//! [`crate::frequency`], keyed on [`PlatformKind`], so tests can feed canned
//! output for any OS on any host.

use async_trait::async_trait;
use fuelwatch_core::config::{is_valid_process_pattern, DEFAULT_PROCESS_PATTERN};
use fuelwatch_core::{Result, UplinkError};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Bound on the process listing command.
pub const PROCESS_QUERY_TIMEOUT: Duration = Duration::from_secs(8);
/// Bound on the listening socket command.
pub const PORT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
/// Stdout beyond this many bytes is never read; the command is killed.
pub const MAX_COMMAND_OUTPUT: usize = 4 * 1024 * 1024;

/// Which output dialect the platform produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    /// PowerShell JSON / bare port lines
    Windows,
    /// `ps` lines / `lsof` output
    MacOs,
    /// `ps` lines / `ss` output
    Linux,
}

impl PlatformKind {
    /// Dialect of the host this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            PlatformKind::Windows
        } else if cfg!(target_os = "macos") {
            PlatformKind::MacOs
        } else {
            PlatformKind::Linux
        }
    }
}

/// Process and socket enumeration.
#[async_trait]
pub trait ProcessPlatform: Send + Sync {
    /// Output dialect of this platform.
    fn kind(&self) -> PlatformKind;

    /// Raw listing of processes whose name matches the language server pattern.
    async fn list_candidate_processes(&self) -> Result<String>;

    /// Raw listing of TCP sockets in LISTEN state owned by `pid`.
    async fn list_listening_ports(&self, pid: u32) -> Result<String>;
}

/// [`ProcessPlatform`] backed by the host's own tools.
#[derive(Debug, Clone)]
pub struct SystemPlatform {
    kind: PlatformKind,
    process_pattern: String,
}

impl SystemPlatform {
    /// Platform for the current host.
    ///
    /// An unsafe `process_pattern` falls back to the default pattern.
    pub fn new(process_pattern: &str) -> Self {
        Self::with_kind(PlatformKind::current(), process_pattern)
    }

    pub fn with_kind(kind: PlatformKind, process_pattern: &str) -> Self {
        let process_pattern = if is_valid_process_pattern(process_pattern) {
            process_pattern.to_string()
        } else {
            DEFAULT_PROCESS_PATTERN.to_string()
        };
        Self {
            kind,
            process_pattern,
        }
    }

    pub fn process_pattern(&self) -> &str {
        &self.process_pattern
    }

    fn process_query(&self) -> (&'static str, Vec<String>) {
        match self.kind {
            PlatformKind::Windows => (
                "powershell",
                powershell_args(format!(
                    "Get-CimInstance Win32_Process | Where-Object {{ $_.Name -like '*{}*' }} | \
                     Select-Object ProcessId,CommandLine | ConvertTo-Json -Compress",
                    self.process_pattern
                )),
            ),
            PlatformKind::MacOs | PlatformKind::Linux => (
                "ps",
                vec!["-ax".into(), "-o".into(), "pid=,command=".into()],
            ),
        }
    }

    fn port_query(&self, pid: u32) -> (&'static str, Vec<String>) {
        match self.kind {
            PlatformKind::Windows => (
                "powershell",
                powershell_args(format!(
                    "Get-NetTCPConnection -State Listen -OwningProcess {} -ErrorAction SilentlyContinue | \
                     Select-Object -ExpandProperty LocalPort",
                    pid
                )),
            ),
            PlatformKind::MacOs => (
                "lsof",
                vec![
                    "-nP".into(),
                    "-a".into(),
                    "-iTCP".into(),
                    "-sTCP:LISTEN".into(),
                    "-p".into(),
                    pid.to_string(),
                ],
            ),
            PlatformKind::Linux => ("ss", vec!["-tlnp".into()]),
        }
    }
}

#[async_trait]
impl ProcessPlatform for SystemPlatform {
    fn kind(&self) -> PlatformKind {
        self.kind
    }

    async fn list_candidate_processes(&self) -> Result<String> {
        let (program, args) = self.process_query();
        let output = run_command(program, &args, PROCESS_QUERY_TIMEOUT).await?;

        match self.kind {
            // Already filtered by the PowerShell query
            PlatformKind::Windows => Ok(output),
            PlatformKind::MacOs | PlatformKind::Linux => Ok(output
                .lines()
                .filter(|line| line.contains(self.process_pattern.as_str()))
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    async fn list_listening_ports(&self, pid: u32) -> Result<String> {
        let (program, args) = self.port_query(pid);
        run_command(program, &args, PORT_QUERY_TIMEOUT).await
    }
}

fn powershell_args(script: String) -> Vec<String> {
    vec![
        "-NoProfile".into(),
        "-NonInteractive".into(),
        "-Command".into(),
        script,
    ]
}

/// Run `program` with `args`, returning stdout on a zero exit status.
///
/// The child is killed if the deadline passes.
async fn run_command(program: &str, args: &[String], limit: Duration) -> Result<String> {
    run_command_capped(program, args, limit, MAX_COMMAND_OUTPUT).await
}

/// At most `max_output` bytes of stdout are ever buffered. A child that
/// writes more is killed and its output so far is returned.
async fn run_command_capped(
    program: &str,
    args: &[String],
    limit: Duration,
    max_output: usize,
) -> Result<String> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|error| UplinkError::Discovery(format!("failed to run {}: {}", program, error)))?;

    let stdout = timeout(limit, collect_stdout(child, program, max_output))
        .await
        .map_err(|_| {
            UplinkError::Discovery(format!("{} timed out after {}s", program, limit.as_secs()))
        })??;

    debug!(program, bytes = stdout.len(), "Command completed");
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

async fn collect_stdout(mut child: Child, program: &str, max_output: usize) -> Result<Vec<u8>> {
    let read_error =
        |error: std::io::Error| UplinkError::Discovery(format!("reading {} output: {}", program, error));

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| UplinkError::Discovery(format!("{} has no stdout", program)))?;

    let mut captured = Vec::new();
    (&mut stdout)
        .take(max_output as u64)
        .read_to_end(&mut captured)
        .await
        .map_err(read_error)?;

    if captured.len() >= max_output {
        warn!(program, max_output, "Command output truncated");
        drop(stdout);
        if let Err(error) = child.start_kill() {
            debug!(program, %error, "Kill after truncation failed");
        }
        let _ = child.wait().await;
        return Ok(captured);
    }

    let status = child.wait().await.map_err(read_error)?;
    if !status.success() {
        return Err(UplinkError::Discovery(format!(
            "{} exited with {}",
            program, status
        )));
    }
    Ok(captured)
}
