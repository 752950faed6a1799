//! Subprocess supervision for the external scan engine.
//!
//! The engine runs inside a disposable container with the device bind-mounted
//! read-write at the same path, so any in-place remediation it performs is
//! visible on the device afterwards. The run is bounded by a hard wall-clock
//! timeout; on expiry the process is killed and reaped before the failure is
//! reported. Once the process exits the report artifact is read from a fixed
//! file name under the device root.

use std::{
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::error::{ScanError, ScanResult};

/// Report text used when the engine exits cleanly without writing a report.
pub const NO_REPORT_SENTINEL: &str =
    "No scan report found. The scan engine may not have scanned anything.";

/// Bound on draining output pipes once the process has exited or been
/// killed; a grandchild that inherited the pipes can hold them open
/// indefinitely.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanArtifact {
    Report(String),
    Missing,
}

impl ScanArtifact {
    /// Report text, or the sentinel when the engine produced none.
    pub fn text(&self) -> &str {
        match self {
            ScanArtifact::Report(text) => text,
            ScanArtifact::Missing => NO_REPORT_SENTINEL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }

    /// Standard error when there is any, standard output otherwise.
    pub fn diagnostic(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        }
    }
}

/// Runs one scan against a mounted device. Implementations must not touch
/// shared session state; the caller applies the outcome.
#[async_trait]
pub trait ScanRunner: Send + Sync + fmt::Debug {
    async fn run(&self, target: &Path) -> ScanResult<ScanArtifact>;
}

/// `<runtime> run --rm -v <target>:<target><suffix> <image> <target>`
#[derive(Debug, Clone)]
pub struct ContainerScanRunner {
    runtime: String,
    image: String,
    timeout: Duration,
    report_file: PathBuf,
    mount_suffix: String,
}

impl ContainerScanRunner {
    pub fn new(
        runtime: impl Into<String>,
        image: impl Into<String>,
        timeout: Duration,
        report_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime: runtime.into(),
            image: image.into(),
            timeout,
            report_file: report_file.into(),
            mount_suffix: String::new(),
        }
    }

    /// Bind mount options such as `:z` for SELinux hosts.
    pub fn with_mount_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.mount_suffix = suffix.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn report_path(&self, target: &Path) -> PathBuf {
        target.join(&self.report_file)
    }

    pub fn command(&self, target: &Path) -> Command {
        let mount = format!(
            "{}:{}{}",
            target.display(),
            target.display(),
            self.mount_suffix
        );

        let mut cmd = Command::new(&self.runtime);
        cmd.arg("run")
            .arg("--rm")
            .arg("-v")
            .arg(mount)
            .arg(&self.image)
            .arg(target);
        cmd
    }
}

#[async_trait]
impl ScanRunner for ContainerScanRunner {
    async fn run(&self, target: &Path) -> ScanResult<ScanArtifact> {
        info!(
            target: "scan::supervisor",
            runtime = %self.runtime,
            image = %self.image,
            device = %target.display(),
            timeout = %humantime::format_duration(self.timeout),
            "launching scan container"
        );

        let output = supervise(self.command(target), self.timeout).await?;
        debug!(
            target: "scan::supervisor",
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "scan container exited cleanly"
        );

        Ok(read_report(&self.report_path(target)).await)
    }
}

async fn read_report(path: &Path) -> ScanArtifact {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => ScanArtifact::Report(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            info!(
                target: "scan::supervisor",
                path = %path.display(),
                "scan finished without a report artifact"
            );
            ScanArtifact::Missing
        }
        Err(err) => {
            warn!(
                target: "scan::supervisor",
                path = %path.display(),
                error = %err,
                "report artifact unreadable; treating as missing"
            );
            ScanArtifact::Missing
        }
    }
}

/// Spawns `command`, captures both output streams and enforces `timeout`.
pub async fn supervise(
    mut command: Command,
    timeout: Duration,
) -> ScanResult<CapturedOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(ScanError::Spawn)?;
    let stdout = tokio::spawn(drain(child.stdout.take()));
    let stderr = tokio::spawn(drain(child.stderr.take()));

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let output = collect_within(stdout, stderr).await;
            if status.success() {
                Ok(output)
            } else {
                Err(ScanError::NonZeroExit {
                    code: status.code(),
                    diagnostic: output.diagnostic(),
                })
            }
        }
        Ok(Err(err)) => Err(ScanError::Io(err)),
        Err(_) => {
            warn!(
                target: "scan::supervisor",
                pid = ?child.id(),
                timeout = %humantime::format_duration(timeout),
                "scan process exceeded timeout; killing"
            );
            if let Err(err) = child.kill().await {
                warn!(target: "scan::supervisor", error = %err, "failed to kill scan process");
            }

            let output = collect_within(stdout, stderr).await;

            Err(ScanError::Timeout {
                after: timeout,
                output: output.combined(),
            })
        }
    }
}

async fn drain<R>(reader: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(err) = reader.read_to_end(&mut buf).await {
        debug!(target: "scan::supervisor", error = %err, "output pipe closed with error");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect(
    stdout: JoinHandle<String>,
    stderr: JoinHandle<String>,
) -> CapturedOutput {
    CapturedOutput {
        stdout: stdout.await.unwrap_or_default(),
        stderr: stderr.await.unwrap_or_default(),
    }
}

/// [`collect`] bounded by [`OUTPUT_DRAIN_GRACE`]. Drains still running at the
/// deadline are aborted and their output is lost.
async fn collect_within(
    stdout: JoinHandle<String>,
    stderr: JoinHandle<String>,
) -> CapturedOutput {
    let aborts = [stdout.abort_handle(), stderr.abort_handle()];
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, collect(stdout, stderr)).await {
        Ok(output) => output,
        Err(_) => {
            debug!(
                target: "scan::supervisor",
                grace = ?OUTPUT_DRAIN_GRACE,
                "output pipes still open after exit; abandoning drain"
            );
            for abort in aborts {
                abort.abort();
            }
            CapturedOutput::default()
        }
    }
}
