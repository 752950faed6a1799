use std::time::Duration;

use thiserror::Error;

/// Subprocess-level faults. Every variant ends the scan session in the
/// `Error` state; [`ScanError::diagnostic`] is what the operator sees.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to launch scan process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("scan process timed out after {}", humantime::format_duration(*.after))]
    Timeout { after: Duration, output: String },

    #[error("scan process exited with {}", exit_code_label(*.code))]
    NonZeroExit { code: Option<i32>, diagnostic: String },

    #[error("failed to supervise scan process: {0}")]
    Io(#[source] std::io::Error),
}

impl ScanError {
    /// Human-readable failure text sourced from the captured output where
    /// there is any. Never empty.
    pub fn diagnostic(&self) -> String {
        match self {
            ScanError::Spawn(err) | ScanError::Io(err) => err.to_string(),
            ScanError::Timeout { output, .. } => {
                let output = output.trim();
                if output.is_empty() {
                    self.to_string()
                } else {
                    format!("{self}\n{output}")
                }
            }
            ScanError::NonZeroExit { diagnostic, .. } => {
                if diagnostic.trim().is_empty() {
                    self.to_string()
                } else {
                    diagnostic.clone()
                }
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScanError::Timeout { .. })
    }
}

fn exit_code_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("an account already exists for {0}")]
    Conflict(String),

    #[error("invalid account input: {0}")]
    InvalidInput(String),

    #[error("failed to hash secret: {0}")]
    Hashing(String),
}

pub type ScanResult<T> = std::result::Result<T, ScanError>;
