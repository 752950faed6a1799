pub mod sources;

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use crate::constants::{
    DEFAULT_CONTAINER_RUNTIME, DEFAULT_HOST, DEFAULT_MOUNT_PATH,
    DEFAULT_POLL_INTERVAL, DEFAULT_PORT, DEFAULT_PROGRESS_CAP,
    DEFAULT_PROGRESS_INTERVAL, DEFAULT_PROGRESS_STEP, DEFAULT_REPORT_FILE,
    DEFAULT_SCAN_TIMEOUT, DEFAULT_SCANNER_IMAGE,
};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub device: DeviceConfig,
    pub scanner: ScannerConfig,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Falls back to all interfaces when `host` is not an IP literal.
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = self
            .host
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));
        SocketAddr::new(ip, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Where the removable drive is expected to appear and how often to look.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub mount_path: PathBuf,
    pub poll_interval: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mount_path: PathBuf::from(DEFAULT_MOUNT_PATH),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub container_runtime: String,
    pub image: String,
    /// Appended to the `-v` bind mount argument, e.g. `:z` on SELinux hosts.
    pub mount_suffix: String,
    pub timeout: Duration,
    /// Relative to the device root.
    pub report_file: PathBuf,
    pub progress_interval: Duration,
    pub progress_step: u8,
    pub progress_cap: u8,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            container_runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
            image: DEFAULT_SCANNER_IMAGE.to_string(),
            mount_suffix: String::new(),
            timeout: DEFAULT_SCAN_TIMEOUT,
            report_file: PathBuf::from(DEFAULT_REPORT_FILE),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            progress_step: DEFAULT_PROGRESS_STEP,
            progress_cap: DEFAULT_PROGRESS_CAP,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty()
            || self
                .allowed_origins
                .iter()
                .any(|origin| origin.trim() == "*")
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub bootstrap_identity: Option<String>,
    pub bootstrap_secret: Option<String>,
}

impl AuthConfig {
    /// Identity and secret of the operator account seeded at startup, when
    /// both are set and non-blank.
    pub fn bootstrap_account(&self) -> Option<(&str, &str)> {
        let identity = self
            .bootstrap_identity
            .as_deref()
            .filter(|value| !value.trim().is_empty())?;
        let secret = self
            .bootstrap_secret
            .as_deref()
            .filter(|value| !value.is_empty())?;
        Some((identity, secret))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
