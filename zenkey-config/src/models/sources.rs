use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file. Durations stay as strings
/// until the loader parses them.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub device: FileDeviceConfig,
    #[serde(default)]
    pub scanner: FileScannerConfig,
    #[serde(default)]
    pub cors: FileCorsConfig,
    #[serde(default)]
    pub auth: FileAuthConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileDeviceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileScannerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_step: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_cap: Option<u8>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileCorsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileAuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_secret: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub mount_path: Option<PathBuf>,
    pub poll_interval: Option<String>,
    pub container_runtime: Option<String>,
    pub scanner_image: Option<String>,
    pub mount_suffix: Option<String>,
    pub scan_timeout: Option<String>,
    pub report_file: Option<PathBuf>,
    pub progress_interval: Option<String>,
    pub progress_step: Option<u8>,
    pub progress_cap: Option<u8>,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub bootstrap_identity: Option<String>,
    pub bootstrap_secret: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        let mut env_config = Self::default();

        env_config.config_path =
            std::env::var("ZENKEY_CONFIG").ok().map(PathBuf::from);

        env_config.server_host = std::env::var("SERVER_HOST").ok();
        env_config.server_port = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|s| s.parse().ok());

        env_config.mount_path = std::env::var("USB_PATH").ok().map(PathBuf::from);
        env_config.poll_interval = std::env::var("USB_POLL_INTERVAL").ok();

        env_config.container_runtime = std::env::var("CONTAINER_RUNTIME").ok();
        env_config.scanner_image = std::env::var("DOCKER_IMAGE").ok();
        env_config.mount_suffix = std::env::var("SCAN_MOUNT_SUFFIX").ok();
        env_config.scan_timeout = std::env::var("SCAN_TIMEOUT").ok();
        env_config.report_file =
            std::env::var("SCAN_REPORT_FILE").ok().map(PathBuf::from);
        env_config.progress_interval =
            std::env::var("SCAN_PROGRESS_INTERVAL").ok();
        env_config.progress_step = std::env::var("SCAN_PROGRESS_STEP")
            .ok()
            .and_then(|s| s.parse().ok());
        env_config.progress_cap = std::env::var("SCAN_PROGRESS_CAP")
            .ok()
            .and_then(|s| s.parse().ok());

        env_config.cors_allowed_origins = parse_csv_var("CORS_ALLOWED_ORIGINS");

        env_config.bootstrap_identity =
            std::env::var("ZENKEY_BOOTSTRAP_IDENTITY").ok();
        env_config.bootstrap_secret =
            std::env::var("ZENKEY_BOOTSTRAP_SECRET").ok();

        env_config
    }
}

fn parse_csv_var(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|raw| split_csv(&raw))
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}
