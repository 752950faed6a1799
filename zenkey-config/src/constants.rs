use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

pub const DEFAULT_MOUNT_PATH: &str = "/mnt/usb";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub const DEFAULT_CONTAINER_RUNTIME: &str = "docker";
pub const DEFAULT_SCANNER_IMAGE: &str = "clamav-scan";
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_REPORT_FILE: &str = "scan_report.txt";
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_PROGRESS_STEP: u8 = 5;
pub const DEFAULT_PROGRESS_CAP: u8 = 90;
