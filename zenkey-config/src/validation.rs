use std::fmt;

use crate::models::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hint {
            Some(hint) => write!(f, "{} ({})", self.message, hint),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.items.iter().any(|item| item.message.contains(needle))
    }
}

/// Suspicious but usable settings. Nothing here refuses to start.
pub fn check(config: &Config) -> ConfigWarnings {
    let mut warnings = ConfigWarnings::default();

    if config.device.poll_interval.is_zero() {
        warnings.push_with_hint(
            "device poll interval is zero; the mount location will be probed continuously",
            "Set device.poll_interval (e.g. \"500ms\")",
        );
    }

    if !config.device.mount_path.is_absolute() {
        warnings.push_with_hint(
            format!(
                "device mount path {} is relative and resolves against the working directory",
                config.device.mount_path.display()
            ),
            "Use an absolute path such as /mnt/usb",
        );
    }

    if config.scanner.progress_cap >= 100 {
        warnings.push_with_hint(
            format!(
                "scanner progress cap {} is not below 100; synthetic progress will stop at 99",
                config.scanner.progress_cap
            ),
            "Keep scanner.progress_cap below 100 so only completion reports 100",
        );
    }

    if config.scanner.progress_step == 0 {
        warnings.push(
            "scanner progress step is zero; progress stays at 0 until the scan finishes",
        );
    }

    if config.scanner.timeout.is_zero() {
        warnings.push_with_hint(
            "scanner timeout is zero; every scan will time out immediately",
            "Set scanner.timeout (e.g. \"120s\")",
        );
    }

    if config.auth.bootstrap_account().is_none() {
        warnings.push_with_hint(
            "no bootstrap operator account configured; scans require registering an account first",
            "Set ZENKEY_BOOTSTRAP_IDENTITY and ZENKEY_BOOTSTRAP_SECRET",
        );
    }

    warnings
}
