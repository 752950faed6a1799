pub mod error;

use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use crate::{
    models::{
        AuthConfig, Config, ConfigMetadata, CorsConfig, DeviceConfig,
        ScannerConfig, ServerConfig,
        sources::{EnvConfig, FileConfig},
    },
    validation::{self, ConfigWarnings},
};
use error::ConfigLoadError;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("zenkey.toml"),
        PathBuf::from("config/zenkey.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
struct ConfigLoaderOptions {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    /// Reads `path` instead of `./.env`. A missing file is not an error.
    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads `.env`, gathers the process environment and composes the final
    /// configuration.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        self.load_with_env(EnvConfig::gather(), env_file_loaded)
    }

    /// Composes configuration from an already gathered environment. Does not
    /// read `.env` or the process environment.
    pub fn load_with_env(
        &self,
        env_config: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env_config)?;

        let (config, warnings) = self.compose_config(
            file_config,
            env_config,
            config_path,
            env_file_loaded,
        )?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env_config.config_path {
            source.env = Some(from_env.clone());
        }

        if source.is_empty() {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned();
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents =
            fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
                path: path.clone(),
                source: err,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        debug!(path = %path.display(), ?provenance, "loaded configuration file");
        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
        env_file_loaded: bool,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if config_path.is_none() {
            warnings.push_with_hint(
                "No zenkey.toml detected; using defaults and environment variables",
                "Create zenkey.toml or pass --config to pin device and scanner settings",
            );
        }

        let FileConfig {
            server: file_server,
            device: file_device,
            scanner: file_scanner,
            cors: file_cors,
            auth: file_auth,
        } = file_config.unwrap_or_default();

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: env
                .server_host
                .or(file_server.host)
                .unwrap_or(server_defaults.host),
            port: env
                .server_port
                .or(file_server.port)
                .unwrap_or(server_defaults.port),
        };

        let device_defaults = DeviceConfig::default();
        let device = DeviceConfig {
            mount_path: env
                .mount_path
                .or(file_device.mount_path)
                .unwrap_or(device_defaults.mount_path),
            poll_interval: resolve_duration(
                "device.poll_interval",
                env.poll_interval.or(file_device.poll_interval),
                device_defaults.poll_interval,
            )?,
        };

        let scanner_defaults = ScannerConfig::default();
        let scanner = ScannerConfig {
            container_runtime: env
                .container_runtime
                .or(file_scanner.container_runtime)
                .unwrap_or(scanner_defaults.container_runtime),
            image: env
                .scanner_image
                .or(file_scanner.image)
                .unwrap_or(scanner_defaults.image),
            mount_suffix: env
                .mount_suffix
                .or(file_scanner.mount_suffix)
                .unwrap_or(scanner_defaults.mount_suffix),
            timeout: resolve_duration(
                "scanner.timeout",
                env.scan_timeout.or(file_scanner.timeout),
                scanner_defaults.timeout,
            )?,
            report_file: env
                .report_file
                .or(file_scanner.report_file)
                .unwrap_or(scanner_defaults.report_file),
            progress_interval: resolve_duration(
                "scanner.progress_interval",
                env.progress_interval.or(file_scanner.progress_interval),
                scanner_defaults.progress_interval,
            )?,
            progress_step: env
                .progress_step
                .or(file_scanner.progress_step)
                .unwrap_or(scanner_defaults.progress_step),
            progress_cap: env
                .progress_cap
                .or(file_scanner.progress_cap)
                .unwrap_or(scanner_defaults.progress_cap),
        };

        let cors = CorsConfig {
            allowed_origins: env
                .cors_allowed_origins
                .or(file_cors.allowed_origins)
                .unwrap_or_default(),
        };

        let auth = AuthConfig {
            bootstrap_identity: env
                .bootstrap_identity
                .or(file_auth.bootstrap_identity),
            bootstrap_secret: env.bootstrap_secret.or(file_auth.bootstrap_secret),
        };

        let config = Config {
            server,
            device,
            scanner,
            cors,
            auth,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        };

        warnings.extend(validation::check(&config));

        Ok((config, warnings))
    }
}

fn resolve_duration(
    field: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match raw {
        None => Ok(default),
        Some(value) => humantime::parse_duration(value.trim()).map_err(
            |source| ConfigLoadError::InvalidDuration {
                field,
                value,
                source,
            },
        ),
    }
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn is_empty(&self) -> bool {
        self.explicit.is_none() && self.env.is_none() && self.default.is_none()
    }

    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(
            self,
            ConfigPathProvenance::Explicit | ConfigPathProvenance::Env
        )
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoad {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.metadata.config_path.as_deref()
    }
}
