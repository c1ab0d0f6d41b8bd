//! Configuration
//!
//! Every process reads a small key/value configuration: `HOST`, `PORT`, and `NAME` for
//! satellites, plus optional timeout and retry knobs. Values come from a
//! [`ConfigProvider`]; the binaries layer environment variables over `.properties` files.

use crate::comm::protocol::Timeouts;
use crate::comm::types::ConnectivityInfo;
use crate::satellite::service::SatelliteSettings;
use crate::server::dispatcher::DispatcherSettings;

use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const KEY_NAME: &str = "NAME";
pub const KEY_HOST: &str = "HOST";
pub const KEY_PORT: &str = "PORT";
pub const KEY_CONNECT_TIMEOUT_MS: &str = "CONNECT_TIMEOUT_MS";
pub const KEY_IO_TIMEOUT_MS: &str = "IO_TIMEOUT_MS";
pub const KEY_JOB_TIMEOUT_MS: &str = "JOB_TIMEOUT_MS";
pub const KEY_FORWARD_ATTEMPTS: &str = "FORWARD_ATTEMPTS";
pub const KEY_REGISTRATION_ATTEMPTS: &str = "REGISTRATION_ATTEMPTS";

pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed properties in {origin}: {reason}")]
    Malformed { origin: String, reason: String },

    #[error("missing configuration key {0}")]
    Missing(String),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

pub trait ConfigProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Java `.properties` content, read with the `java-properties` crate: `=`, `:` or
/// whitespace separators, `#`/`!` comments, `\` line continuations and escapes.
#[derive(Debug, Clone, Default)]
pub struct PropertiesConfig {
    values: HashMap<String, String>,
}

impl PropertiesConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let values = java_properties::read(std::io::BufReader::new(file)).map_err(|e| {
            ConfigError::Malformed {
                origin: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self { values })
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let values =
            java_properties::read(text.as_bytes()).map_err(|e| ConfigError::Malformed {
                origin: "inline properties".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { values })
    }
}

impl ConfigProvider for PropertiesConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Environment variables named `{prefix}{KEY}`.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
}

impl EnvConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ConfigProvider for EnvConfig {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", self.prefix, key)).ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigProvider for MapConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Looks keys up in each layer in order; the first layer that has the key wins.
#[derive(Default)]
pub struct LayeredConfig {
    layers: Vec<Box<dyn ConfigProvider>>,
}

impl LayeredConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, layer: impl ConfigProvider + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }
}

impl ConfigProvider for LayeredConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }
}

pub fn required(provider: &dyn ConfigProvider, key: &str) -> Result<String, ConfigError> {
    provider
        .get(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::Missing(key.to_string()))
}

pub fn parsed<T>(provider: &dyn ConfigProvider, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match provider.get(key).filter(|value| !value.is_empty()) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                value,
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Reads `NAME`, `HOST` and `PORT`. `HOST` defaults to loopback.
pub fn connectivity(
    provider: &dyn ConfigProvider,
    require_name: bool,
) -> Result<ConnectivityInfo, ConfigError> {
    let name = if require_name {
        Some(required(provider, KEY_NAME)?)
    } else {
        provider.get(KEY_NAME).filter(|name| !name.is_empty())
    };

    let host = provider
        .get(KEY_HOST)
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = parsed::<u16>(provider, KEY_PORT)?
        .ok_or_else(|| ConfigError::Missing(KEY_PORT.to_string()))?;

    Ok(ConnectivityInfo { name, host, port })
}

pub fn timeouts(provider: &dyn ConfigProvider) -> Result<Timeouts, ConfigError> {
    let defaults = Timeouts::default();
    let millis = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
        Ok(parsed::<u64>(provider, key)?
            .map(Duration::from_millis)
            .unwrap_or(default))
    };

    Ok(Timeouts {
        connect: millis(KEY_CONNECT_TIMEOUT_MS, defaults.connect)?,
        io: millis(KEY_IO_TIMEOUT_MS, defaults.io)?,
        job: millis(KEY_JOB_TIMEOUT_MS, defaults.job)?,
    })
}

pub fn dispatcher_settings(
    provider: &dyn ConfigProvider,
) -> Result<DispatcherSettings, ConfigError> {
    let defaults = DispatcherSettings::default();

    Ok(DispatcherSettings {
        timeouts: timeouts(provider)?,
        forward_attempts: parsed(provider, KEY_FORWARD_ATTEMPTS)?
            .unwrap_or(defaults.forward_attempts),
    })
}

pub fn satellite_settings(
    provider: &dyn ConfigProvider,
) -> Result<SatelliteSettings, ConfigError> {
    let defaults = SatelliteSettings::default();

    Ok(SatelliteSettings {
        timeouts: timeouts(provider)?,
        registration_attempts: parsed(provider, KEY_REGISTRATION_ATTEMPTS)?
            .unwrap_or(defaults.registration_attempts),
    })
}
