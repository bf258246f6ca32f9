//! Layered key/value configuration: one `default` layer plus one layer per host.
//!
//! ```yaml
//! default:
//!   ncmerge/resource: http://data.example/a.nc, http://data.example/b.nc
//! pavics:
//!   wps: https://pavics.example/twitcher/ows/proxy/flyingpigeon
//!   exclude: averager
//!   subset/typename: public:usa_states
//! ```

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use dirs_next::config_dir;
use indexmap::IndexMap;
use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;
use wpsprobe_types::{DEFAULT_LAYER, HostProfile, JobFilter, WpsError};
use wpsprobe_util::expand_tilde;

use crate::validation::{ValidationError, validate_store};

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "WPSPROBE_CONFIG_PATH";
/// Host-layer key holding the WPS endpoint.
pub const ENDPOINT_KEY: &str = "wps";
pub const INCLUDE_KEY: &str = "include";
pub const EXCLUDE_KEY: &str = "exclude";
/// Host-layer keys that describe the host rather than a job parameter.
const RESERVED_KEYS: [&str; 3] = [ENDPOINT_KEY, INCLUDE_KEY, EXCLUDE_KEY];

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Syntax(#[from] serde_yaml::Error),
    #[error("invalid configuration value for '{layer}': {reason}")]
    Invalid { layer: String, reason: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type Layer = IndexMap<String, String>;

/// Immutable, ordered view of every configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigStore {
    layers: IndexMap<String, Layer>,
}

impl ConfigStore {
    /// Build a store from already-stringified layers, validating it.
    pub fn from_layers(layers: IndexMap<String, Layer>) -> Result<Self, ConfigError> {
        let store = Self { layers };
        validate_store(&store)?;
        Ok(store)
    }

    /// Parse a YAML (or JSON) document whose top-level keys are layer names.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let document: Value = serde_yaml::from_str(content)?;
        let mapping = match document {
            Value::Mapping(mapping) => mapping,
            Value::Null => return Self::from_layers(IndexMap::new()),
            other => {
                return Err(ConfigError::Invalid {
                    layer: "<root>".into(),
                    reason: format!("expected a mapping of layers, found {}", describe(&other)),
                });
            }
        };

        let mut layers = IndexMap::new();
        for (name, body) in mapping {
            let name = scalar_to_string(&name).ok_or_else(|| ConfigError::Invalid {
                layer: "<root>".into(),
                reason: format!("layer names must be scalars, found {}", describe(&name)),
            })?;
            let layer = parse_layer(&name, body)?;
            layers.insert(name, layer);
        }
        Self::from_layers(layers)
    }

    /// Read and parse the configuration file at `path`.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_yaml_str(&content)?;
        debug!(path = %path.display(), layers = store.layers.len(), "loaded configuration");
        Ok(store)
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn has_host(&self, name: &str) -> bool {
        name != DEFAULT_LAYER && self.layers.contains_key(name)
    }

    /// Every layer except `default`, in document order.
    pub fn host_names(&self) -> Vec<String> {
        self.layers.keys().filter(|name| name.as_str() != DEFAULT_LAYER).cloned().collect()
    }

    /// Look `key` up in `default` then in the overrides of `host`.
    ///
    /// The last layer defining the key wins, even with an empty value; an empty
    /// winning value counts as missing.
    pub fn lookup<'a>(&'a self, host: &'a HostProfile, key: &str) -> Option<&'a str> {
        let default = self
            .layers
            .get(DEFAULT_LAYER)
            .and_then(|layer| layer.get(key))
            .map(String::as_str);
        [default, host.override_for(key)]
            .into_iter()
            .flatten()
            .last()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Build the [`HostProfile`] for a host layer.
    ///
    /// # Errors
    /// Unknown hosts, a missing or invalid endpoint, and include/exclude both being
    /// set are configuration errors.
    pub fn host_profile(&self, name: &str) -> Result<HostProfile, WpsError> {
        let layer = self
            .layers
            .get(name)
            .filter(|_| name != DEFAULT_LAYER)
            .ok_or_else(|| WpsError::configuration(format!("unknown host '{name}'")))?;

        let raw_endpoint = layer
            .get(ENDPOINT_KEY)
            .ok_or_else(|| WpsError::configuration(format!("host '{name}' does not declare '{ENDPOINT_KEY}'")))?;
        let endpoint = Url::parse(raw_endpoint.trim())
            .map_err(|error| WpsError::configuration(format!("host '{name}' has an invalid '{ENDPOINT_KEY}' URL: {error}")))?;

        let filter = JobFilter::from_raw(
            layer.get(INCLUDE_KEY).map(String::as_str),
            layer.get(EXCLUDE_KEY).map(String::as_str),
        )
        .map_err(|error| match error {
            WpsError::Configuration(reason) => WpsError::configuration(format!("host '{name}': {reason}")),
            other => other,
        })?;

        let profile = layer
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .fold(HostProfile::new(name, endpoint).with_filter(filter), |profile, (key, value)| {
                profile.with_override(key.as_str(), value.as_str())
            });
        Ok(profile)
    }
}

fn parse_layer(name: &str, body: Value) -> Result<Layer, ConfigError> {
    let mapping = match body {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Ok(Layer::new()),
        other => {
            return Err(ConfigError::Invalid {
                layer: name.to_string(),
                reason: format!("expected a mapping of settings, found {}", describe(&other)),
            });
        }
    };

    let mut layer = Layer::new();
    for (key, value) in mapping {
        let key = scalar_to_string(&key).ok_or_else(|| ConfigError::Invalid {
            layer: name.to_string(),
            reason: format!("setting names must be scalars, found {}", describe(&key)),
        })?;
        let value = scalar_to_string(&value).ok_or_else(|| ConfigError::Invalid {
            layer: name.to_string(),
            reason: format!("setting '{key}' must be a scalar, found {}", describe(&value)),
        })?;
        layer.insert(key, value);
    }
    Ok(layer)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => Some(String::new()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Get the default path for the configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wpsprobe")
        .join("config.yaml")
}
