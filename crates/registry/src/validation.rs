//! Load-time validation of the configuration store.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use url::Url;
use wpsprobe_types::DEFAULT_LAYER;

use crate::config::{ConfigStore, ENDPOINT_KEY};

static LAYER_NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("layer name regex should compile"));

/// Validate every layer of the store.
pub fn validate_store(store: &ConfigStore) -> Result<(), ValidationError> {
    for name in store.layer_names() {
        validate_layer_name(name)?;
        if name != DEFAULT_LAYER {
            validate_host_layer(store, name)?;
        }
        debug!("Validated configuration layer: {}", name);
    }
    Ok(())
}

/// Validate a layer name.
pub fn validate_layer_name(name: &str) -> Result<(), ValidationError> {
    if !LAYER_NAME_REGEX.is_match(name) {
        return Err(ValidationError::InvalidLayerName {
            name: name.to_string(),
            reason: "Layer names must be non-empty and contain only letters, numbers, dots, underscores, and hyphens".to_string(),
        });
    }
    Ok(())
}

/// A host layer must declare an absolute http(s) endpoint.
fn validate_host_layer(store: &ConfigStore, name: &str) -> Result<(), ValidationError> {
    let endpoint = store
        .layer(name)
        .and_then(|layer| layer.get(ENDPOINT_KEY))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ValidationError::MissingEndpoint { host: name.to_string() })?;

    let url = Url::parse(endpoint).map_err(|error| ValidationError::InvalidEndpoint {
        host: name.to_string(),
        reason: error.to_string(),
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ValidationError::InvalidEndpoint {
            host: name.to_string(),
            reason: format!("Unsupported URL scheme: {} (expected http/https)", scheme),
        });
    }
    Ok(())
}

/// Errors that can occur during validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid layer name '{name}': {reason}")]
    InvalidLayerName { name: String, reason: String },
    #[error("Host '{host}' does not declare a '{}' endpoint", ENDPOINT_KEY)]
    MissingEndpoint { host: String },
    #[error("Host '{host}' has an invalid endpoint: {reason}")]
    InvalidEndpoint { host: String, reason: String },
}
