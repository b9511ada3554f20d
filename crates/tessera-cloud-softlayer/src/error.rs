//! SoftLayer provider error types

use tessera_cloud::{ResourceError, ResourceState};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoftLayerError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Product package not found for type {0}")]
    PackageNotFound(String),

    #[error("Failed to fetch catalog for package type {package_type}: {source}")]
    CatalogFetch {
        package_type: String,
        #[source]
        source: Box<SoftLayerError>,
    },

    #[error("No item with key name '{key_name}' in package type {package_type}")]
    NoMatchingItem {
        key_name: String,
        package_type: String,
    },

    #[error("No candidate package types given for '{0}'")]
    NoCandidatePackages(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("SoftLayer refused to {action} {target}")]
    Refused { action: &'static str, target: String },

    #[error("SoftLayer API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Expected at most one {what} for {filter}, found {count}")]
    AmbiguousMatch {
        what: String,
        filter: String,
        count: usize,
    },

    #[error("Nitro request to {node} failed ({status}): {message}")]
    Nitro {
        node: String,
        status: u16,
        message: String,
    },

    #[error("HA pairing step '{step}' failed: {source}")]
    HaStep {
        step: &'static str,
        #[source]
        source: Box<SoftLayerError>,
    },

    #[error(
        "HA pair {pair} was removed, but restoring the secondary's admin password failed: {restore_error}"
    )]
    HaUnpairIncomplete {
        pair: String,
        #[source]
        restore_error: Box<SoftLayerError>,
    },

    /// The object exists remotely but did not become ready.
    #[error("{} {} was created but is not ready: {source}", .state.resource_type, .state.id)]
    Incomplete {
        state: Box<ResourceState>,
        #[source]
        source: Box<SoftLayerError>,
    },

    #[error("Invalid firewall rule: {0}")]
    InvalidRule(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] tessera_cloud::CloudError),
}

impl SoftLayerError {
    /// True when the remote side reported the object as absent (HTTP 404)
    pub fn is_not_found(&self) -> bool {
        match self {
            SoftLayerError::NotFound(_) => true,
            SoftLayerError::Api { status, .. } | SoftLayerError::Nitro { status, .. } => {
                *status == 404
            }
            _ => false,
        }
    }

    /// True when an awaited remote operation did not finish in time
    pub fn is_timeout(&self) -> bool {
        match self {
            SoftLayerError::CloudError(e) => e.is_timeout(),
            SoftLayerError::Incomplete { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

impl ResourceError for SoftLayerError {
    fn partial_state(&self) -> Option<&ResourceState> {
        match self {
            SoftLayerError::Incomplete { state, .. } => Some(state),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SoftLayerError>;
