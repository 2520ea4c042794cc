//! Error types for the Vultr backend.

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;

/// Errors raised by the Vultr backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum VultrBackendError {
    /// Raised when the provider configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a request is missing a required field.
    #[error("invalid instance request: {0}")]
    Validation(String),
    /// Raised when no region matches the requested city.
    #[error("region \"{city}\" not found; check the city name")]
    RegionNotFound {
        /// City requested by the caller.
        city: String,
    },
    /// Raised when no x64 operating system matches the search term.
    #[error("OS matching \"{name}\" not found or not available in x64 architecture")]
    OsNotFound {
        /// Search term requested by the caller.
        name: String,
    },
    /// Raised when the plan is not offered in the region.
    #[error("plan \"{plan}\" not found or not available in the {region} region")]
    PlanNotFound {
        /// Plan requested by the caller.
        plan: String,
        /// City of the resolved region.
        region: String,
    },
    /// Raised when the API answers with a non-success status.
    #[error("Vultr API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider message, or the raw body when it carries none.
        message: String,
    },
    /// Raised when the request cannot be sent or the response cannot be read.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Transport error message.
        message: String,
    },
    /// Raised when a successful response has an unexpected shape.
    #[error("unexpected response from {endpoint}: {message}")]
    Decode {
        /// API path that was called.
        endpoint: String,
        /// Decoder error message.
        message: String,
    },
}

impl From<BackendError> for VultrBackendError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Validation(field) => Self::Validation(field),
        }
    }
}

impl From<ConfigError> for VultrBackendError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<reqwest::Error> for VultrBackendError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http {
            message: value.to_string(),
        }
    }
}
