//! Backend abstraction for provisioning the gateway instance.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use thiserror::Error;

/// Address reported by providers before a public IPv4 has been assigned.
///
/// Kept as an explicit sentinel rather than folded into "no address" so the
/// readiness predicate can tell the two apart.
pub const UNASSIGNED_ADDRESS: &str = "0.0.0.0";

/// Parameters required to create a new instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRequest {
    /// City name of the target region (for example `Amsterdam`). Matched
    /// case-insensitively against the provider's region catalogue.
    pub region_city: String,
    /// Plan identifier (for example `vc2-1c-1gb`).
    pub plan_id: String,
    /// Search term for the operating system (for example `Ubuntu 24.04`).
    pub os_name: String,
    /// Label attached to the instance.
    pub label: String,
}

impl InstanceRequest {
    /// Starts a builder for an [`InstanceRequest`].
    #[must_use]
    pub fn builder() -> InstanceRequestBuilder {
        InstanceRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any field is empty.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.region_city.is_empty() {
            return Err(BackendError::Validation("region_city".to_owned()));
        }
        if self.plan_id.is_empty() {
            return Err(BackendError::Validation("plan_id".to_owned()));
        }
        if self.os_name.is_empty() {
            return Err(BackendError::Validation("os_name".to_owned()));
        }
        if self.label.is_empty() {
            return Err(BackendError::Validation("label".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`InstanceRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceRequestBuilder {
    region_city: String,
    plan_id: String,
    os_name: String,
    label: String,
}

impl InstanceRequestBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the region city.
    #[must_use]
    pub fn region_city(mut self, value: impl Into<String>) -> Self {
        self.region_city = value.into();
        self
    }

    /// Sets the plan identifier.
    #[must_use]
    pub fn plan_id(mut self, value: impl Into<String>) -> Self {
        self.plan_id = value.into();
        self
    }

    /// Sets the operating system search term.
    #[must_use]
    pub fn os_name(mut self, value: impl Into<String>) -> Self {
        self.os_name = value.into();
        self
    }

    /// Sets the instance label.
    #[must_use]
    pub fn label(mut self, value: impl Into<String>) -> Self {
        self.label = value.into();
        self
    }

    /// Builds and validates the [`InstanceRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required field is empty.
    pub fn build(self) -> Result<InstanceRequest, BackendError> {
        let request = InstanceRequest {
            region_city: self.region_city.trim().to_owned(),
            plan_id: self.plan_id.trim().to_owned(),
            os_name: self.os_name.trim().to_owned(),
            label: self.label.trim().to_owned(),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Handle returned by a backend once an instance has been created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceHandle {
    /// Provider specific identifier for the instance.
    pub id: String,
}

/// Lifecycle status reported by the provider.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(from = "String")]
pub enum InstanceStatus {
    /// Instance is being provisioned.
    Pending,
    /// Instance is provisioned and running.
    Active,
    /// Instance has been suspended by the provider.
    Suspended,
    /// Instance is changing plan.
    Resizing,
    /// Any status this crate does not know about.
    Other(String),
}

impl InstanceStatus {
    /// Returns the provider's string form of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Resizing => "resizing",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl From<&str> for InstanceStatus {
    fn from(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "active" => Self::Active,
            "suspended" => Self::Suspended,
            "resizing" => Self::Resizing,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for InstanceStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of an instance, re-fetched on every poll.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSnapshot {
    /// Provider specific identifier for the instance.
    pub id: String,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Main IPv4 address, or [`UNASSIGNED_ADDRESS`] until one is assigned.
    pub main_ip: String,
    /// Temporary root password, only returned by the creation call.
    pub default_password: Option<String>,
}

impl InstanceSnapshot {
    /// Returns a handle addressing this instance.
    #[must_use]
    pub fn handle(&self) -> InstanceHandle {
        InstanceHandle {
            id: self.id.clone(),
        }
    }

    /// Returns `true` once the provider has assigned a real address.
    #[must_use]
    pub fn has_address(&self) -> bool {
        !self.main_ip.is_empty() && self.main_ip != UNASSIGNED_ADDRESS
    }

    /// Readiness predicate: active status and an assigned address.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == InstanceStatus::Active && self.has_address()
    }
}

/// Errors raised by backends.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud backends.
pub trait Backend {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates a new instance and returns a handle used for subsequent calls.
    fn create<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceSnapshot, Self::Error>;

    /// Fetches the current state of the instance behind `handle`.
    fn fetch_instance<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, InstanceSnapshot, Self::Error>;
}
