//! Configuration loading via `ortho-config`.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::backend::InstanceRequest;
use crate::readiness::ReadinessPoller;

/// Default base URL of the Vultr v2 API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.vultr.com/v2";

/// File name `deploy` renders the server configuration into, and the file
/// `install` discovers it from.
pub const SERVER_CONFIG_FILE_NAME: &str = "vpnforge-server.toml";

/// Provider settings derived from environment variables and configuration
/// files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VULTR",
    discovery(
        app_name = "vpnforge",
        env_var = "VPNFORGE_CONFIG_PATH",
        config_file_name = "vpnforge.toml",
        dotfile_name = ".vpnforge.toml",
        project_file_name = "vpnforge.toml"
    )
)]
pub struct ProviderConfig {
    /// API key used as the bearer token. This value is required.
    pub api_key: String,
    /// City of the region to deploy into (for example `Amsterdam`).
    pub region: String,
    /// Plan identifier (for example `vc2-1c-1gb`).
    #[ortho_config(default = "vc2-1c-1gb".to_owned())]
    pub plan: String,
    /// Operating system search term (for example `Ubuntu 24.04`).
    #[ortho_config(default = "Ubuntu 24.04".to_owned())]
    pub os: String,
    /// Label attached to the new instance.
    #[ortho_config(default = "vpnforge-gateway".to_owned())]
    pub label: String,
    /// API base URL; overridable for staging endpoints.
    #[ortho_config(default = DEFAULT_API_BASE_URL.to_owned())]
    pub base_url: String,
    /// Seconds to wait between readiness checks.
    #[ortho_config(default = 10)]
    pub poll_interval_secs: u64,
    /// Number of readiness checks before giving up.
    #[ortho_config(default = 30)]
    pub max_poll_attempts: u32,
    /// Template rendered into the server configuration after deployment.
    #[ortho_config(default = "vpnforge-server.toml.template".to_owned())]
    pub server_template_path: String,
    /// Destination of the rendered server configuration.
    #[ortho_config(default = SERVER_CONFIG_FILE_NAME.to_owned())]
    pub server_config_path: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
pub(crate) struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    file_name: &'static str,
}

impl FieldMetadata {
    pub(crate) const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        file_name: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            file_name,
        }
    }
}

/// Rejects empty or whitespace-only values with guidance on where to set them.
pub(crate) fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(missing_field(metadata));
    }
    Ok(())
}

pub(crate) fn missing_field(metadata: &FieldMetadata) -> ConfigError {
    ConfigError::MissingField(format!(
        "missing {}: set {} or add {} to {}",
        metadata.description, metadata.env_var, metadata.toml_key, metadata.file_name
    ))
}

impl ProviderConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("vpnforge")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Builds an [`InstanceRequest`] from the configured values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn as_request(&self) -> Result<InstanceRequest, ConfigError> {
        self.validate()?;
        InstanceRequest::builder()
            .region_city(&self.region)
            .plan_id(&self.plan)
            .os_name(&self.os)
            .label(&self.label)
            .build()
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Builds the readiness poller described by the polling settings.
    #[must_use]
    pub const fn poller(&self) -> ReadinessPoller {
        ReadinessPoller::new(
            Duration::from_secs(self.poll_interval_secs),
            self.max_poll_attempts,
        )
    }

    /// Path of the server configuration template.
    #[must_use]
    pub fn template_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.server_template_path)
    }

    /// Path the rendered server configuration is written to.
    #[must_use]
    pub fn output_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.server_config_path)
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const FILE: &str = "vpnforge.toml";
        require_field(
            &self.api_key,
            &FieldMetadata::new("Vultr API key", "VULTR_API_KEY", "api_key", FILE),
        )?;
        require_field(
            &self.region,
            &FieldMetadata::new("region city", "VULTR_REGION", "region", FILE),
        )?;
        require_field(
            &self.plan,
            &FieldMetadata::new("instance plan", "VULTR_PLAN", "plan", FILE),
        )?;
        require_field(
            &self.os,
            &FieldMetadata::new("operating system", "VULTR_OS", "os", FILE),
        )?;
        require_field(
            &self.label,
            &FieldMetadata::new("instance label", "VULTR_LABEL", "label", FILE),
        )?;
        require_field(
            &self.base_url,
            &FieldMetadata::new("API base URL", "VULTR_BASE_URL", "base_url", FILE),
        )?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value outside its accepted set.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
