//! Server and install configuration loaded via `ortho-config`.
//!
//! [`ServerConfig`] describes the provisioned host and is normally read from
//! the file `deploy` renders. [`InstallConfig`] describes which scripts to
//! ship and what to do with them.

use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::config::{ConfigError, FieldMetadata, SERVER_CONFIG_FILE_NAME, missing_field, require_field};
use crate::session::{AuthMethod, ConnectionParameters};

/// Default remote directory receiving the uploaded scripts.
pub const DEFAULT_REMOTE_TEMP_DIR: &str = "/tmp/setup-scripts";

/// Default remote directory holding generated `WireGuard` client configs.
pub const DEFAULT_REMOTE_VPN_CONFIG_DIR: &str = "/etc/wireguard";

const INSTALL_FILE: &str = "vpnforge.toml";

/// Which variant of the install workflow to run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum InstallPlan {
    /// Set up `WireGuard`, download the client config, then harden.
    #[default]
    WithVpnDownload,
    /// Run the setup script with the hardening parameters only.
    SetupOnly,
}

impl InstallPlan {
    /// Configuration spelling of the plan.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WithVpnDownload => "with-vpn-download",
            Self::SetupOnly => "setup-only",
        }
    }
}

impl fmt::Display for InstallPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallPlan {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "with-vpn-download" => Ok(Self::WithVpnDownload),
            "setup-only" => Ok(Self::SetupOnly),
            other => Err(ConfigError::Invalid(format!(
                "unknown setup plan '{other}': expected 'with-vpn-download' or 'setup-only' \
                 (VPNFORGE_INSTALL_SETUP_PLAN or setup_plan in {INSTALL_FILE})"
            ))),
        }
    }
}

/// Connection and hardening settings for the provisioned server.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VPNFORGE_SERVER",
    discovery(
        app_name = "vpnforge",
        env_var = "VPNFORGE_SERVER_CONFIG_PATH",
        config_file_name = "vpnforge-server.toml",
        dotfile_name = ".vpnforge-server.toml",
        project_file_name = "vpnforge-server.toml"
    )
)]
pub struct ServerConfig {
    /// Address of the server.
    pub host: String,
    /// SSH port used for the initial connection.
    #[ortho_config(default = 22)]
    pub port: u16,
    /// User for the initial connection.
    #[ortho_config(default = "root".to_owned())]
    pub username: String,
    /// Password for the initial connection. Mutually exclusive with
    /// `private_key_path`.
    pub password: Option<String>,
    /// Private key for the initial connection. Mutually exclusive with
    /// `password`.
    pub private_key_path: Option<String>,
    /// Passphrase protecting the private key.
    pub private_key_passphrase: Option<String>,
    /// SSH port the hardening script moves the daemon to.
    pub new_ssh_port: Option<u16>,
    /// Restricted user created by the hardening script.
    pub new_username: String,
    /// Password for the restricted user.
    pub new_password: String,
    /// Address receiving security alerts.
    pub alert_email: String,
    /// Human-readable server name used in alerts.
    pub server_name: String,
    /// Name of the `WireGuard` client whose config is generated. Required
    /// for the VPN plan.
    pub client_name: Option<String>,
}

fn server_field(
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
) -> FieldMetadata {
    FieldMetadata::new(description, env_var, toml_key, SERVER_CONFIG_FILE_NAME)
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|text| !text.trim().is_empty())
}

impl ServerConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("vpnforge")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Builds the parameters for the initial connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the host, username, or both
    /// credentials are missing, and [`ConfigError::Invalid`] when both a
    /// password and a private key are configured.
    pub fn connection_parameters(&self) -> Result<ConnectionParameters, ConfigError> {
        require_field(
            &self.host,
            &server_field("server address", "VPNFORGE_SERVER_HOST", "host"),
        )?;
        require_field(
            &self.username,
            &server_field("SSH username", "VPNFORGE_SERVER_USERNAME", "username"),
        )?;

        let password = non_blank(self.password.as_ref());
        let key_path = non_blank(self.private_key_path.as_ref());
        let auth = match (password, key_path) {
            (Some(pw), None) => AuthMethod::Password(pw.to_owned()),
            (None, Some(path)) => AuthMethod::PrivateKey {
                path: Utf8PathBuf::from(path),
                passphrase: non_blank(self.private_key_passphrase.as_ref()).map(str::to_owned),
            },
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(format!(
                    "both password and private_key_path are set in {SERVER_CONFIG_FILE_NAME}; \
                     configure exactly one"
                )));
            }
            (None, None) => {
                return Err(missing_field(&server_field(
                    "SSH credential",
                    "VPNFORGE_SERVER_PASSWORD or VPNFORGE_SERVER_PRIVATE_KEY_PATH",
                    "password or private_key_path",
                )));
            }
        };

        Ok(ConnectionParameters::new(
            self.host.trim(),
            self.port,
            self.username.trim(),
            auth,
        ))
    }

    /// Performs semantic validation of the fields the given plan needs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first missing or conflicting
    /// field.
    pub fn validate(&self, plan: InstallPlan) -> Result<(), ConfigError> {
        self.connection_parameters()?;
        self.hardening_port()?;
        require_field(
            &self.new_username,
            &server_field("new SSH user", "VPNFORGE_SERVER_NEW_USERNAME", "new_username"),
        )?;
        require_field(
            &self.new_password,
            &server_field(
                "new SSH user password",
                "VPNFORGE_SERVER_NEW_PASSWORD",
                "new_password",
            ),
        )?;
        require_field(
            &self.alert_email,
            &server_field("alert email", "VPNFORGE_SERVER_ALERT_EMAIL", "alert_email"),
        )?;
        require_field(
            &self.server_name,
            &server_field("server name", "VPNFORGE_SERVER_SERVER_NAME", "server_name"),
        )?;
        if plan == InstallPlan::WithVpnDownload {
            self.vpn_client_name()?;
        }
        Ok(())
    }

    /// SSH port the hardening script switches to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when unset and
    /// [`ConfigError::Invalid`] when zero.
    pub fn hardening_port(&self) -> Result<u16, ConfigError> {
        match self.new_ssh_port {
            Some(0) => Err(ConfigError::Invalid(String::from(
                "new_ssh_port must be between 1 and 65535",
            ))),
            Some(port) => Ok(port),
            None => Err(missing_field(&server_field(
                "new SSH port",
                "VPNFORGE_SERVER_NEW_SSH_PORT",
                "new_ssh_port",
            ))),
        }
    }

    /// `WireGuard` client name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when unset or blank.
    pub fn vpn_client_name(&self) -> Result<&str, ConfigError> {
        non_blank(self.client_name.as_ref())
            .map(str::trim)
            .ok_or_else(|| {
                missing_field(&server_field(
                    "VPN client name",
                    "VPNFORGE_SERVER_CLIENT_NAME",
                    "client_name",
                ))
            })
    }
}

/// Script locations and workflow selection for `install`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VPNFORGE_INSTALL",
    discovery(
        app_name = "vpnforge",
        env_var = "VPNFORGE_CONFIG_PATH",
        config_file_name = "vpnforge.toml",
        dotfile_name = ".vpnforge.toml",
        project_file_name = "vpnforge.toml"
    )
)]
pub struct InstallConfig {
    /// Script file names, relative to `local_script_dir`, uploaded in order.
    #[ortho_config(default = vec![
        "common.sh".to_owned(),
        "harden.sh".to_owned(),
        "setup.sh".to_owned(),
        "wireguard.sh".to_owned(),
    ])]
    pub script_files: Vec<String>,
    /// Local directory holding the scripts, relative to the working directory.
    #[ortho_config(default = "scripts".to_owned())]
    pub local_script_dir: String,
    /// Remote directory receiving the scripts.
    #[ortho_config(default = DEFAULT_REMOTE_TEMP_DIR.to_owned())]
    pub remote_temp_dir: String,
    /// Remote directory the setup script writes client configs into.
    #[ortho_config(default = DEFAULT_REMOTE_VPN_CONFIG_DIR.to_owned())]
    pub remote_vpn_config_dir: String,
    /// Workflow variant: `with-vpn-download` or `setup-only`.
    #[ortho_config(default = "with-vpn-download".to_owned())]
    pub setup_plan: String,
}

impl InstallConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("vpnforge")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Parsed workflow variant.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown plan name.
    pub fn plan(&self) -> Result<InstallPlan, ConfigError> {
        self.setup_plan.parse()
    }

    /// Directory holding the local scripts, resolved against `working_dir`.
    #[must_use]
    pub fn script_dir(&self, working_dir: &Utf8Path) -> Utf8PathBuf {
        working_dir.join(&self.local_script_dir)
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required field is empty or the plan is
    /// unknown.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.script_files.iter().all(|name| name.trim().is_empty()) {
            return Err(missing_field(&FieldMetadata::new(
                "script files",
                "VPNFORGE_INSTALL_SCRIPT_FILES",
                "script_files",
                INSTALL_FILE,
            )));
        }
        require_field(
            &self.local_script_dir,
            &FieldMetadata::new(
                "local script directory",
                "VPNFORGE_INSTALL_LOCAL_SCRIPT_DIR",
                "local_script_dir",
                INSTALL_FILE,
            ),
        )?;
        require_field(
            &self.remote_temp_dir,
            &FieldMetadata::new(
                "remote script directory",
                "VPNFORGE_INSTALL_REMOTE_TEMP_DIR",
                "remote_temp_dir",
                INSTALL_FILE,
            ),
        )?;
        require_field(
            &self.remote_vpn_config_dir,
            &FieldMetadata::new(
                "remote VPN config directory",
                "VPNFORGE_INSTALL_REMOTE_VPN_CONFIG_DIR",
                "remote_vpn_config_dir",
                INSTALL_FILE,
            ),
        )?;
        self.plan().map(|_| ())
    }
}
