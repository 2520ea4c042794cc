//! Install workflow: ship the setup scripts, run them, and fetch the client
//! configuration.
//!
//! [`SetupSequencer`] runs its steps strictly in order and stops at the first
//! failure. Nothing done on the host before the failure is rolled back.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::info;

use crate::config::ConfigError;
use crate::remote::{FileTransferTask, RemoteError, RemoteHost};
use crate::session::{Connector, OutputSinks};

mod commands;
mod config;

use commands::{ScriptArguments, hardening_commands, remote_client_config, setup_commands};
pub use config::{
    DEFAULT_REMOTE_TEMP_DIR, DEFAULT_REMOTE_VPN_CONFIG_DIR, InstallConfig, InstallPlan,
    ServerConfig,
};

/// One step of the install workflow.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstallStep {
    /// Upload the scripts.
    Upload,
    /// Make the scripts executable and run the setup script.
    Setup,
    /// Download the generated client configuration.
    DownloadClientConfig,
    /// Run the hardening script.
    Harden,
}

impl InstallStep {
    /// Progress banner describing the step.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Upload => "Uploading setup scripts",
            Self::Setup => "Executing server setup",
            Self::DownloadClientConfig => "Downloading generated client config",
            Self::Harden => "Executing server hardening",
        }
    }
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl InstallPlan {
    /// Steps the plan runs, in order.
    #[must_use]
    pub const fn steps(self) -> &'static [InstallStep] {
        match self {
            Self::WithVpnDownload => &[
                InstallStep::Upload,
                InstallStep::Setup,
                InstallStep::DownloadClientConfig,
                InstallStep::Harden,
            ],
            Self::SetupOnly => &[
                InstallStep::Upload,
                InstallStep::Setup,
                InstallStep::Harden,
            ],
        }
    }
}

/// Failure of one install step.
#[derive(Debug, Error)]
#[error("install step '{step}' failed: {source}")]
pub struct InstallError {
    /// Step that failed.
    pub step: InstallStep,
    /// Underlying remote error.
    #[source]
    pub source: RemoteError,
}

/// Summary of a completed install.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstallReport {
    /// Plan that ran.
    pub plan: InstallPlan,
    /// Address of the server.
    pub host: String,
    /// Local location of the downloaded client configuration.
    pub client_config: Option<Utf8PathBuf>,
    /// SSH port after hardening.
    pub new_ssh_port: u16,
    /// Restricted user created by hardening.
    pub new_username: String,
    /// Password of the restricted user.
    pub new_password: String,
}

impl InstallReport {
    /// Command that reconnects with the hardened credentials.
    #[must_use]
    pub fn reconnect_command(&self) -> String {
        format!(
            "ssh {}@{} -p {}",
            self.new_username, self.host, self.new_ssh_port
        )
    }
}

/// Runs the install workflow against one host.
#[derive(Debug)]
pub struct SetupSequencer<C: Connector> {
    host: RemoteHost<C>,
    plan: InstallPlan,
    tasks: Vec<FileTransferTask>,
    remote_temp_dir: String,
    client_config: Option<(String, Utf8PathBuf)>,
    new_ssh_port: u16,
    new_username: String,
    new_password: String,
    alert_email: String,
    server_name: String,
    client_name: Option<String>,
}

impl<C: Connector> SetupSequencer<C> {
    /// Validates both configurations and prepares the workflow. Local script
    /// paths and the downloaded client config resolve against `working_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when either configuration is incomplete or
    /// inconsistent.
    pub fn new(
        connector: C,
        server: &ServerConfig,
        install: &InstallConfig,
        working_dir: &Utf8Path,
    ) -> Result<Self, ConfigError> {
        install.validate()?;
        let plan = install.plan()?;
        server.validate(plan)?;
        let params = server.connection_parameters()?;

        let script_dir = install.script_dir(working_dir);
        let tasks = install
            .script_files
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(|name| FileTransferTask::new(script_dir.join(name), name))
            .collect();

        let client_name = server.vpn_client_name().ok().map(str::to_owned);
        let client_config = match plan {
            InstallPlan::WithVpnDownload => client_name.as_deref().map(|name| {
                (
                    remote_client_config(&install.remote_vpn_config_dir, name),
                    working_dir.join(format!("{name}.conf")),
                )
            }),
            InstallPlan::SetupOnly => None,
        };

        Ok(Self {
            host: RemoteHost::new(connector, params),
            plan,
            tasks,
            remote_temp_dir: install.remote_temp_dir.trim().to_owned(),
            client_config,
            new_ssh_port: server.hardening_port()?,
            new_username: server.new_username.trim().to_owned(),
            new_password: server.new_password.clone(),
            alert_email: server.alert_email.trim().to_owned(),
            server_name: server.server_name.trim().to_owned(),
            client_name,
        })
    }

    /// Plan this sequencer runs.
    #[must_use]
    pub const fn plan(&self) -> InstallPlan {
        self.plan
    }

    /// Files uploaded by the first step.
    #[must_use]
    pub fn tasks(&self) -> &[FileTransferTask] {
        &self.tasks
    }

    /// Runs every step of the plan in order, streaming remote output to
    /// `sinks`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError`] naming the first step that failed; later
    /// steps are not attempted.
    pub async fn install(&self, sinks: &mut OutputSinks) -> Result<InstallReport, InstallError> {
        let steps = self.plan.steps();
        info!(
            host = self.host.params().host(),
            plan = %self.plan,
            "starting server setup and hardening"
        );

        let mut client_config = None;
        for (index, step) in steps.iter().enumerate() {
            info!("[Step {}/{}] {step}...", index + 1, steps.len());
            self.run_step(*step, sinks, &mut client_config)
                .await
                .map_err(|source| InstallError {
                    step: *step,
                    source,
                })?;
        }

        info!("setup and hardening completed");
        Ok(InstallReport {
            plan: self.plan,
            host: self.host.params().host().to_owned(),
            client_config,
            new_ssh_port: self.new_ssh_port,
            new_username: self.new_username.clone(),
            new_password: self.new_password.clone(),
        })
    }

    async fn run_step(
        &self,
        step: InstallStep,
        sinks: &mut OutputSinks,
        client_config: &mut Option<Utf8PathBuf>,
    ) -> Result<(), RemoteError> {
        match step {
            InstallStep::Upload => {
                self.host.upload(&self.tasks, &self.remote_temp_dir).await?;
            }
            InstallStep::Setup => {
                let commands = setup_commands(self.plan, &self.remote_temp_dir, &self.arguments());
                self.host.run(&commands, sinks).await?;
            }
            InstallStep::DownloadClientConfig => {
                if let Some((remote, local)) = &self.client_config {
                    self.host.download(remote, local).await?;
                    *client_config = Some(local.clone());
                }
            }
            InstallStep::Harden => {
                let commands = hardening_commands(&self.remote_temp_dir, &self.arguments());
                self.host.run(&commands, sinks).await?;
            }
        }
        Ok(())
    }

    fn arguments(&self) -> ScriptArguments<'_> {
        ScriptArguments {
            host: self.host.params().host(),
            client_name: self.client_name.as_deref(),
            new_ssh_port: self.new_ssh_port,
            new_username: &self.new_username,
            new_password: &self.new_password,
            alert_email: &self.alert_email,
            server_name: &self.server_name,
        }
    }
}

#[cfg(test)]
mod tests;
