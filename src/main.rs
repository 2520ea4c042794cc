//! Binary entry point for the vpnforge CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use vpnforge::{
    DeployError, DeployOrchestrator, InstallConfig, InstallError, InstallReport, InstanceSnapshot,
    OutputSinks, ProviderConfig, ResolvedOffer, ServerConfig, SetupSequencer, SshConnector,
    TemplateError, VultrBackend, VultrBackendError, write_server_config,
};

mod cli;

use cli::Cli;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(#[from] VultrBackendError),
    #[error("deployment failed: {0}")]
    Deploy(#[from] DeployError<VultrBackendError>),
    #[error("server configuration could not be written: {0}")]
    Template(#[from] TemplateError),
    #[error("{0}\nCheck vpnforge-server.toml; the server may not be ready yet.")]
    Install(#[from] InstallError),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            write_error(io::stderr(), &err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Deploy(_) => deploy().await,
        Cli::Install(_) => install().await,
    }
}

async fn deploy() -> Result<(), CliError> {
    let config =
        ProviderConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let request = config
        .as_request()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let backend = VultrBackend::new(&config)?;
    let mut stdout = io::stdout();

    let offer = backend
        .resolve(&request)
        .await
        .map_err(DeployError::Create)?;
    write_offer(&mut stdout, &offer)?;
    let created = backend
        .launch(&offer)
        .await
        .map_err(DeployError::Create)?;
    writeln!(stdout, "Instance creation initiated ({})", created.id)?;

    let outcome = DeployOrchestrator::new(backend, config.poller())
        .await_ready(created)
        .await?;
    let written = write_server_config(
        &config.template_path(),
        &config.output_path(),
        &outcome.instance,
    )?;

    write_instance(&mut stdout, &outcome.instance)?;
    writeln!(stdout, "Connection settings written to {written}")?;
    writeln!(stdout, "Run `vpnforge install` to configure the server.")?;
    Ok(())
}

async fn install() -> Result<(), CliError> {
    let server =
        ServerConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let install =
        InstallConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let working_dir = current_dir()?;

    let sequencer = SetupSequencer::new(SshConnector::new(), &server, &install, &working_dir)
        .map_err(|err| CliError::Config(err.to_string()))?;
    let report = sequencer.install(&mut OutputSinks::stdio()).await?;
    write_report(io::stdout(), &report)?;
    Ok(())
}

fn current_dir() -> Result<Utf8PathBuf, CliError> {
    let cwd = std::env::current_dir().map_err(|err| CliError::Config(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|path| {
        CliError::Config(format!(
            "working directory is not valid UTF-8: {}",
            path.display()
        ))
    })
}

fn write_offer(mut target: impl Write, offer: &ResolvedOffer) -> io::Result<()> {
    writeln!(target, "Deploying new server:")?;
    writeln!(target, "  OS:     {} (id {})", offer.os_name, offer.os_id)?;
    writeln!(target, "  plan:   {} (${:.2}/month)", offer.plan_id, offer.monthly_cost)?;
    writeln!(target, "  region: {} ({})", offer.region_city, offer.region_id)?;
    Ok(())
}

fn write_instance(mut target: impl Write, instance: &InstanceSnapshot) -> io::Result<()> {
    writeln!(target, "Server deployed")?;
    writeln!(target, "  id:      {}", instance.id)?;
    writeln!(target, "  address: {}", instance.main_ip)?;
    writeln!(target, "  status:  {}", instance.status)?;
    if let Some(password) = &instance.default_password {
        writeln!(target, "  Temporary root password: {password}")?;
    }
    Ok(())
}

fn write_report(mut target: impl Write, report: &InstallReport) -> io::Result<()> {
    writeln!(target, "Setup and hardening completed for {}", report.host)?;
    if let Some(path) = &report.client_config {
        writeln!(target, "VPN client configuration saved to {path}")?;
        writeln!(target, "To connect to the VPN:")?;
        writeln!(
            target,
            "  1. Install the official WireGuard app from https://www.wireguard.com/install/"
        )?;
        writeln!(target, "  2. Open the app and click \"Add Tunnel\"")?;
        writeln!(
            target,
            "  3. Import {path}; on a phone, generate a QR code from the file and scan it"
        )?;
        writeln!(target, "  4. Name the connection and toggle it on to activate the VPN")?;
    }
    writeln!(target, "New SSH credentials:")?;
    writeln!(target, "  port:     {}", report.new_ssh_port)?;
    writeln!(target, "  username: {}", report.new_username)?;
    writeln!(target, "  password: {}", report.new_password)?;
    writeln!(target, "Reconnect with: {}", report.reconnect_command())?;
    Ok(())
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
