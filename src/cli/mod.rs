//! Command-line interface definitions for the `vpnforge` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `vpnforge` binary.
#[derive(Debug, Parser)]
#[command(
    name = "vpnforge",
    about = "Provision a Vultr server and install a hardened VPN gateway on it",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create a server and render its connection settings.
    #[command(
        name = "deploy",
        about = "Create a Vultr server and write vpnforge-server.toml"
    )]
    Deploy(DeployCommand),
    /// Upload setup scripts, run them, and harden the server.
    #[command(
        name = "install",
        about = "Upload setup scripts, configure the VPN, and harden SSH"
    )]
    Install(InstallCommand),
}

/// Arguments for the `vpnforge deploy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DeployCommand {}

/// Arguments for the `vpnforge install` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct InstallCommand {}
