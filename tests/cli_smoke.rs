//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use rstest::rstest;
use tempfile::TempDir;

const CONFIG_VARS: &[&str] = &[
    "VULTR_API_KEY",
    "VULTR_REGION",
    "VPNFORGE_CONFIG_PATH",
    "VPNFORGE_SERVER_CONFIG_PATH",
    "VPNFORGE_SERVER_HOST",
    "VPNFORGE_SERVER_PASSWORD",
    "VPNFORGE_SERVER_PRIVATE_KEY_PATH",
    "VPNFORGE_INSTALL_CONFIG_PATH",
];

fn isolated(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("vpnforge");
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env("RUST_LOG", "off");
    for var in CONFIG_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_subcommands() {
    cargo_bin_cmd!("vpnforge")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy").and(predicate::str::contains("install")));
}

#[test]
fn missing_subcommand_prints_usage() {
    cargo_bin_cmd!("vpnforge")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn unknown_subcommand_is_rejected() {
    cargo_bin_cmd!("vpnforge")
        .arg("teleport")
        .assert()
        .failure()
        .stderr(predicate::str::contains("teleport"));
}

#[rstest]
#[case("deploy")]
#[case("install")]
fn unconfigured_commands_report_configuration_errors(#[case] command: &str) {
    let dir = TempDir::new().expect("create temp dir");

    isolated(&dir)
        .arg(command)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("configuration"));
}
