//! Remote command construction for the install steps.
//!
//! Every value interpolated into a command is shell-quoted; literal command
//! fragments are not.

use std::borrow::Cow;

use shell_escape::unix::escape;

use super::config::InstallPlan;

/// Values the setup and hardening scripts are invoked with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ScriptArguments<'a> {
    pub(crate) host: &'a str,
    pub(crate) client_name: Option<&'a str>,
    pub(crate) new_ssh_port: u16,
    pub(crate) new_username: &'a str,
    pub(crate) new_password: &'a str,
    pub(crate) alert_email: &'a str,
    pub(crate) server_name: &'a str,
}

fn quote(value: &str) -> Cow<'_, str> {
    escape(Cow::Borrowed(value))
}

fn change_directory(remote_dir: &str) -> String {
    format!("cd {}", quote(remote_dir))
}

fn hardening_flags(args: &ScriptArguments<'_>) -> String {
    format!(
        "--port {} --username {} --password {} --email {} --server-name {}",
        args.new_ssh_port,
        quote(args.new_username),
        quote(args.new_password),
        quote(args.alert_email),
        quote(args.server_name),
    )
}

/// Commands that make the uploaded scripts executable and run the setup
/// script with the plan's argument contract.
pub(crate) fn setup_commands(
    plan: InstallPlan,
    remote_dir: &str,
    args: &ScriptArguments<'_>,
) -> Vec<String> {
    let setup = match plan {
        InstallPlan::WithVpnDownload => format!(
            "./setup.sh --ip {} --client {}",
            quote(args.host),
            quote(args.client_name.unwrap_or_default()),
        ),
        InstallPlan::SetupOnly => format!("./setup.sh {}", hardening_flags(args)),
    };
    vec![
        change_directory(remote_dir),
        String::from("chmod +x *.sh"),
        setup,
    ]
}

/// Commands that run the hardening script.
pub(crate) fn hardening_commands(remote_dir: &str, args: &ScriptArguments<'_>) -> Vec<String> {
    vec![
        change_directory(remote_dir),
        format!("./harden.sh {}", hardening_flags(args)),
    ]
}

/// Remote location of the generated client configuration.
pub(crate) fn remote_client_config(remote_vpn_dir: &str, client_name: &str) -> String {
    crate::remote::remote_join(remote_vpn_dir, &format!("{client_name}.conf"))
}
