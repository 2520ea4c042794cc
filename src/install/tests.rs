//! Unit tests for the install workflow.

use super::*;
use crate::test_support::{CapturedOutput, LocalConnector, SessionEvent};
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct Host {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Host {
    fn local(&self) -> Utf8PathBuf {
        self.root.join("local")
    }

    fn remote_temp_dir(&self) -> Utf8PathBuf {
        self.root.join("remote/tmp/setup-scripts")
    }

    fn remote_vpn_dir(&self) -> Utf8PathBuf {
        self.root.join("remote/etc/wireguard")
    }

    fn write_script(&self, name: &str, body: &str) {
        let dir = self.local().join("scripts");
        std::fs::create_dir_all(&dir).expect("create script dir");
        std::fs::write(dir.join(name), format!("#!/bin/sh\n{body}\n")).expect("write script");
    }

    fn write_default_scripts(&self) {
        self.write_script("common.sh", "true");
        self.write_script("wireguard.sh", "true");
        self.write_script(
            "setup.sh",
            &format!(
                "echo \"setup $*\" >> calls.log\n\
                 mkdir -p {vpn}\n\
                 echo \"[Interface] # $4\" > {vpn}/$4.conf\n\
                 echo setup done",
                vpn = self.remote_vpn_dir()
            ),
        );
        self.write_script("harden.sh", "echo \"harden $*\" >> calls.log");
    }

    fn calls(&self) -> String {
        std::fs::read_to_string(self.remote_temp_dir().join("calls.log")).unwrap_or_default()
    }

    fn install_config(&self, plan: InstallPlan) -> InstallConfig {
        InstallConfig {
            script_files: ["common.sh", "harden.sh", "setup.sh", "wireguard.sh"]
                .map(String::from)
                .to_vec(),
            local_script_dir: String::from("scripts"),
            remote_temp_dir: self.remote_temp_dir().to_string(),
            remote_vpn_config_dir: self.remote_vpn_dir().to_string(),
            setup_plan: plan.to_string(),
        }
    }
}

#[fixture]
fn host() -> Host {
    let dir = TempDir::new().expect("create temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
    Host { _dir: dir, root }
}

#[fixture]
fn server() -> ServerConfig {
    ServerConfig {
        host: String::from("203.0.113.7"),
        port: 22,
        username: String::from("root"),
        password: Some(String::from("temporary-root")),
        private_key_path: None,
        private_key_passphrase: None,
        new_ssh_port: Some(2222),
        new_username: String::from("admin"),
        new_password: String::from("s3cret"),
        alert_email: String::from("ops@example.com"),
        server_name: String::from("edge gateway"),
        client_name: Some(String::from("laptop")),
    }
}

fn sequencer(
    connector: &LocalConnector,
    server: &ServerConfig,
    host: &Host,
    plan: InstallPlan,
) -> SetupSequencer<LocalConnector> {
    SetupSequencer::new(
        connector.clone(),
        server,
        &host.install_config(plan),
        &host.local(),
    )
    .expect("configuration should validate")
}

#[rstest]
#[tokio::test]
async fn vpn_plan_runs_every_step_in_order(host: Host, server: ServerConfig) {
    host.write_default_scripts();
    let connector = LocalConnector::new();
    let mut output = CapturedOutput::new();

    let report = sequencer(&connector, &server, &host, InstallPlan::WithVpnDownload)
        .install(&mut output.sinks)
        .await
        .expect("install should succeed");

    let local_conf = host.local().join("laptop.conf");
    assert_eq!(report.client_config.as_ref(), Some(&local_conf));
    assert_eq!(
        std::fs::read_to_string(&local_conf).expect("client config downloaded"),
        "[Interface] # laptop\n"
    );
    assert_eq!(report.reconnect_command(), "ssh admin@203.0.113.7 -p 2222");
    assert!(output.stdout.contents().contains("setup done"));

    let calls = host.calls();
    assert_eq!(
        calls,
        "setup --ip 203.0.113.7 --client laptop\n\
         harden --port 2222 --username admin --password s3cret --email ops@example.com \
         --server-name edge gateway\n"
    );

    let kinds: Vec<&str> = connector
        .events()
        .iter()
        .map(|event| match event {
            SessionEvent::TransferOpened => "transfer",
            SessionEvent::ShellOpened => "shell",
            SessionEvent::Get(_) => "get",
            SessionEvent::TransferClosed | SessionEvent::ShellClosed => "close",
            _ => "",
        })
        .filter(|kind| !kind.is_empty())
        .collect();
    assert_eq!(
        kinds,
        ["transfer", "close", "shell", "close", "transfer", "get", "close", "shell", "close"]
    );
}

#[rstest]
#[tokio::test]
async fn setup_only_plan_passes_hardening_flags_to_setup(host: Host, server: ServerConfig) {
    host.write_default_scripts();
    let connector = LocalConnector::new();
    let mut output = CapturedOutput::new();

    let report = sequencer(&connector, &server, &host, InstallPlan::SetupOnly)
        .install(&mut output.sinks)
        .await
        .expect("install should succeed");

    assert_eq!(report.client_config, None);
    let first_call = host.calls().lines().next().map(str::to_owned);
    assert_eq!(
        first_call.as_deref(),
        Some(
            "setup --port 2222 --username admin --password s3cret --email ops@example.com \
             --server-name edge gateway"
        )
    );
    assert!(
        !connector
            .events()
            .iter()
            .any(|event| matches!(event, SessionEvent::Get(_))),
        "setup-only plan never downloads"
    );
}

#[rstest]
#[tokio::test]
async fn failing_setup_aborts_remaining_steps(host: Host, server: ServerConfig) {
    host.write_default_scripts();
    host.write_script("setup.sh", "echo broken >&2\nexit 3");
    let connector = LocalConnector::new();
    let mut output = CapturedOutput::new();

    let err = sequencer(&connector, &server, &host, InstallPlan::WithVpnDownload)
        .install(&mut output.sinks)
        .await
        .expect_err("setup failure must abort");

    assert_eq!(err.step, InstallStep::Setup);
    assert!(
        matches!(err.source, RemoteError::CommandFailed { code: 3 }),
        "got {:?}",
        err.source
    );
    assert!(output.stderr.contents().contains("broken"));
    assert!(!host.calls().contains("harden"));
    assert!(!host.local().join("laptop.conf").exists());
}

#[rstest]
#[tokio::test]
async fn missing_script_fails_the_upload_step(host: Host, server: ServerConfig) {
    host.write_default_scripts();
    std::fs::remove_file(host.local().join("scripts/setup.sh")).expect("remove script");
    let connector = LocalConnector::new();
    let mut output = CapturedOutput::new();

    let err = sequencer(&connector, &server, &host, InstallPlan::WithVpnDownload)
        .install(&mut output.sinks)
        .await
        .expect_err("missing script must abort");

    assert_eq!(err.step, InstallStep::Upload);
    assert!(matches!(err.source, RemoteError::LocalFileNotFound { .. }));
    assert!(
        !connector
            .events()
            .contains(&SessionEvent::ShellOpened),
        "no command runs after a failed upload"
    );
}

#[rstest]
fn upload_tasks_resolve_against_script_dir(host: Host, server: ServerConfig) {
    let connector = LocalConnector::new();
    let seq = sequencer(&connector, &server, &host, InstallPlan::WithVpnDownload);

    let first = seq.tasks().first().expect("tasks are built");
    assert_eq!(first.local_path, host.local().join("scripts/common.sh"));
    assert_eq!(first.remote_path, "common.sh");
    assert_eq!(seq.tasks().len(), 4);
}

#[rstest]
fn both_credentials_are_rejected(server: ServerConfig) {
    let cfg = ServerConfig {
        private_key_path: Some(String::from("/keys/id_ed25519")),
        ..server
    };

    let err = cfg
        .connection_parameters()
        .expect_err("password and key together must fail");
    assert!(matches!(err, ConfigError::Invalid(_)), "got {err:?}");
}

#[rstest]
fn missing_credentials_are_rejected(server: ServerConfig) {
    let cfg = ServerConfig {
        password: Some(String::from("   ")),
        ..server
    };

    let err = cfg
        .connection_parameters()
        .expect_err("no credential must fail");
    let ConfigError::MissingField(message) = err else {
        panic!("expected MissingField, got {err:?}");
    };
    assert!(message.contains("VPNFORGE_SERVER_PASSWORD"), "message: {message}");
}

#[rstest]
fn private_key_selects_key_authentication(server: ServerConfig) {
    let cfg = ServerConfig {
        password: None,
        private_key_path: Some(String::from("/keys/id_ed25519")),
        private_key_passphrase: Some(String::from("phrase")),
        ..server
    };

    let params = cfg.connection_parameters().expect("key auth is valid");
    assert_eq!(
        params.auth(),
        &crate::session::AuthMethod::PrivateKey {
            path: Utf8PathBuf::from("/keys/id_ed25519"),
            passphrase: Some(String::from("phrase")),
        }
    );
}

#[rstest]
fn vpn_plan_requires_client_name(server: ServerConfig) {
    let cfg = ServerConfig {
        client_name: None,
        ..server
    };

    assert!(matches!(
        cfg.validate(InstallPlan::WithVpnDownload),
        Err(ConfigError::MissingField(_))
    ));
    assert_eq!(cfg.validate(InstallPlan::SetupOnly), Ok(()));
}

#[rstest]
#[case(None)]
#[case(Some(0))]
fn hardening_port_must_be_set_and_non_zero(server: ServerConfig, #[case] port: Option<u16>) {
    let cfg = ServerConfig {
        new_ssh_port: port,
        ..server
    };
    assert!(cfg.validate(InstallPlan::SetupOnly).is_err());
}

#[rstest]
#[case("with-vpn-download", InstallPlan::WithVpnDownload)]
#[case("Setup-Only", InstallPlan::SetupOnly)]
fn plan_names_parse(#[case] name: &str, #[case] expected: InstallPlan) {
    assert_eq!(name.parse::<InstallPlan>(), Ok(expected));
}

#[test]
fn unknown_plan_is_invalid() {
    assert!(matches!(
        "vpn-only".parse::<InstallPlan>(),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn script_arguments_are_shell_quoted() {
    let args = ScriptArguments {
        host: "203.0.113.7",
        client_name: Some("laptop"),
        new_ssh_port: 2222,
        new_username: "admin",
        new_password: "pa ss'word",
        alert_email: "ops@example.com",
        server_name: "edge gateway",
    };

    let harden = hardening_commands("/tmp/setup scripts", &args);
    assert_eq!(
        harden,
        [
            String::from("cd '/tmp/setup scripts'"),
            String::from(
                "./harden.sh --port 2222 --username admin --password 'pa ss'\\''word' \
                 --email 'ops@example.com' --server-name 'edge gateway'"
            ),
        ]
    );

    let setup = setup_commands(InstallPlan::WithVpnDownload, "/tmp/setup-scripts", &args);
    assert_eq!(
        setup.last().map(String::as_str),
        Some("./setup.sh --ip 203.0.113.7 --client laptop")
    );
}

#[test]
fn client_config_lives_in_the_vpn_directory() {
    assert_eq!(
        remote_client_config("/etc/wireguard/", "laptop"),
        "/etc/wireguard/laptop.conf"
    );
}
