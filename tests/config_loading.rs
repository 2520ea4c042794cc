//! Layered configuration loading: defaults, discovered files, then
//! environment overrides.

use camino::Utf8PathBuf;
use tempfile::TempDir;
use vpnforge::test_support::EnvGuard;
use vpnforge::{InstallConfig, InstallPlan, ProviderConfig, ServerConfig};

const PROVIDER_VARS: &[&str] = &[
    "VULTR_API_KEY",
    "VULTR_REGION",
    "VULTR_PLAN",
    "VULTR_OS",
    "VULTR_LABEL",
    "VULTR_BASE_URL",
    "VULTR_POLL_INTERVAL_SECS",
    "VULTR_MAX_POLL_ATTEMPTS",
];

const SERVER_VARS: &[&str] = &[
    "VPNFORGE_SERVER_HOST",
    "VPNFORGE_SERVER_PORT",
    "VPNFORGE_SERVER_USERNAME",
    "VPNFORGE_SERVER_PASSWORD",
    "VPNFORGE_SERVER_PRIVATE_KEY_PATH",
    "VPNFORGE_SERVER_NEW_USERNAME",
    "VPNFORGE_SERVER_NEW_PASSWORD",
];

const INSTALL_VARS: &[&str] = &[
    "VPNFORGE_INSTALL_LOCAL_SCRIPT_DIR",
    "VPNFORGE_INSTALL_REMOTE_TEMP_DIR",
    "VPNFORGE_INSTALL_REMOTE_VPN_CONFIG_DIR",
];

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
        Self { _dir: dir, root }
    }

    fn write(&self, name: &str, contents: &str) -> String {
        let path = self.root.join(name);
        std::fs::write(&path, contents).expect("write config file");
        path.into_string()
    }

    /// Environment pairs that hide user-level config files and clear every
    /// variable in `cleared`.
    fn isolated<'a>(
        &'a self,
        cleared: &[&'a str],
        set: &[(&'a str, &'a str)],
    ) -> Vec<(&'a str, Option<&'a str>)> {
        let mut pairs = vec![
            ("HOME", Some(self.root.as_str())),
            ("XDG_CONFIG_HOME", Some(self.root.as_str())),
        ];
        pairs.extend(
            cleared
                .iter()
                .filter(|key| set.iter().all(|(name, _)| name != *key))
                .map(|key| (*key, None)),
        );
        pairs.extend(set.iter().map(|(key, value)| (*key, Some(*value))));
        pairs
    }
}

#[tokio::test]
async fn provider_environment_overrides_file_values() {
    let workspace = Workspace::new();
    let file = workspace.write(
        "provider.toml",
        "api_key = \"from-file\"\nregion = \"Paris\"\nplan = \"vc2-2c-4gb\"\n",
    );
    let mut cleared = PROVIDER_VARS.to_vec();
    cleared.push("VPNFORGE_CONFIG_PATH");
    let pairs = workspace.isolated(
        &cleared,
        &[
            ("VPNFORGE_CONFIG_PATH", file.as_str()),
            ("VULTR_API_KEY", "from-env"),
        ],
    );
    let _guard = EnvGuard::set_vars(&pairs).await;

    let config = ProviderConfig::load_without_cli_args().expect("provider config loads");

    assert_eq!(config.api_key, "from-env");
    assert_eq!(config.region, "Paris");
    assert_eq!(config.plan, "vc2-2c-4gb");
    assert_eq!(config.os, "Ubuntu 24.04");
    assert_eq!(config.max_poll_attempts, 30);
    config.validate().expect("loaded config validates");
}

#[tokio::test]
async fn server_settings_layer_file_then_environment() {
    let workspace = Workspace::new();
    let file = workspace.write(
        "server.toml",
        "host = \"203.0.113.7\"\n\
         password = \"root-pw\"\n\
         new_ssh_port = 2222\n\
         new_username = \"admin\"\n\
         new_password = \"s3cret\"\n\
         alert_email = \"ops@example.com\"\n\
         server_name = \"gateway\"\n",
    );
    let mut cleared = SERVER_VARS.to_vec();
    cleared.push("VPNFORGE_SERVER_CONFIG_PATH");
    let pairs = workspace.isolated(
        &cleared,
        &[
            ("VPNFORGE_SERVER_CONFIG_PATH", file.as_str()),
            ("VPNFORGE_SERVER_USERNAME", "ubuntu"),
        ],
    );
    let _guard = EnvGuard::set_vars(&pairs).await;

    let config = ServerConfig::load_without_cli_args().expect("server config loads");

    assert_eq!(config.host, "203.0.113.7");
    assert_eq!(config.port, 22);
    assert_eq!(config.username, "ubuntu");
    assert_eq!(config.password.as_deref(), Some("root-pw"));
    assert_eq!(config.new_ssh_port, Some(2222));
    assert_eq!(config.new_username, "admin");
}

#[tokio::test]
async fn install_settings_default_and_accept_plan_override() {
    let workspace = Workspace::new();
    let mut cleared = INSTALL_VARS.to_vec();
    cleared.push("VPNFORGE_CONFIG_PATH");
    let pairs = workspace.isolated(&cleared, &[("VPNFORGE_INSTALL_SETUP_PLAN", "setup-only")]);
    let _guard = EnvGuard::set_vars(&pairs).await;

    let config = InstallConfig::load_without_cli_args().expect("install config loads");

    assert_eq!(config.local_script_dir, "scripts");
    assert_eq!(
        config.script_files,
        ["common.sh", "harden.sh", "setup.sh", "wireguard.sh"]
    );
    assert_eq!(config.plan().expect("known plan"), InstallPlan::SetupOnly);
}
