//! Behavioural test for the deploy workflow through the public API.

use std::time::Duration;

use camino::Utf8PathBuf;
use tempfile::TempDir;
use vpnforge::backend::UNASSIGNED_ADDRESS;
use vpnforge::test_support::{ScriptedBackend, snapshot};
use vpnforge::{DeployOrchestrator, InstanceRequest, InstanceSnapshot, ReadinessPoller};

#[tokio::test(start_paused = true)]
async fn deploy_renders_connection_settings_for_ready_server() {
    let dir = TempDir::new().expect("create temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
    let template = root.join("vpnforge-server.toml.template");
    std::fs::write(
        &template,
        "host = \"%IP%\"\npassword = \"%ROOT_PASSWORD%\"\nnew_password = \"%NEW_USER_PASSWORD%\"\n",
    )
    .expect("write template");

    let backend = ScriptedBackend::new(InstanceSnapshot {
        default_password: Some(String::from("root-pw")),
        ..snapshot("inst-1", "pending", UNASSIGNED_ADDRESS)
    });
    backend.push_snapshot(snapshot("inst-1", "pending", UNASSIGNED_ADDRESS));
    backend.push_snapshot(snapshot("inst-1", "active", "198.51.100.4"));

    let request = InstanceRequest::builder()
        .region_city("Frankfurt")
        .plan_id("vc2-1c-1gb")
        .os_name("Ubuntu 24.04")
        .label("vpnforge-gateway")
        .build()
        .expect("request should validate");
    let poller = ReadinessPoller::new(Duration::from_secs(5), 3);

    let outcome = DeployOrchestrator::new(backend, poller)
        .deploy(&request)
        .await
        .expect("deploy should succeed");
    let output = root.join("vpnforge-server.toml");
    vpnforge::write_server_config(&template, &output, &outcome.instance)
        .expect("render server config");

    let rendered = std::fs::read_to_string(&output).expect("read rendered config");
    let mut lines = rendered.lines();
    assert_eq!(lines.next(), Some("host = \"198.51.100.4\""));
    assert_eq!(lines.next(), Some("password = \"root-pw\""));
    let new_password = lines
        .next()
        .and_then(|line| line.strip_prefix("new_password = \""))
        .and_then(|rest| rest.strip_suffix('"'))
        .expect("new password line");
    assert_eq!(new_password.len(), 32);
}
