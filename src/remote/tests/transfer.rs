//! Tests for batch uploads and downloads.

use super::super::*;
use super::fixtures::{Workspace, host, workspace};
use crate::test_support::{LocalConnector, SessionEvent};
use rstest::rstest;

#[rstest]
#[tokio::test]
async fn upload_without_tasks_creates_destination_only(workspace: Workspace) {
    let connector = LocalConnector::new();
    let destination = workspace.path("remote/tmp/setup-scripts");

    let uploaded = host(&connector)
        .upload(&[], destination.as_str())
        .await
        .expect("empty upload should succeed");

    assert_eq!(uploaded, 0);
    assert!(destination.is_dir(), "destination should exist");
    assert_eq!(
        connector.events(),
        vec![
            SessionEvent::TransferOpened,
            SessionEvent::DirectoryCreated(destination.to_string()),
            SessionEvent::TransferClosed,
        ]
    );
}

#[rstest]
#[tokio::test]
async fn upload_stops_at_first_missing_file(workspace: Workspace) {
    let connector = LocalConnector::new();
    let destination = workspace.path("remote/scripts");
    let tasks = [
        FileTransferTask::new(workspace.write("local/common.sh", "echo common"), "common.sh"),
        FileTransferTask::new(workspace.path("local/missing.sh"), "missing.sh"),
        FileTransferTask::new(workspace.write("local/setup.sh", "echo setup"), "setup.sh"),
    ];

    let err = host(&connector)
        .upload(&tasks, destination.as_str())
        .await
        .expect_err("missing file must abort the batch");

    let RemoteError::LocalFileNotFound { path } = err else {
        panic!("expected LocalFileNotFound, got {err:?}");
    };
    assert_eq!(path, workspace.path("local/missing.sh"));
    assert!(destination.join("common.sh").is_file(), "earlier file stays uploaded");
    assert!(!destination.join("setup.sh").exists(), "later file is never uploaded");
    assert_eq!(
        connector.events().last(),
        Some(&SessionEvent::TransferClosed),
        "session closes on failure"
    );
}

#[rstest]
#[tokio::test]
async fn upload_flattens_remote_names(workspace: Workspace) {
    let connector = LocalConnector::new();
    let destination = workspace.path("remote/flat");
    let tasks = [FileTransferTask::new(
        workspace.write("local/harden.sh", "echo harden"),
        "nested/dirs/harden.sh",
    )];

    let uploaded = host(&connector)
        .upload(&tasks, &format!("{destination}/"))
        .await
        .expect("upload should succeed");

    assert_eq!(uploaded, 1);
    let target = destination.join("harden.sh");
    assert_eq!(Workspace::read(&target), "echo harden");
    assert!(!destination.join("nested").exists());
}

#[rstest]
#[tokio::test]
async fn upload_rejects_remote_names_without_file_segment(workspace: Workspace) {
    let connector = LocalConnector::new();
    let tasks = [FileTransferTask::new(
        workspace.write("local/setup.sh", "echo setup"),
        "scripts/",
    )];

    let err = host(&connector)
        .upload(&tasks, workspace.path("remote").as_str())
        .await
        .expect_err("trailing slash has no file name");

    assert!(
        matches!(err, RemoteError::InvalidRemoteName { ref remote_path } if remote_path == "scripts/"),
        "unexpected error: {err:?}"
    );
}

#[rstest]
#[tokio::test]
async fn upload_reports_connection_failures(workspace: Workspace) {
    let connector = LocalConnector::refusing();

    let err = host(&connector)
        .upload(&[], workspace.path("remote").as_str())
        .await
        .expect_err("refused connection must fail");

    assert!(matches!(err, RemoteError::Connection { .. }), "got {err:?}");
    assert!(connector.events().is_empty());
}

#[rstest]
#[tokio::test]
async fn download_creates_local_parent_directories(workspace: Workspace) {
    let connector = LocalConnector::new();
    let remote = workspace.write("remote/etc/wireguard/laptop.conf", "[Interface]");
    let local = workspace.path("local/deep/nested/laptop.conf");

    host(&connector)
        .download(remote.as_str(), &local)
        .await
        .expect("download should succeed");

    assert_eq!(Workspace::read(&local), "[Interface]");
    assert_eq!(
        connector.events(),
        vec![
            SessionEvent::TransferOpened,
            SessionEvent::Get(remote.to_string()),
            SessionEvent::TransferClosed,
        ]
    );
}

#[rstest]
#[tokio::test]
async fn download_of_missing_remote_file_is_a_transfer_error(workspace: Workspace) {
    let connector = LocalConnector::new();
    let remote = workspace.path("remote/etc/wireguard/absent.conf");

    let err = host(&connector)
        .download(remote.as_str(), &workspace.path("local/absent.conf"))
        .await
        .expect_err("missing remote file must fail");

    assert!(matches!(err, RemoteError::Transfer(_)), "got {err:?}");
    assert_eq!(connector.events().last(), Some(&SessionEvent::TransferClosed));
}

#[rstest]
#[case("/tmp/setup-scripts", "setup.sh", "/tmp/setup-scripts/setup.sh")]
#[case("/tmp/setup-scripts/", "setup.sh", "/tmp/setup-scripts/setup.sh")]
#[case("/", "setup.sh", "/setup.sh")]
#[case("relative", "setup.sh", "relative/setup.sh")]
fn remote_join_uses_a_single_separator(
    #[case] directory: &str,
    #[case] file_name: &str,
    #[case] expected: &str,
) {
    assert_eq!(remote_join(directory, file_name), expected);
}
