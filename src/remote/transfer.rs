//! Batch uploads and single-file downloads over a transfer session.

use camino::Utf8Path;
use tracing::{debug, info};

use super::{FileTransferTask, RemoteError, RemoteHost, ensure_local_file, remote_join, settle};
use crate::session::{Connector, SessionError, TransferSession};

impl<C: Connector> RemoteHost<C> {
    /// Uploads `tasks` into `destination_dir`, creating it first.
    ///
    /// Each file lands in `destination_dir` under the final segment of its
    /// remote name. Tasks run in order and the first failure aborts the
    /// rest; files copied before the failure stay on the host. Returns the
    /// number of files uploaded.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::LocalFileNotFound`] for a missing local file,
    /// [`RemoteError::Connection`] when no session can be opened, and
    /// [`RemoteError::Transfer`] for failures during the transfer itself.
    pub async fn upload(
        &self,
        tasks: &[FileTransferTask],
        destination_dir: &str,
    ) -> Result<usize, RemoteError> {
        let mut session = self
            .connector
            .open_transfer(&self.params)
            .await
            .map_err(|source| self.connection_error(source))?;
        let outcome = upload_batch(&mut session, tasks, destination_dir).await;
        let closed = session.close().await;
        debug!(host = self.params.host(), "transfer session closed");
        settle(outcome, closed)
    }

    /// Downloads `remote_path` to `local_path`, creating local parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Connection`] when no session can be opened and
    /// [`RemoteError::Transfer`] when the file cannot be retrieved or
    /// written locally.
    pub async fn download(&self, remote_path: &str, local_path: &Utf8Path) -> Result<(), RemoteError> {
        if let Some(parent) = local_path.parent().filter(|dir| !dir.as_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                RemoteError::Transfer(SessionError::Local {
                    path: parent.to_path_buf(),
                    message: err.to_string(),
                })
            })?;
        }

        let mut session = self
            .connector
            .open_transfer(&self.params)
            .await
            .map_err(|source| self.connection_error(source))?;
        let outcome = session
            .get(remote_path, local_path)
            .await
            .map_err(RemoteError::Transfer);
        let closed = session.close().await;
        debug!(host = self.params.host(), "transfer session closed");
        settle(outcome, closed)?;

        info!(remote = remote_path, local = %local_path, "downloaded file");
        Ok(())
    }
}

async fn upload_batch<S: TransferSession>(
    session: &mut S,
    tasks: &[FileTransferTask],
    destination_dir: &str,
) -> Result<usize, RemoteError> {
    session
        .create_dir_all(destination_dir)
        .await
        .map_err(RemoteError::Transfer)?;

    let mut uploaded = 0;
    for task in tasks {
        ensure_local_file(&task.local_path)?;
        let file_name = task
            .remote_file_name()
            .ok_or_else(|| RemoteError::InvalidRemoteName {
                remote_path: task.remote_path.clone(),
            })?;
        let target = remote_join(destination_dir, file_name);
        session
            .put(&task.local_path, &target)
            .await
            .map_err(RemoteError::Transfer)?;
        info!(local = %task.local_path, remote = %target, "uploaded file");
        uploaded += 1;
    }
    Ok(uploaded)
}
