//! Scoped remote operations against a single host.
//!
//! Every operation opens its own session, uses it for one logical task, and
//! closes it on every exit path before returning. Sessions are never shared
//! between operations.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::session::{ConnectionParameters, Connector, SessionError};

mod command;
mod transfer;

pub use command::RunPhase;

/// Separator that makes a pipeline stop at the first failing command.
pub const PIPELINE_SEPARATOR: &str = " && ";

/// Errors raised by remote operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Raised when a file scheduled for upload does not exist locally.
    #[error("local file not found: {path}")]
    LocalFileNotFound {
        /// Path that was expected to exist.
        path: Utf8PathBuf,
    },
    /// Raised when a session cannot be established or drops mid-operation.
    #[error("remote connection to {host} failed: {source}")]
    Connection {
        /// Target host.
        host: String,
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// Raised when the pipeline terminates with a non-zero exit status.
    #[error("remote command failed with exit code {code}")]
    CommandFailed {
        /// Exit status reported by the remote shell.
        code: u32,
    },
    /// Raised when the remote side closes without reporting an exit status.
    #[error("remote command ended without reporting an exit status")]
    MissingExitStatus,
    /// Raised when asked to run a pipeline with no commands.
    #[error("refusing to run an empty command pipeline")]
    EmptyPipeline,
    /// Raised when a transfer task's remote name has no final path segment.
    #[error("remote path '{remote_path}' has no file name")]
    InvalidRemoteName {
        /// Offending remote path.
        remote_path: String,
    },
    /// Raised when remote output cannot be written to a local sink.
    #[error("failed to write remote output locally: {0}")]
    Output(#[source] std::io::Error),
    /// Raised when a file transfer fails after the session was established.
    #[error("file transfer failed: {0}")]
    Transfer(#[source] SessionError),
}

/// A file to copy from the local machine to the remote host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileTransferTask {
    /// Location of the file on the local machine.
    pub local_path: Utf8PathBuf,
    /// Remote name of the file. Only its final segment is used on upload.
    pub remote_path: String,
}

impl FileTransferTask {
    /// Creates a transfer task.
    #[must_use]
    pub fn new(local_path: impl Into<Utf8PathBuf>, remote_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        }
    }

    /// Final path segment of the remote name, if it has one.
    #[must_use]
    pub fn remote_file_name(&self) -> Option<&str> {
        self.remote_path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }
}

/// Joins commands into a single fail-fast pipeline.
#[must_use]
pub fn join_pipeline<S: AsRef<str>>(commands: &[S]) -> String {
    commands
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(PIPELINE_SEPARATOR)
}

/// Joins a remote directory and a file name with exactly one separator.
pub(crate) fn remote_join(directory: &str, file_name: &str) -> String {
    let trimmed = directory.trim_end_matches('/');
    if trimmed.is_empty() && directory.starts_with('/') {
        return format!("/{file_name}");
    }
    format!("{trimmed}/{file_name}")
}

/// A remote host reachable through a connector with fixed credentials.
#[derive(Clone, Debug)]
pub struct RemoteHost<C: Connector> {
    connector: C,
    params: ConnectionParameters,
}

impl<C: Connector> RemoteHost<C> {
    /// Creates a remote host handle. No connection is made until an
    /// operation is invoked.
    #[must_use]
    pub const fn new(connector: C, params: ConnectionParameters) -> Self {
        Self { connector, params }
    }

    /// Connection parameters used for every session.
    #[must_use]
    pub const fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    fn connection_error(&self, source: SessionError) -> RemoteError {
        RemoteError::Connection {
            host: self.params.host().to_owned(),
            source,
        }
    }
}

/// Combines an operation's result with the result of closing its session.
///
/// The operation's own failure wins; a close failure only surfaces when the
/// operation itself succeeded.
fn settle<T>(
    outcome: Result<T, RemoteError>,
    closed: Result<(), SessionError>,
) -> Result<T, RemoteError> {
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(RemoteError::Transfer(err)),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            debug!(error = %close_err, "failed to close transfer session after error");
            Err(err)
        }
    }
}

fn ensure_local_file(path: &Utf8Path) -> Result<(), RemoteError> {
    if path.is_file() {
        return Ok(());
    }
    Err(RemoteError::LocalFileNotFound {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests;
