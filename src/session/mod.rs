//! Remote sessions used by transfers and command execution.
//!
//! A session is opened for exactly one logical operation (an upload batch, a
//! download, or a command pipeline) and closed by the same caller. The
//! [`Connector`] trait is the seam between the orchestration code and the SSH
//! transport so tests can substitute a local implementation.

use std::fmt;
use std::future::Future;
use std::io::{self, Write};
use std::pin::Pin;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

mod ssh;

pub use ssh::{SftpTransfer, SshConnector, SshShell};

/// Which kind of credential a session authenticates with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthMode {
    /// Password authentication.
    Password,
    /// Private key authentication.
    PrivateKey,
}

/// Credential used to authenticate a session. Exactly one is ever held.
#[derive(Clone, Eq, PartialEq)]
pub enum AuthMethod {
    /// Password authentication.
    Password(String),
    /// Private key authentication from a key file on disk.
    PrivateKey {
        /// Location of the private key.
        path: Utf8PathBuf,
        /// Passphrase protecting the key, if any.
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    /// Returns the authentication mode without exposing the secret.
    #[must_use]
    pub const fn mode(&self) -> AuthMode {
        match self {
            Self::Password(_) => AuthMode::Password,
            Self::PrivateKey { .. } => AuthMode::PrivateKey,
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::PrivateKey { path, .. } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

/// Everything needed to open an authenticated session to one host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionParameters {
    host: String,
    port: u16,
    username: String,
    auth: AuthMethod,
}

impl ConnectionParameters {
    /// Creates connection parameters.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        auth: AuthMethod,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth,
        }
    }

    /// Host name or IP address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port of the SSH server.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// User to authenticate as.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Credential used for authentication.
    #[must_use]
    pub const fn auth(&self) -> &AuthMethod {
        &self.auth
    }
}

/// Errors raised by session implementations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Raised when the transport cannot reach or handshake with the host.
    #[error("failed to connect to {host}:{port}: {message}")]
    Connect {
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
        /// Transport error message.
        message: String,
    },
    /// Raised when the server rejects the supplied credentials.
    #[error("authentication rejected for {username}@{host}")]
    Authentication {
        /// User that attempted to authenticate.
        username: String,
        /// Target host.
        host: String,
    },
    /// Raised when the private key cannot be loaded.
    #[error("failed to load private key {path}: {message}")]
    PrivateKey {
        /// Key file location.
        path: Utf8PathBuf,
        /// Loader error message.
        message: String,
    },
    /// Raised when a channel cannot be opened or fails mid-operation.
    #[error("channel error: {message}")]
    Channel {
        /// Transport error message.
        message: String,
    },
    /// Raised when a remote filesystem operation fails.
    #[error("remote operation on {path} failed: {message}")]
    Remote {
        /// Remote path involved.
        path: String,
        /// Error reported by the remote side.
        message: String,
    },
    /// Raised when a local filesystem operation fails.
    #[error("local operation on {path} failed: {message}")]
    Local {
        /// Local path involved.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when streamed output cannot be written to its sink.
    #[error("failed to forward remote output: {0}")]
    Output(#[source] io::Error),
}

/// Future returned by session operations.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SessionError>> + Send + 'a>>;

/// Destinations for remote standard output and standard error.
///
/// Writes are flushed immediately so long-running remote scripts show
/// progress as it happens.
pub struct OutputSinks {
    stdout: Box<dyn Write + Send>,
    stderr: Box<dyn Write + Send>,
}

impl OutputSinks {
    /// Creates sinks from arbitrary writers.
    #[must_use]
    pub fn new(stdout: Box<dyn Write + Send>, stderr: Box<dyn Write + Send>) -> Self {
        Self { stdout, stderr }
    }

    /// Forwards to the current process's standard streams.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// Writes a chunk of remote standard output.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Output`] when the sink rejects the write.
    pub fn write_stdout(&mut self, data: &[u8]) -> Result<(), SessionError> {
        forward(self.stdout.as_mut(), data)
    }

    /// Writes a chunk of remote standard error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Output`] when the sink rejects the write.
    pub fn write_stderr(&mut self, data: &[u8]) -> Result<(), SessionError> {
        forward(self.stderr.as_mut(), data)
    }
}

impl fmt::Debug for OutputSinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSinks").finish_non_exhaustive()
    }
}

fn forward(target: &mut (dyn Write + Send), data: &[u8]) -> Result<(), SessionError> {
    target.write_all(data).map_err(SessionError::Output)?;
    target.flush().map_err(SessionError::Output)
}

/// An authenticated remote-execution session.
pub trait ShellSession: Send {
    /// Executes `command` through the remote shell, streaming output into
    /// `sinks` as it arrives. Returns the exit status, or `None` when the
    /// remote side closed the channel without reporting one.
    fn exec<'a>(
        &'a mut self,
        command: &'a str,
        sinks: &'a mut OutputSinks,
    ) -> SessionFuture<'a, Option<u32>>;

    /// Closes the session.
    fn close(&mut self) -> SessionFuture<'_, ()>;
}

/// An authenticated file-transfer session.
pub trait TransferSession: Send {
    /// Creates `path` and any missing parents; succeeds when it already exists.
    fn create_dir_all<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, ()>;

    /// Copies the local file at `local` to the remote file `remote`.
    fn put<'a>(&'a mut self, local: &'a Utf8Path, remote: &'a str) -> SessionFuture<'a, ()>;

    /// Copies the remote file `remote` to the local file `local`.
    fn get<'a>(&'a mut self, remote: &'a str, local: &'a Utf8Path) -> SessionFuture<'a, ()>;

    /// Closes the session.
    fn close(&mut self) -> SessionFuture<'_, ()>;
}

/// Opens sessions for a set of connection parameters.
pub trait Connector {
    /// Session type used for command execution.
    type Shell: ShellSession;
    /// Session type used for file transfers.
    type Transfer: TransferSession;

    /// Connects and authenticates a remote-execution session.
    fn open_shell<'a>(&'a self, params: &'a ConnectionParameters) -> SessionFuture<'a, Self::Shell>;

    /// Connects and authenticates a file-transfer session.
    fn open_transfer<'a>(
        &'a self,
        params: &'a ConnectionParameters,
    ) -> SessionFuture<'a, Self::Transfer>;
}
