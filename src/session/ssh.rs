//! SSH and SFTP sessions backed by `russh`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8Path;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{
    AuthMethod, ConnectionParameters, Connector, OutputSinks, SessionError, SessionFuture,
    ShellSession, TransferSession,
};

const STDERR_EXTENDED_DATA: u32 = 1;
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Host keys are accepted without verification.
struct AcceptingHandler {
    host: String,
}

#[async_trait]
impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(host = %self.host, "accepting server host key");
        Ok(true)
    }
}

/// Opens `russh` sessions authenticated with a password or a private key.
#[derive(Clone)]
pub struct SshConnector {
    config: Arc<client::Config>,
}

impl std::fmt::Debug for SshConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConnector").finish_non_exhaustive()
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl SshConnector {
    /// Creates a connector with the default client configuration.
    #[must_use]
    pub fn new() -> Self {
        let config = client::Config {
            inactivity_timeout: Some(INACTIVITY_TIMEOUT),
            ..client::Config::default()
        };
        Self {
            config: Arc::new(config),
        }
    }

    async fn connect(
        &self,
        params: &ConnectionParameters,
    ) -> Result<Handle<AcceptingHandler>, SessionError> {
        let handler = AcceptingHandler {
            host: params.host().to_owned(),
        };
        let mut handle = client::connect(
            Arc::clone(&self.config),
            (params.host(), params.port()),
            handler,
        )
        .await
        .map_err(|err| SessionError::Connect {
            host: params.host().to_owned(),
            port: params.port(),
            message: err.to_string(),
        })?;

        let accepted = match params.auth() {
            AuthMethod::Password(password) => handle
                .authenticate_password(params.username(), password)
                .await
                .map_err(|err| channel_error(&err))?,
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = russh_keys::load_secret_key(path.as_std_path(), passphrase.as_deref())
                    .map_err(|err| SessionError::PrivateKey {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                handle
                    .authenticate_publickey(params.username(), Arc::new(key))
                    .await
                    .map_err(|err| channel_error(&err))?
            }
        };

        if !accepted {
            return Err(SessionError::Authentication {
                username: params.username().to_owned(),
                host: params.host().to_owned(),
            });
        }
        debug!(
            host = params.host(),
            port = params.port(),
            username = params.username(),
            auth = ?params.auth().mode(),
            "SSH session authenticated"
        );
        Ok(handle)
    }
}

fn channel_error(err: &russh::Error) -> SessionError {
    SessionError::Channel {
        message: err.to_string(),
    }
}

fn sftp_error(path: &str, err: &russh_sftp::client::error::Error) -> SessionError {
    SessionError::Remote {
        path: path.to_owned(),
        message: err.to_string(),
    }
}

fn local_error(path: &Utf8Path, err: &std::io::Error) -> SessionError {
    SessionError::Local {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

async fn disconnect(handle: &Handle<AcceptingHandler>) -> Result<(), SessionError> {
    handle
        .disconnect(Disconnect::ByApplication, "", "English")
        .await
        .map_err(|err| channel_error(&err))
}

impl Connector for SshConnector {
    type Shell = SshShell;
    type Transfer = SftpTransfer;

    fn open_shell<'a>(&'a self, params: &'a ConnectionParameters) -> SessionFuture<'a, SshShell> {
        Box::pin(async move {
            let handle = self.connect(params).await?;
            Ok(SshShell { handle })
        })
    }

    fn open_transfer<'a>(
        &'a self,
        params: &'a ConnectionParameters,
    ) -> SessionFuture<'a, SftpTransfer> {
        Box::pin(async move {
            let handle = self.connect(params).await?;
            let channel = handle
                .channel_open_session()
                .await
                .map_err(|err| channel_error(&err))?;
            channel
                .request_subsystem(true, "sftp")
                .await
                .map_err(|err| channel_error(&err))?;
            let sftp = SftpSession::new(channel.into_stream())
                .await
                .map_err(|err| SessionError::Channel {
                    message: err.to_string(),
                })?;
            Ok(SftpTransfer { handle, sftp })
        })
    }
}

/// Remote-execution session over an authenticated SSH connection.
pub struct SshShell {
    handle: Handle<AcceptingHandler>,
}

impl ShellSession for SshShell {
    fn exec<'a>(
        &'a mut self,
        command: &'a str,
        sinks: &'a mut OutputSinks,
    ) -> SessionFuture<'a, Option<u32>> {
        Box::pin(async move {
            let mut channel = self
                .handle
                .channel_open_session()
                .await
                .map_err(|err| channel_error(&err))?;
            channel
                .exec(true, command)
                .await
                .map_err(|err| channel_error(&err))?;

            let mut exit_status = None;
            while let Some(message) = channel.wait().await {
                match message {
                    ChannelMsg::Data { ref data } => sinks.write_stdout(data)?,
                    ChannelMsg::ExtendedData { ref data, ext } if ext == STDERR_EXTENDED_DATA => {
                        sinks.write_stderr(data)?;
                    }
                    ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                    _ => {}
                }
            }
            Ok(exit_status)
        })
    }

    fn close(&mut self) -> SessionFuture<'_, ()> {
        Box::pin(async move { disconnect(&self.handle).await })
    }
}

/// File-transfer session over an SFTP subsystem channel.
pub struct SftpTransfer {
    handle: Handle<AcceptingHandler>,
    sftp: SftpSession,
}

impl TransferSession for SftpTransfer {
    fn create_dir_all<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            for prefix in directory_prefixes(path) {
                let exists = self
                    .sftp
                    .try_exists(prefix.as_str())
                    .await
                    .map_err(|err| sftp_error(&prefix, &err))?;
                if !exists {
                    self.sftp
                        .create_dir(prefix.as_str())
                        .await
                        .map_err(|err| sftp_error(&prefix, &err))?;
                }
            }
            Ok(())
        })
    }

    fn put<'a>(&'a mut self, local: &'a Utf8Path, remote: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            let mut source = tokio::fs::File::open(local)
                .await
                .map_err(|err| local_error(local, &err))?;
            let mut target = self
                .sftp
                .create(remote)
                .await
                .map_err(|err| sftp_error(remote, &err))?;
            tokio::io::copy(&mut source, &mut target)
                .await
                .map_err(|err| SessionError::Remote {
                    path: remote.to_owned(),
                    message: err.to_string(),
                })?;
            target
                .shutdown()
                .await
                .map_err(|err| SessionError::Remote {
                    path: remote.to_owned(),
                    message: err.to_string(),
                })
        })
    }

    fn get<'a>(&'a mut self, remote: &'a str, local: &'a Utf8Path) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            let mut source = self
                .sftp
                .open(remote)
                .await
                .map_err(|err| sftp_error(remote, &err))?;
            let mut target = tokio::fs::File::create(local)
                .await
                .map_err(|err| local_error(local, &err))?;
            tokio::io::copy(&mut source, &mut target)
                .await
                .map_err(|err| local_error(local, &err))?;
            target.flush().await.map_err(|err| local_error(local, &err))
        })
    }

    fn close(&mut self) -> SessionFuture<'_, ()> {
        Box::pin(async move {
            self.sftp
                .close()
                .await
                .map_err(|err| SessionError::Channel {
                    message: err.to_string(),
                })?;
            disconnect(&self.handle).await
        })
    }
}

/// Lists every directory from the root down to `path`, so each can be
/// created in turn. Absolute paths keep their leading slash.
pub(crate) fn directory_prefixes(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    let mut prefixes = Vec::new();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if absolute || !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes
}
