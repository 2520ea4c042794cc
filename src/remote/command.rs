//! Fail-fast command pipelines over a remote shell session.

use std::fmt;

use tracing::debug;

use super::{RemoteError, RemoteHost, join_pipeline};
use crate::session::{Connector, OutputSinks, SessionError, ShellSession};

/// Lifecycle of a single pipeline run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunPhase {
    /// Nothing has happened yet.
    Idle,
    /// Opening and authenticating the session.
    Connecting,
    /// Session established.
    Connected,
    /// Pipeline submitted; output is streaming.
    Executing,
    /// Pipeline exited with status zero.
    Succeeded,
    /// Pipeline exited with the given non-zero status.
    Failed(u32),
    /// Session could not be established.
    ConnectionFailed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Executing => f.write_str("executing"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed(code) => write!(f, "failed ({code})"),
            Self::ConnectionFailed => f.write_str("connection failed"),
        }
    }
}

struct PhaseLog<'a> {
    host: &'a str,
    phase: RunPhase,
}

impl<'a> PhaseLog<'a> {
    const fn new(host: &'a str) -> Self {
        Self {
            host,
            phase: RunPhase::Idle,
        }
    }

    fn enter(&mut self, next: RunPhase) {
        debug!(host = self.host, from = %self.phase, to = %next, "command run phase");
        self.phase = next;
    }
}

impl<C: Connector> RemoteHost<C> {
    /// Runs `commands` as one `&&`-joined pipeline in a single session,
    /// streaming output to `sinks` as it arrives.
    ///
    /// The session is closed once the pipeline has reported its exit status,
    /// whatever that status is. Close failures are logged, never returned.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::EmptyPipeline`] for an empty command list,
    /// [`RemoteError::Connection`] when the session cannot be opened or
    /// drops during execution, [`RemoteError::CommandFailed`] for a non-zero
    /// exit, [`RemoteError::MissingExitStatus`] when none is reported, and
    /// [`RemoteError::Output`] when a local sink rejects streamed output.
    pub async fn run<S: AsRef<str>>(
        &self,
        commands: &[S],
        sinks: &mut OutputSinks,
    ) -> Result<(), RemoteError> {
        if commands.is_empty() {
            return Err(RemoteError::EmptyPipeline);
        }
        let pipeline = join_pipeline(commands);
        let mut phase = PhaseLog::new(self.params.host());

        phase.enter(RunPhase::Connecting);
        let mut shell = match self.connector.open_shell(&self.params).await {
            Ok(shell) => shell,
            Err(source) => {
                phase.enter(RunPhase::ConnectionFailed);
                return Err(self.connection_error(source));
            }
        };
        phase.enter(RunPhase::Connected);

        phase.enter(RunPhase::Executing);
        let status = shell.exec(&pipeline, sinks).await;

        match shell.close().await {
            Ok(()) => debug!(host = self.params.host(), "SSH connection closed"),
            Err(err) => debug!(
                host = self.params.host(),
                error = %err,
                "SSH connection did not close cleanly"
            ),
        }

        match status {
            Ok(Some(0)) => {
                phase.enter(RunPhase::Succeeded);
                Ok(())
            }
            Ok(Some(code)) => {
                phase.enter(RunPhase::Failed(code));
                Err(RemoteError::CommandFailed { code })
            }
            Ok(None) => Err(RemoteError::MissingExitStatus),
            Err(SessionError::Output(source)) => Err(RemoteError::Output(source)),
            Err(source) => Err(self.connection_error(source)),
        }
    }
}
