//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::io::{self, Write};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};

use camino::Utf8Path;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{Mutex, MutexGuard};

use crate::backend::{
    Backend, BackendFuture, InstanceHandle, InstanceRequest, InstanceSnapshot, InstanceStatus,
};
use crate::session::{
    ConnectionParameters, Connector, OutputSinks, SessionError, SessionFuture, ShellSession,
    TransferSession,
};

/// Errors produced by [`ScriptedBackend`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedBackendError {
    /// A failure queued by the test.
    #[error("scripted failure: {0}")]
    Scripted(String),
    /// The backend was asked for more snapshots than were queued.
    #[error("no scripted response left")]
    Exhausted,
}

type ScriptedResponse = Result<InstanceSnapshot, ScriptedBackendError>;

/// Backend double that replays queued snapshots in FIFO order and counts
/// calls.
#[derive(Clone, Debug)]
pub struct ScriptedBackend {
    creation: ScriptedResponse,
    responses: Arc<std::sync::Mutex<VecDeque<ScriptedResponse>>>,
    creates: Arc<AtomicUsize>,
    fetches: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    /// Creates a backend whose `create` call returns `creation`.
    #[must_use]
    pub fn new(creation: InstanceSnapshot) -> Self {
        Self::with_creation(Ok(creation))
    }

    /// Creates a backend whose `create` call fails with `message`.
    #[must_use]
    pub fn failing_creation(message: &str) -> Self {
        Self::with_creation(Err(ScriptedBackendError::Scripted(message.to_owned())))
    }

    fn with_creation(creation: ScriptedResponse) -> Self {
        Self {
            creation,
            responses: Arc::new(std::sync::Mutex::new(VecDeque::new())),
            creates: Arc::new(AtomicUsize::new(0)),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queues a snapshot for the next fetch.
    pub fn push_snapshot(&self, snapshot: InstanceSnapshot) {
        self.queue().push_back(Ok(snapshot));
    }

    /// Queues a fetch failure.
    pub fn push_fetch_error(&self, message: &str) {
        self.queue()
            .push_back(Err(ScriptedBackendError::Scripted(message.to_owned())));
    }

    /// Number of `create` calls observed.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of `fetch_instance` calls observed.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedResponse>> {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for ScriptedBackend {
    type Error = ScriptedBackendError;

    fn create<'a>(
        &'a self,
        _request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceSnapshot, Self::Error> {
        Box::pin(async move {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.creation.clone()
        })
    }

    fn fetch_instance<'a>(
        &'a self,
        _handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, InstanceSnapshot, Self::Error> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.queue()
                .pop_front()
                .unwrap_or(Err(ScriptedBackendError::Exhausted))
        })
    }
}

/// Builds a snapshot with the given status and address.
#[must_use]
pub fn snapshot(id: &str, status: &str, main_ip: &str) -> InstanceSnapshot {
    InstanceSnapshot {
        id: id.to_owned(),
        status: InstanceStatus::from(status),
        main_ip: main_ip.to_owned(),
        default_password: None,
    }
}

/// Cloneable in-memory writer whose contents can be inspected afterwards.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far, decoded lossily.
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Output sinks backed by two inspectable buffers.
#[derive(Debug)]
pub struct CapturedOutput {
    /// Sinks to hand to the code under test.
    pub sinks: OutputSinks,
    /// Captured standard output.
    pub stdout: SharedBuffer,
    /// Captured standard error.
    pub stderr: SharedBuffer,
}

impl CapturedOutput {
    /// Creates sinks that record into fresh buffers.
    #[must_use]
    pub fn new() -> Self {
        let stdout = SharedBuffer::new();
        let stderr = SharedBuffer::new();
        let sinks = OutputSinks::new(Box::new(stdout.clone()), Box::new(stderr.clone()));
        Self {
            sinks,
            stdout,
            stderr,
        }
    }

    /// Standard output and standard error concatenated.
    #[must_use]
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout.contents(), self.stderr.contents())
    }
}

impl Default for CapturedOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Observable actions performed through a [`LocalConnector`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionEvent {
    /// A shell session was opened.
    ShellOpened,
    /// A command was submitted.
    Exec(String),
    /// The command reported its exit status.
    ExitStatus(Option<u32>),
    /// A shell session was closed.
    ShellClosed,
    /// A transfer session was opened.
    TransferOpened,
    /// A remote directory was created.
    DirectoryCreated(String),
    /// A file was uploaded to the given remote path.
    Put(String),
    /// A file was downloaded from the given remote path.
    Get(String),
    /// A transfer session was closed.
    TransferClosed,
}

/// Connector that runs commands with `sh -c` and performs transfers on the
/// local filesystem, treating remote paths as local ones.
///
/// Point remote paths into a temporary directory to mirror a host.
#[derive(Clone, Debug, Default)]
pub struct LocalConnector {
    events: Arc<std::sync::Mutex<Vec<SessionEvent>>>,
    refuse_connections: bool,
}

impl LocalConnector {
    /// Creates a connector that accepts every connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connector whose sessions always fail to open.
    #[must_use]
    pub fn refusing() -> Self {
        Self {
            refuse_connections: true,
            ..Self::default()
        }
    }

    /// Returns every event recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: SessionEvent) {
        record(&self.events, event);
    }

    fn check_refused(&self, params: &ConnectionParameters) -> Result<(), SessionError> {
        if self.refuse_connections {
            return Err(SessionError::Connect {
                host: params.host().to_owned(),
                port: params.port(),
                message: String::from("connection refused"),
            });
        }
        Ok(())
    }
}

fn record(events: &std::sync::Mutex<Vec<SessionEvent>>, event: SessionEvent) {
    events
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(event);
}

impl Connector for LocalConnector {
    type Shell = LocalShell;
    type Transfer = LocalTransfer;

    fn open_shell<'a>(&'a self, params: &'a ConnectionParameters) -> SessionFuture<'a, LocalShell> {
        Box::pin(async move {
            self.check_refused(params)?;
            self.record(SessionEvent::ShellOpened);
            Ok(LocalShell {
                events: Arc::clone(&self.events),
            })
        })
    }

    fn open_transfer<'a>(
        &'a self,
        params: &'a ConnectionParameters,
    ) -> SessionFuture<'a, LocalTransfer> {
        Box::pin(async move {
            self.check_refused(params)?;
            self.record(SessionEvent::TransferOpened);
            Ok(LocalTransfer {
                events: Arc::clone(&self.events),
            })
        })
    }
}

/// Shell session created by [`LocalConnector`].
#[derive(Debug)]
pub struct LocalShell {
    events: Arc<std::sync::Mutex<Vec<SessionEvent>>>,
}

impl ShellSession for LocalShell {
    fn exec<'a>(
        &'a mut self,
        command: &'a str,
        sinks: &'a mut OutputSinks,
    ) -> SessionFuture<'a, Option<u32>> {
        Box::pin(async move {
            record(&self.events, SessionEvent::Exec(command.to_owned()));
            let mut child = Command::new("sh")
                .arg("-c")
                .arg(command)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|err| channel_failure(&err))?;
            let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take())
            else {
                return Err(SessionError::Channel {
                    message: String::from("child output pipes were not captured"),
                });
            };

            let mut out_chunk = [0_u8; 4096];
            let mut err_chunk = [0_u8; 4096];
            let mut out_open = true;
            let mut err_open = true;
            while out_open || err_open {
                tokio::select! {
                    read = stdout.read(&mut out_chunk), if out_open => {
                        let len = read.map_err(|err| channel_failure(&err))?;
                        if len == 0 {
                            out_open = false;
                        } else {
                            sinks.write_stdout(out_chunk.get(..len).unwrap_or_default())?;
                        }
                    }
                    read = stderr.read(&mut err_chunk), if err_open => {
                        let len = read.map_err(|err| channel_failure(&err))?;
                        if len == 0 {
                            err_open = false;
                        } else {
                            sinks.write_stderr(err_chunk.get(..len).unwrap_or_default())?;
                        }
                    }
                }
            }

            let status = child
                .wait()
                .await
                .map_err(|err| channel_failure(&err))?
                .code()
                .and_then(|code| u32::try_from(code).ok());
            record(&self.events, SessionEvent::ExitStatus(status));
            Ok(status)
        })
    }

    fn close(&mut self) -> SessionFuture<'_, ()> {
        Box::pin(async move {
            record(&self.events, SessionEvent::ShellClosed);
            Ok(())
        })
    }
}

fn channel_failure(err: &io::Error) -> SessionError {
    SessionError::Channel {
        message: err.to_string(),
    }
}

/// Transfer session created by [`LocalConnector`].
#[derive(Debug)]
pub struct LocalTransfer {
    events: Arc<std::sync::Mutex<Vec<SessionEvent>>>,
}

fn remote_failure(path: &str, err: &io::Error) -> SessionError {
    SessionError::Remote {
        path: path.to_owned(),
        message: err.to_string(),
    }
}

impl TransferSession for LocalTransfer {
    fn create_dir_all<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|err| remote_failure(path, &err))?;
            record(&self.events, SessionEvent::DirectoryCreated(path.to_owned()));
            Ok(())
        })
    }

    fn put<'a>(&'a mut self, local: &'a Utf8Path, remote: &'a str) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            tokio::fs::copy(local, remote)
                .await
                .map_err(|err| remote_failure(remote, &err))?;
            record(&self.events, SessionEvent::Put(remote.to_owned()));
            Ok(())
        })
    }

    fn get<'a>(&'a mut self, remote: &'a str, local: &'a Utf8Path) -> SessionFuture<'a, ()> {
        Box::pin(async move {
            tokio::fs::copy(remote, local)
                .await
                .map_err(|err| remote_failure(remote, &err))?;
            record(&self.events, SessionEvent::Get(remote.to_owned()));
            Ok(())
        })
    }

    fn close(&mut self) -> SessionFuture<'_, ()> {
        Box::pin(async move {
            record(&self.events, SessionEvent::TransferClosed);
            Ok(())
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and clears environment variables while holding a global mutex.
    /// Each pair with a `None` value is removed for the guard's lifetime.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
