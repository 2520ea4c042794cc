//! Core library for the vpnforge provisioning tool.
//!
//! The crate exposes a backend abstraction for creating cloud servers, a
//! Vultr implementation with readiness polling, and an SSH/SFTP toolkit that
//! uploads setup scripts, runs them, and fetches the generated VPN client
//! configuration (deploy → wait for an address → install → harden).

pub mod backend;
pub mod config;
pub mod deploy;
pub mod install;
pub mod readiness;
pub mod remote;
pub mod session;
pub mod test_support;
pub mod vultr;

pub use backend::{
    Backend, BackendError, InstanceHandle, InstanceRequest, InstanceRequestBuilder,
    InstanceSnapshot, InstanceStatus,
};
pub use config::{ConfigError, ProviderConfig};
pub use deploy::{
    DeployError, DeployOrchestrator, DeployOutcome, TemplateError, generate_password,
    render_server_config, write_server_config,
};
pub use install::{
    InstallConfig, InstallError, InstallPlan, InstallReport, InstallStep, ServerConfig,
    SetupSequencer,
};
pub use readiness::{ReadinessError, ReadinessPoller};
pub use remote::{FileTransferTask, RemoteError, RemoteHost, RunPhase, join_pipeline};
pub use session::{
    AuthMethod, AuthMode, ConnectionParameters, Connector, OutputSinks, SessionError,
    SshConnector,
};
pub use vultr::{ResolvedOffer, VultrBackend, VultrBackendError};
