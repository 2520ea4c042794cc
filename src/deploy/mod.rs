//! Deploy workflow: create the instance and wait until it can be configured.

use thiserror::Error;
use tracing::info;

use crate::backend::{Backend, InstanceRequest, InstanceSnapshot};
use crate::readiness::{ReadinessError, ReadinessPoller};

mod server_config;

pub use server_config::{
    IP_PLACEHOLDER, NEW_USER_PASSWORD_PLACEHOLDER, ROOT_PASSWORD_PLACEHOLDER, TemplateError,
    generate_password, render_server_config, write_server_config,
};

/// Errors surfaced while deploying an instance.
#[derive(Debug, Error)]
pub enum DeployError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Raised when the creation request fails.
    #[error("failed to create instance: {0}")]
    Create(#[source] BackendError),
    /// Raised when the instance does not become ready.
    #[error(transparent)]
    Readiness(#[from] ReadinessError<BackendError>),
}

/// Result of a successful deployment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeployOutcome {
    /// The ready instance, carrying the root password from the creation
    /// response when the provider issued one.
    pub instance: InstanceSnapshot,
}

/// Creates an instance and waits for it to become ready.
#[derive(Debug)]
pub struct DeployOrchestrator<B> {
    backend: B,
    poller: ReadinessPoller,
}

impl<B: Backend> DeployOrchestrator<B> {
    /// Creates an orchestrator polling with `poller`.
    #[must_use]
    pub const fn new(backend: B, poller: ReadinessPoller) -> Self {
        Self { backend, poller }
    }

    /// Creates the instance described by `request` and waits until it is
    /// active with an assigned address.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Create`] when creation fails and
    /// [`DeployError::Readiness`] when polling fails or times out.
    pub async fn deploy(
        &self,
        request: &InstanceRequest,
    ) -> Result<DeployOutcome, DeployError<B::Error>> {
        let created = self
            .backend
            .create(request)
            .await
            .map_err(DeployError::Create)?;
        info!(instance_id = %created.id, label = %request.label, "instance creation initiated");
        self.await_ready(created).await
    }

    /// Waits for an already created instance to become active with an
    /// assigned address.
    ///
    /// The provider only returns the temporary root password in the creation
    /// response, so it is copied onto the ready snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Readiness`] when polling fails or times out.
    pub async fn await_ready(
        &self,
        created: InstanceSnapshot,
    ) -> Result<DeployOutcome, DeployError<B::Error>> {
        let mut instance = self
            .poller
            .wait_until_ready(&self.backend, &created.handle())
            .await?;
        if instance.default_password.is_none() {
            instance.default_password = created.default_password;
        }
        Ok(DeployOutcome { instance })
    }
}
