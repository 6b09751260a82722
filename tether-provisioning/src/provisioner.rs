use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use super::config::ProvisioningConfig;
use super::contract::ProvisioningContract;
use super::credential::Credential;
use super::error::ProvisioningError;
use super::model::{ProvisioningStatus, RegistrationResponse};
use super::register::{Authorization, register};
use super::status::poll;

/// Progress of a provisioning attempt as reported to the application
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientLifecycleStatus {
    Unauthenticated,
    ReadyToAuthenticate,
    Authenticated,
    Assigning,
    Assigned,
    /// The attempt failed and will not make further progress
    Error,
}

impl fmt::Display for ClientLifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientLifecycleStatus::Unauthenticated => "unauthenticated",
            ClientLifecycleStatus::ReadyToAuthenticate => "ready to authenticate",
            ClientLifecycleStatus::Authenticated => "authenticated",
            ClientLifecycleStatus::Assigning => "assigning",
            ClientLifecycleStatus::Assigned => "assigned",
            ClientLifecycleStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Hub assignment of a successfully provisioned device
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegistrationOutcome {
    pub assigned_hub: String,
    pub device_id: String,
    pub status: ProvisioningStatus,
}

/// Called on every phase change, with the failure reason for `Error`
pub type StatusCallback = Arc<dyn Fn(ClientLifecycleStatus, Option<String>) + Send + Sync>;

/// Called once when the device gets assigned to a hub
pub type RegistrationCallback = Box<dyn FnOnce(RegistrationOutcome) + Send>;

/// Drives one provisioning attempt in the background.
///
/// The attempt registers the device and then polls the registration until
/// the service assigns a hub or gives up. Nothing is returned to the caller,
/// every outcome goes through the callbacks. An attempt that ended in
/// `Error` cannot be restarted, create a new provisioner instead.
pub struct Provisioner {
    config: ProvisioningConfig,
    credential: Credential,
    contract: Arc<dyn ProvisioningContract>,
    on_status: StatusCallback,
    on_registered: Option<RegistrationCallback>,
    runtime: Handle,
    task: Option<JoinHandle<()>>,
}

impl Provisioner {
    /// Create a provisioner, reporting `Unauthenticated` right away.
    ///
    /// Must be called from within a tokio runtime, which is the one the
    /// attempt will run on.
    pub fn new<S, R>(
        config: ProvisioningConfig,
        credential: Credential,
        contract: Arc<dyn ProvisioningContract>,
        on_status: S,
        on_registered: R,
    ) -> Result<Self, ProvisioningError>
    where
        S: Fn(ClientLifecycleStatus, Option<String>) + Send + Sync + 'static,
        R: FnOnce(RegistrationOutcome) + Send + 'static,
    {
        config.validate()?;
        if credential.registration_id().trim().is_empty() {
            return Err(ProvisioningError::Configuration(
                "registration id cannot be empty".into(),
            ));
        }
        let runtime = Handle::try_current().map_err(|err| {
            ProvisioningError::Configuration(format!("no async runtime: {err}"))
        })?;

        let on_status: StatusCallback = Arc::new(on_status);
        on_status(ClientLifecycleStatus::Unauthenticated, None);

        Ok(Self {
            config,
            credential,
            contract,
            on_status,
            on_registered: Some(Box::new(on_registered)),
            runtime,
            task: None,
        })
    }

    /// Start the attempt in the background.
    ///
    /// An attempt can only be started once.
    pub fn start(&mut self) -> Result<(), ProvisioningError> {
        let on_registered = self.on_registered.take().ok_or_else(|| {
            ProvisioningError::Configuration("provisioning was already started".into())
        })?;

        self.task = Some(self.runtime.spawn(run(
            self.config.clone(),
            self.credential.clone(),
            Arc::clone(&self.contract),
            Arc::clone(&self.on_status),
            on_registered,
        )));
        Ok(())
    }

    /// Wait for the attempt to end, successfully or not
    pub async fn wait(&mut self) {
        if let Some(task) = self.task.as_mut() {
            match task.await {
                Err(err) if err.is_panic() => warn!("provisioning task panicked: {err}"),
                // finished, or aborted by close
                _ => {}
            }
        }
        self.task = None;
    }

    /// True once a started attempt has ended
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_some_and(|task| task.is_finished())
    }

    /// Abandon the attempt.
    ///
    /// In-flight requests are not waited for and no further callbacks are
    /// made.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("abandoning provisioning");
            task.abort();
        }
    }
}

impl Drop for Provisioner {
    fn drop(&mut self) {
        self.close();
    }
}

#[instrument(name = "provisioning", skip_all, fields(registration_id = credential.registration_id()))]
async fn run(
    config: ProvisioningConfig,
    credential: Credential,
    contract: Arc<dyn ProvisioningContract>,
    on_status: StatusCallback,
    on_registered: RegistrationCallback,
) {
    match provision(&config, &credential, contract.as_ref(), on_status.as_ref()).await {
        Ok(outcome) => {
            info!(
                hub = %outcome.assigned_hub,
                device_id = %outcome.device_id,
                "device assigned"
            );
            on_status(ClientLifecycleStatus::Assigned, None);
            on_registered(outcome);
        }
        Err(err) => {
            warn!("provisioning failed: {err}");
            on_status(ClientLifecycleStatus::Error, Some(err.to_string()));
        }
    }
}

async fn provision(
    config: &ProvisioningConfig,
    credential: &Credential,
    contract: &dyn ProvisioningContract,
    on_status: &(dyn Fn(ClientLifecycleStatus, Option<String>) + Send + Sync),
) -> Result<RegistrationOutcome, ProvisioningError> {
    on_status(ClientLifecycleStatus::ReadyToAuthenticate, None);

    let mut authorization = Authorization::default();
    let response = timeout(
        config.register_timeout,
        register(config, credential, contract, &mut authorization),
    )
    .await
    .map_err(|_| ProvisioningError::Timeout("registration"))??;

    let operation_id = response
        .operation_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            ProvisioningError::Authentication("operation id could not be retrieved".into())
        })?;
    on_status(ClientLifecycleStatus::Authenticated, None);

    let registration_id = credential.registration_id();
    loop {
        let response = timeout(
            config.status_timeout,
            poll(contract, registration_id, &operation_id, &authorization),
        )
        .await
        .map_err(|_| ProvisioningError::Timeout("registration status"))??;

        let status = response.status.as_deref().unwrap_or_default();
        match ProvisioningStatus::from_str_ci(status) {
            Some(ProvisioningStatus::Assigned) => return assignment(response),
            Some(ProvisioningStatus::Assigning) => {
                on_status(ClientLifecycleStatus::Assigning, None);
                let delay = config.poll_delay(response.retry_after);
                debug!(delay_ms = delay.as_millis() as u64, "waiting for assignment");
                sleep(delay).await;
            }
            Some(status) => {
                let reason = response
                    .error_message()
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("registration {status}"));
                return Err(ProvisioningError::Hub(reason));
            }
            None => {
                return Err(ProvisioningError::Hub(format!(
                    "unknown registration status '{status}'"
                )));
            }
        }
    }
}

fn assignment(response: RegistrationResponse) -> Result<RegistrationOutcome, ProvisioningError> {
    let state = response.registration_status.unwrap_or_default();
    let assigned_hub = state
        .assigned_hub
        .ok_or_else(|| ProvisioningError::Hub("service did not report an assigned hub".into()))?;
    let device_id = state
        .device_id
        .ok_or_else(|| ProvisioningError::Hub("service did not report a device id".into()))?;

    Ok(RegistrationOutcome {
        assigned_hub,
        device_id,
        status: ProvisioningStatus::Assigned,
    })
}
