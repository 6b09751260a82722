use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod cli;

use tether_provisioning as provisioning;
use tether_util as util;

use crate::cli::{Command, ProvisionArgs};
use crate::provisioning::{
    ClientLifecycleStatus, Credential, DeviceKey, HttpsContract, Provisioner,
    ProvisioningConfig, RegistrationOutcome, SymmetricKeySecurity, TlsIdentity,
};
use crate::util::dirs::state_dir;
use crate::util::http::Uri;
use crate::util::store::Store;

/// Key of the stored assignment in the state store
const ASSIGNMENT_KEY: &str = "assignment";

fn initialize_tracing() {
    // Initialize tracing subscriber for human-readable logs
    tracing_subscriber::registry()
        .with(
            // Use some log defaults. These can be overriden using
            // RUST_LOG
            EnvFilter::try_from_default_env().unwrap_or(
                EnvFilter::default()
                    .add_directive("debug".parse().unwrap())
                    .add_directive("hyper=error".parse().unwrap())
                    .add_directive("hyper_util=error".parse().unwrap())
                    .add_directive("rustls=error".parse().unwrap())
                    .add_directive("reqwest=info".parse().unwrap()),
            ),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .event_format(fmt::format().compact().with_target(false).without_time()),
        )
        .init();
}

#[derive(Debug, Error)]
enum ProvisionError {
    #[error("failed to read {0}: {1}")]
    ReadCredential(String, std::io::Error),

    #[error("invalid base64 in --{0}: {1}")]
    InvalidKey(&'static str, base64::DecodeError),

    #[error("provisioning failed: {0}")]
    Failed(String),
}

/// A hub assignment together with what it was obtained for
#[derive(Clone, Debug, Deserialize, Serialize)]
struct StoredAssignment {
    scope_id: String,
    registration_id: String,
    endpoint: Uri,
    outcome: RegistrationOutcome,
}

impl StoredAssignment {
    fn matches(&self, args: &ProvisionArgs) -> bool {
        self.scope_id == args.scope_id
            && self.registration_id == args.registration_id
            && self.endpoint == args.endpoint
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    initialize_tracing();

    let cli = cli::parse();

    // Assignments survive restarts in the state directory
    let store = Store::new(state_dir());

    match cli.command {
        Command::Provision(args) => {
            let outcome = maybe_provision(&args, &store).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Forget => {
            store.delete(ASSIGNMENT_KEY).await?;
            info!(dir = %store.root().display(), "stored assignment removed");
        }
    }

    Ok(())
}

/// Handle provisioning.
///
/// Provisioning is expensive for the service and the result is stable, so
/// a stored assignment obtained for the same scope, registration and
/// endpoint is reused. Passing `--force` skips the stored assignment.
async fn maybe_provision(
    args: &ProvisionArgs,
    store: &Store,
) -> Result<RegistrationOutcome, Box<dyn Error>> {
    let stored: Option<StoredAssignment> = store.read(ASSIGNMENT_KEY).await?;

    match stored {
        Some(stored) if args.force => {
            debug!(hub = %stored.outcome.assigned_hub, "ignoring stored assignment");
        }
        Some(stored) if stored.matches(args) => {
            info!(hub = %stored.outcome.assigned_hub, "using stored assignment");
            return Ok(stored.outcome);
        }
        Some(stored) => {
            warn!(
                "ignoring stored assignment for registration {0} in scope {1}",
                stored.registration_id, stored.scope_id
            );
        }
        None => {}
    }

    let outcome = provision(args).await?;
    store
        .write(
            ASSIGNMENT_KEY,
            &StoredAssignment {
                scope_id: args.scope_id.clone(),
                registration_id: args.registration_id.clone(),
                endpoint: args.endpoint.clone(),
                outcome: outcome.clone(),
            },
        )
        .await?;

    Ok(outcome)
}

#[instrument(skip_all, fields(scope_id = %args.scope_id), err)]
async fn provision(args: &ProvisionArgs) -> Result<RegistrationOutcome, Box<dyn Error>> {
    let credential = read_credential(args).await?;
    let contract = Arc::new(HttpsContract::new(
        args.endpoint.clone(),
        args.scope_id.clone(),
    )?);

    let defaults = ProvisioningConfig::new(args.scope_id.clone());
    let config = ProvisioningConfig {
        poll_interval: args.poll_interval.unwrap_or(defaults.poll_interval),
        register_timeout: args.register_timeout.unwrap_or(defaults.register_timeout),
        ..defaults
    };

    let failure = Arc::new(Mutex::new(None));
    let (outcome_tx, outcome_rx) = oneshot::channel();

    let reason = Arc::clone(&failure);
    let mut provisioner = Provisioner::new(
        config,
        credential,
        contract,
        move |status, msg: Option<String>| {
            info!(%status, "provisioning status changed");
            if status == ClientLifecycleStatus::Error {
                *reason.lock().unwrap_or_else(PoisonError::into_inner) = msg;
            }
        },
        move |outcome| {
            // the receiver outlives the attempt
            let _ = outcome_tx.send(outcome);
        },
    )?;

    provisioner.start()?;
    provisioner.wait().await;

    match outcome_rx.await {
        Ok(outcome) => Ok(outcome),
        Err(_) => {
            let reason = failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .unwrap_or_else(|| "attempt ended without an assignment".into());
            Err(ProvisionError::Failed(reason).into())
        }
    }
}

async fn read_credential(args: &ProvisionArgs) -> Result<Credential, ProvisionError> {
    if let (Some(certificate), Some(private_key)) = (&args.certificate, &args.private_key) {
        // reqwest expects the key and the certificate chain in one buffer
        let mut pem = read_file(private_key).await?;
        pem.push(b'\n');
        pem.extend(read_file(certificate).await?);

        return Ok(Credential::Certificate {
            registration_id: args.registration_id.clone(),
            tls_identity: TlsIdentity::from_pem(pem),
        });
    }

    let Some(key) = &args.symmetric_key else {
        return Err(ProvisionError::Failed("no credential given".into()));
    };

    // without the TPM keys the device key signs the SAS token directly
    let (Some(endorsement_key), Some(storage_root_key)) =
        (&args.endorsement_key, &args.storage_root_key)
    else {
        let key = DeviceKey::from_base64(key)
            .map_err(|err| ProvisionError::Failed(err.to_string()))?;
        return Ok(Credential::SymmetricKey {
            registration_id: args.registration_id.clone(),
            key,
        });
    };

    let endorsement_key = STANDARD
        .decode(endorsement_key.trim())
        .map_err(|err| ProvisionError::InvalidKey("endorsement-key", err))?;
    let storage_root_key = STANDARD
        .decode(storage_root_key.trim())
        .map_err(|err| ProvisionError::InvalidKey("storage-root-key", err))?;
    let security = SymmetricKeySecurity::new(
        args.registration_id.clone(),
        key,
        endorsement_key,
        storage_root_key,
    )
    .map_err(|err| ProvisionError::Failed(err.to_string()))?;

    Ok(Credential::SymmetricKeyOrTpm(Arc::new(security)))
}

async fn read_file(path: &Path) -> Result<Vec<u8>, ProvisionError> {
    tokio::fs::read(path)
        .await
        .map_err(|err| ProvisionError::ReadCredential(path.display().to_string(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioning::{CredentialKind, ProvisioningStatus};
    use tempfile::tempdir;

    fn args() -> ProvisionArgs {
        ProvisionArgs {
            scope_id: "0ne00000001".into(),
            registration_id: "dev1".into(),
            endpoint: Uri::from_static("https://dps.example.net"),
            certificate: None,
            private_key: None,
            symmetric_key: Some("a2V5".into()),
            endorsement_key: Some("ZWs=".into()),
            storage_root_key: Some("c3Jr".into()),
            poll_interval: None,
            register_timeout: None,
            force: false,
        }
    }

    fn stored() -> StoredAssignment {
        StoredAssignment {
            scope_id: "0ne00000001".into(),
            registration_id: "dev1".into(),
            endpoint: Uri::from_static("https://dps.example.net"),
            outcome: RegistrationOutcome {
                assigned_hub: "hub1.example.net".into(),
                device_id: "dev1".into(),
                status: ProvisioningStatus::Assigned,
            },
        }
    }

    #[tokio::test]
    async fn a_matching_stored_assignment_is_reused() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        store.write(ASSIGNMENT_KEY, &stored()).await.unwrap();

        let outcome = maybe_provision(&args(), &store).await.unwrap();
        assert_eq!(outcome.assigned_hub, "hub1.example.net");
    }

    #[test]
    fn stored_assignments_only_match_the_same_registration() {
        let mut other = args();
        assert!(stored().matches(&other));

        other.registration_id = "dev2".into();
        assert!(!stored().matches(&other));

        let mut other = args();
        other.endpoint = Uri::from_static("https://other.example.net");
        assert!(!stored().matches(&other));
    }

    #[tokio::test]
    async fn it_reads_key_credentials() {
        let credential = read_credential(&args()).await.unwrap();
        assert_eq!(credential.kind(), CredentialKind::SymmetricKeyOrTpm);
        assert_eq!(credential.registration_id(), "dev1");
    }

    #[tokio::test]
    async fn a_key_without_tpm_keys_is_a_device_key() {
        let args = ProvisionArgs {
            endorsement_key: None,
            storage_root_key: None,
            ..args()
        };
        let credential = read_credential(&args).await.unwrap();
        assert_eq!(credential.kind(), CredentialKind::SymmetricKey);
        assert_eq!(credential.registration_id(), "dev1");

        let args = ProvisionArgs {
            symmetric_key: Some("not base64!".into()),
            ..args
        };
        assert!(matches!(
            read_credential(&args).await,
            Err(ProvisionError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn it_reads_certificate_credentials() {
        let dir = tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        tokio::fs::write(&cert, "CERT").await.unwrap();
        tokio::fs::write(&key, "KEY").await.unwrap();

        let args = ProvisionArgs {
            certificate: Some(cert),
            private_key: Some(key),
            symmetric_key: None,
            endorsement_key: None,
            storage_root_key: None,
            ..args()
        };
        let credential = read_credential(&args).await.unwrap();
        assert_eq!(credential.kind(), CredentialKind::Certificate);
        assert_eq!(credential.tls_identity().unwrap().pem(), b"KEY\nCERT");
    }

    #[tokio::test]
    async fn it_rejects_invalid_keys() {
        let args = ProvisionArgs {
            endorsement_key: Some("not base64!".into()),
            ..args()
        };
        assert!(matches!(
            read_credential(&args).await,
            Err(ProvisionError::InvalidKey("endorsement-key", _))
        ));
    }

    #[tokio::test]
    async fn missing_certificate_files_are_reported() {
        let args = ProvisionArgs {
            certificate: Some("/nonexistent/cert.pem".into()),
            private_key: Some("/nonexistent/key.pem".into()),
            ..args()
        };
        assert!(matches!(
            read_credential(&args).await,
            Err(ProvisionError::ReadCredential(_, _))
        ));
    }
}
