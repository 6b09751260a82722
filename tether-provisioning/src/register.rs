use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use tracing::{debug, instrument};

use super::config::ProvisioningConfig;
use super::contract::{ContractError, ProvisioningContract, RequestData};
use super::credential::{Credential, KeySecurity, SecurityError, TlsIdentity};
use super::error::ProvisioningError;
use super::mailbox::channel;
use super::model::{DeviceRegistration, NonceResponse, RegistrationResponse};
use super::sas::{build_sas_token, expiry_from_now};

/// What the register step established for authorizing later requests
#[derive(Clone, Debug, Default)]
pub struct Authorization {
    pub tls_identity: Option<TlsIdentity>,
    pub sas_token: Option<String>,
}

/// Register the device with the provisioning service.
///
/// Certificate credentials register in a single round trip over mutual TLS
/// and device keys in a single round trip with a SAS token they sign.
/// Key security providers first request a challenge and import the key it
/// carries, then register again with a SAS token signed by that key.
/// Whatever was used to authenticate is left in `authorization`.
#[instrument(
    skip_all,
    fields(registration_id = credential.registration_id(), kind = ?credential.kind()),
    err
)]
pub async fn register(
    config: &ProvisioningConfig,
    credential: &Credential,
    contract: &dyn ProvisioningContract,
    authorization: &mut Authorization,
) -> Result<RegistrationResponse, ProvisioningError> {
    match credential {
        Credential::Certificate {
            registration_id,
            tls_identity,
        } => {
            authorization.tls_identity = Some(tls_identity.clone());
            let payload = serde_json::to_vec(&DeviceRegistration::new(registration_id))?;

            let (responder, mailbox) = channel();
            contract.authenticate(
                RequestData {
                    registration_id: registration_id.clone(),
                    payload: Some(payload),
                    tls_identity: Some(tls_identity.clone()),
                    ..Default::default()
                },
                responder,
            )?;
            let response = mailbox.wait().await?;
            debug!("registration accepted");

            Ok(RegistrationResponse::from_slice(&response.body)?)
        }
        Credential::SymmetricKey {
            registration_id,
            key,
        } => {
            let payload = serde_json::to_vec(&DeviceRegistration::new(registration_id))?;
            let expiry = expiry_from_now(config.sas_token_ttl);
            let sas_token =
                build_sas_token(&config.scope_id, registration_id, expiry, |data| key.sign(data))?;

            debug!("registering with device key SAS token");
            register_with_sas_token(
                contract,
                RequestData {
                    registration_id: registration_id.clone(),
                    payload: Some(payload),
                    sas_token: Some(sas_token),
                    ..Default::default()
                },
                authorization,
            )
            .await
        }
        Credential::SymmetricKeyOrTpm(security) => {
            register_with_key(config, security.as_ref(), contract, authorization).await
        }
    }
}

async fn register_with_sas_token(
    contract: &dyn ProvisioningContract,
    request: RequestData,
    authorization: &mut Authorization,
) -> Result<RegistrationResponse, ProvisioningError> {
    let sas_token = request.sas_token.clone();

    let (responder, mailbox) = channel();
    contract.authenticate(request, responder)?;
    let response = match mailbox.wait().await {
        Ok(response) => response,
        Err(ProvisioningError::Contract(ContractError::Status(StatusCode::UNAUTHORIZED, msg))) => {
            return Err(ProvisioningError::Authentication(format!(
                "service did not authorize SAS token: {msg}"
            )));
        }
        Err(err) => return Err(err),
    };

    authorization.sas_token = sas_token;
    Ok(RegistrationResponse::from_slice(&response.body)?)
}

async fn register_with_key(
    config: &ProvisioningConfig,
    security: &dyn KeySecurity,
    contract: &dyn ProvisioningContract,
    authorization: &mut Authorization,
) -> Result<RegistrationResponse, ProvisioningError> {
    let registration_id = security.registration_id().to_owned();
    let payload = serde_json::to_vec(
        &DeviceRegistration::new(&registration_id)
            .with_keys(&security.endorsement_key(), &security.storage_root_key()),
    )?;
    let tls_identity = security.tls_identity();
    authorization.tls_identity = tls_identity.clone();

    debug!("requesting authentication key");
    let (responder, mailbox) = channel();
    contract.request_nonce(
        RequestData {
            registration_id: registration_id.clone(),
            payload: Some(payload.clone()),
            tls_identity: tls_identity.clone(),
            ..Default::default()
        },
        responder,
    )?;
    let nonce: NonceResponse = serde_json::from_slice(&mailbox.wait().await?.body)?;

    let key = nonce
        .authentication_key
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            ProvisioningError::Authentication("service did not send authentication key".into())
        })?;
    let key = STANDARD
        .decode(key.trim())
        .map_err(SecurityError::from)?;
    security.import_key(&key)?;

    let expiry = expiry_from_now(config.sas_token_ttl);
    let sas_token = build_sas_token(&config.scope_id, &registration_id, expiry, |data| {
        security.sign(data)
    })?;

    debug!("registering with SAS token");
    register_with_sas_token(
        contract,
        RequestData {
            registration_id,
            payload: Some(payload),
            sas_token: Some(sas_token),
            tls_identity,
            ..Default::default()
        },
        authorization,
    )
    .await
}
