use tracing::{Span, field, instrument};

use super::contract::{ProvisioningContract, RequestData};
use super::error::ProvisioningError;
use super::mailbox::channel;
use super::model::RegistrationResponse;
use super::register::Authorization;

/// Query the registration operation once.
///
/// The request is authorized with whatever the register step established.
/// Polling cadence is left to the caller.
#[instrument(skip_all, fields(operation_id = %operation_id, status = field::Empty), err)]
pub async fn poll(
    contract: &dyn ProvisioningContract,
    registration_id: &str,
    operation_id: &str,
    authorization: &Authorization,
) -> Result<RegistrationResponse, ProvisioningError> {
    let (responder, mailbox) = channel();
    contract.get_registration_status(
        RequestData {
            registration_id: registration_id.to_owned(),
            operation_id: Some(operation_id.to_owned()),
            sas_token: authorization.sas_token.clone(),
            tls_identity: authorization.tls_identity.clone(),
            ..Default::default()
        },
        responder,
    )?;

    let response = mailbox.wait().await?;
    let mut registration = RegistrationResponse::from_slice(&response.body)?;
    registration.retry_after = response.retry_after;

    if let Some(status) = &registration.status {
        Span::current().record("status", field::display(status));
    }
    Ok(registration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::TlsIdentity;
    use crate::mailbox::ContractResponse;
    use crate::testing::{FakeContract, Reply, json_reply};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn it_polls_once_with_the_established_authorization() {
        let contract = FakeContract::new();
        contract.on_status(json_reply(json!({
            "operationId": "op-1",
            "status": "assigned",
            "registrationState": { "assignedHub": "hub1.example.net", "deviceId": "dev1" }
        })));

        let authorization = Authorization {
            tls_identity: Some(TlsIdentity::from_pem(b"pem".to_vec())),
            sas_token: Some("token".into()),
        };
        let response = poll(&contract, "dev1", "op-1", &authorization)
            .await
            .unwrap();
        assert_eq!(response.status.as_deref(), Some("assigned"));

        let requests = contract.requests();
        assert_eq!(requests.len(), 1);
        let (kind, request) = &requests[0];
        assert_eq!(*kind, "get_registration_status");
        assert_eq!(request.registration_id, "dev1");
        assert_eq!(request.operation_id.as_deref(), Some("op-1"));
        assert_eq!(request.sas_token.as_deref(), Some("token"));
        assert!(request.tls_identity.is_some());
        assert!(request.payload.is_none());
    }

    #[tokio::test]
    async fn it_keeps_the_retry_hint() {
        let contract = FakeContract::new();
        contract.on_status(Reply::Body(
            ContractResponse::new(br#"{"operationId":"op-1","status":"assigning"}"#.to_vec())
                .with_retry_after(Duration::from_secs(2)),
        ));

        let response = poll(&contract, "dev1", "op-1", &Authorization::default())
            .await
            .unwrap();
        assert_eq!(response.retry_after, Some(Duration::from_secs(2)));
    }
}
