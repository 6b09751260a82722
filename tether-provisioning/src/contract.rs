use reqwest::StatusCode;
use thiserror::Error;

use crate::util::http::InvalidUriError;

use super::credential::TlsIdentity;
use super::mailbox::Responder;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("invalid request: {0}")]
    InvalidArgument(String),

    #[error("invalid service endpoint: {0}")]
    InvalidUri(#[from] InvalidUriError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("service returned error: ({0}) {1}")]
    Status(StatusCode, String),

    #[error("unexpected service response: {0}")]
    Unexpected(String),

    #[error("contract unavailable: {0}")]
    Unavailable(String),
}

/// Everything a single request to the provisioning service needs
#[derive(Clone, Debug, Default)]
pub struct RequestData {
    pub registration_id: String,
    /// JSON encoded request body
    pub payload: Option<Vec<u8>>,
    pub operation_id: Option<String>,
    pub sas_token: Option<String>,
    pub tls_identity: Option<TlsIdentity>,
}

/// The provisioning service as seen by the registration flow.
///
/// Methods only submit the request and return. The response, or the reason
/// there is none, is delivered later through the responder, possibly from
/// another thread. An error returned directly means the request was never
/// sent.
pub trait ProvisioningContract: Send + Sync {
    /// Start a key based registration, the service answers with the
    /// authentication key challenge
    fn request_nonce(&self, request: RequestData, responder: Responder)
    -> Result<(), ContractError>;

    /// Register the device, optionally authorized with a SAS token
    fn authenticate(&self, request: RequestData, responder: Responder)
    -> Result<(), ContractError>;

    /// Query the state of a registration operation
    fn get_registration_status(
        &self,
        request: RequestData,
        responder: Responder,
    ) -> Result<(), ContractError>;
}
