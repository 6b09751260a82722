use thiserror::Error;

use super::contract::ContractError;
use super::credential::SecurityError;

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("invalid provisioning configuration: {0}")]
    Configuration(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{0}")]
    Hub(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("provisioning service request failed: {0}")]
    Contract(#[from] ContractError),

    #[error("security provider failed: {0}")]
    Security(#[from] SecurityError),

    #[error("failed to decode service response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request was abandoned before a response arrived")]
    Interrupted,
}
