use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Registration request body
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistration {
    pub registration_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tpm: Option<TpmAttestation>,
}

/// Public keys of a key security provider, base64 encoded
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TpmAttestation {
    pub endorsement_key: String,
    pub storage_root_key: String,
}

impl DeviceRegistration {
    pub fn new(registration_id: impl Into<String>) -> Self {
        Self {
            registration_id: registration_id.into(),
            tpm: None,
        }
    }

    pub fn with_keys(mut self, endorsement_key: &[u8], storage_root_key: &[u8]) -> Self {
        self.tpm = Some(TpmAttestation {
            endorsement_key: STANDARD.encode(endorsement_key),
            storage_root_key: STANDARD.encode(storage_root_key),
        });
        self
    }
}

/// Answer to a register or status request
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub operation_id: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "registrationState")]
    pub registration_status: Option<RegistrationState>,

    /// Poll delay requested by the service, taken from the transport
    /// rather than the body
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationState {
    pub assigned_hub: Option<String>,
    pub device_id: Option<String>,
    pub error_message: Option<String>,
}

impl RegistrationResponse {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Service provided error message, if any
    pub fn error_message(&self) -> Option<&str> {
        self.registration_status
            .as_ref()
            .and_then(|state| state.error_message.as_deref())
    }
}

/// Challenge sent back by the service to a key based registration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub authentication_key: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningStatus {
    Unassigned,
    Failed,
    Blacklisted,
    Assigning,
    Assigned,
}

impl ProvisioningStatus {
    /// Parse a service status, ignoring case. Unknown values give `None`.
    pub fn from_str_ci(value: &str) -> Option<Self> {
        [
            ProvisioningStatus::Unassigned,
            ProvisioningStatus::Failed,
            ProvisioningStatus::Blacklisted,
            ProvisioningStatus::Assigning,
            ProvisioningStatus::Assigned,
        ]
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(value))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStatus::Unassigned => "unassigned",
            ProvisioningStatus::Failed => "failed",
            ProvisioningStatus::Blacklisted => "blacklisted",
            ProvisioningStatus::Assigning => "assigning",
            ProvisioningStatus::Assigned => "assigned",
        }
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
