/*
Registration of a device with a provisioning service.

A device proves its identity to the service with a client certificate or
with a SAS token, signed either by its device key or by a key issued
through a TPM style challenge. It then polls the resulting registration
operation until the service assigns it to a hub.
The `Provisioner` drives that whole exchange in the background and reports
progress through callbacks.
*/

mod config;
mod contract;
mod credential;
mod error;
mod https;
mod mailbox;
mod model;
mod provisioner;
mod register;
mod sas;
mod status;

#[cfg(test)]
mod testing;

pub use config::ProvisioningConfig;
pub use contract::{ContractError, ProvisioningContract, RequestData};
pub use credential::{
    Credential, CredentialKind, DeviceKey, KeySecurity, SecurityError, SymmetricKeySecurity,
    TlsIdentity,
};
pub use error::ProvisioningError;
pub use https::{GLOBAL_ENDPOINT, HttpsContract};
pub use mailbox::{ContractResponse, Mailbox, Responder, channel};
pub use model::{
    DeviceRegistration, NonceResponse, ProvisioningStatus, RegistrationResponse,
    RegistrationState,
};
pub use provisioner::{
    ClientLifecycleStatus, Provisioner, RegistrationCallback, RegistrationOutcome, StatusCallback,
};
pub use register::{Authorization, register};
pub use sas::build_sas_token;
pub use status::poll;

use tether_util as util;
