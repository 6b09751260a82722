use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("key is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// PEM encoded client certificate chain and private key used for
/// mutual TLS
#[derive(Clone)]
pub struct TlsIdentity(Arc<[u8]>);

impl TlsIdentity {
    /// The buffer must hold the private key and at least one certificate
    pub fn from_pem(pem: impl Into<Vec<u8>>) -> Self {
        let pem: Vec<u8> = pem.into();
        Self(pem.into())
    }

    pub fn pem(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TlsIdentity").field(&"<redacted>").finish()
    }
}

/// A security provider able to answer the key based challenge.
///
/// This is what a TPM offers: public endorsement and storage root keys,
/// signing with a key that never leaves the provider, and importing the key
/// issued by the service.
pub trait KeySecurity: Send + Sync {
    fn registration_id(&self) -> &str;

    fn endorsement_key(&self) -> Vec<u8>;

    fn storage_root_key(&self) -> Vec<u8>;

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SecurityError>;

    fn import_key(&self, key: &[u8]) -> Result<(), SecurityError>;

    fn tls_identity(&self) -> Option<TlsIdentity> {
        None
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SecurityError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|err| SecurityError::InvalidKey(err.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Device key of a symmetric key enrollment.
///
/// SAS tokens are signed with it directly, without a challenge.
#[derive(Clone)]
pub struct DeviceKey(Arc<[u8]>);

impl DeviceKey {
    /// Read a base64 encoded device key
    pub fn from_base64(key: &str) -> Result<Self, SecurityError> {
        let key = STANDARD.decode(key.trim())?;
        if key.is_empty() {
            return Err(SecurityError::InvalidKey("key cannot be empty".into()));
        }
        Ok(Self(key.into()))
    }

    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SecurityError> {
        hmac_sha256(&self.0, data)
    }
}

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeviceKey").field(&"<redacted>").finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKind {
    Certificate,
    SymmetricKey,
    SymmetricKeyOrTpm,
}

/// How a device proves its identity to the provisioning service
#[derive(Clone)]
pub enum Credential {
    Certificate {
        registration_id: String,
        tls_identity: TlsIdentity,
    },
    /// Symmetric key enrollment, registers with a SAS token in one round trip
    SymmetricKey {
        registration_id: String,
        key: DeviceKey,
    },
    /// Challenge based enrollment answered by a key security provider
    SymmetricKeyOrTpm(Arc<dyn KeySecurity>),
}

impl Credential {
    pub fn registration_id(&self) -> &str {
        match self {
            Credential::Certificate {
                registration_id, ..
            }
            | Credential::SymmetricKey {
                registration_id, ..
            } => registration_id,
            Credential::SymmetricKeyOrTpm(security) => security.registration_id(),
        }
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::Certificate { .. } => CredentialKind::Certificate,
            Credential::SymmetricKey { .. } => CredentialKind::SymmetricKey,
            Credential::SymmetricKeyOrTpm(_) => CredentialKind::SymmetricKeyOrTpm,
        }
    }

    pub fn tls_identity(&self) -> Option<TlsIdentity> {
        match self {
            Credential::Certificate { tls_identity, .. } => Some(tls_identity.clone()),
            Credential::SymmetricKey { .. } => None,
            Credential::SymmetricKeyOrTpm(security) => security.tls_identity(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind())
            .field("registration_id", &self.registration_id())
            .finish()
    }
}

/// Software emulation of a TPM style key security provider.
///
/// Signs with HMAC-SHA256. Importing a key replaces the signing key, which
/// is how the service hands out the key to use from then on.
pub struct SymmetricKeySecurity {
    registration_id: String,
    endorsement_key: Vec<u8>,
    storage_root_key: Vec<u8>,
    key: Mutex<Vec<u8>>,
}

impl SymmetricKeySecurity {
    /// Create a provider from a base64 encoded device key
    pub fn new(
        registration_id: impl Into<String>,
        key: &str,
        endorsement_key: Vec<u8>,
        storage_root_key: Vec<u8>,
    ) -> Result<Self, SecurityError> {
        let key = STANDARD.decode(key.trim())?;
        if key.is_empty() {
            return Err(SecurityError::InvalidKey("key cannot be empty".into()));
        }

        Ok(Self {
            registration_id: registration_id.into(),
            endorsement_key,
            storage_root_key,
            key: Mutex::new(key),
        })
    }
}

impl KeySecurity for SymmetricKeySecurity {
    fn registration_id(&self) -> &str {
        &self.registration_id
    }

    fn endorsement_key(&self) -> Vec<u8> {
        self.endorsement_key.clone()
    }

    fn storage_root_key(&self) -> Vec<u8> {
        self.storage_root_key.clone()
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let key = self.key.lock().unwrap_or_else(PoisonError::into_inner);
        hmac_sha256(&key, data)
    }

    fn import_key(&self, key: &[u8]) -> Result<(), SecurityError> {
        if key.is_empty() {
            return Err(SecurityError::InvalidKey(
                "imported key cannot be empty".into(),
            ));
        }
        *self.key.lock().unwrap_or_else(PoisonError::into_inner) = key.to_vec();
        Ok(())
    }
}
