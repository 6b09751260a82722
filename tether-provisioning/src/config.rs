use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::util::json::{deserialize_duration_from_ms, serialize_duration_to_ms};

use super::error::ProvisioningError;

/// Provisioning attempt configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProvisioningConfig {
    /// Id scope of the provisioning service instance
    pub scope_id: String,

    /// Upper bound for the whole register phase. This is a safety valve
    /// against a service that never answers rather than a tight timeout.
    #[serde(
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub register_timeout: Duration,

    /// Upper bound for a single status poll
    #[serde(
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub status_timeout: Duration,

    /// Wait between status polls, unless the service asks for a
    /// different one
    #[serde(
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub poll_interval: Duration,

    /// Shortest wait between status polls, applied to the delay the
    /// service asks for
    #[serde(
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub poll_min_interval: Duration,

    /// Validity of the SAS tokens built for key based authentication
    #[serde(
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub sas_token_ttl: Duration,
}

impl ProvisioningConfig {
    pub fn new(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            register_timeout: Duration::from_millis(1_000_000),
            status_timeout: Duration::from_millis(10_000),
            poll_interval: Duration::from_millis(10_000),
            poll_min_interval: Duration::from_millis(1_000),
            sas_token_ttl: Duration::from_secs(3600),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ProvisioningError> {
        if self.scope_id.trim().is_empty() {
            return Err(ProvisioningError::Configuration(
                "scope id cannot be empty".into(),
            ));
        }

        for (name, value) in [
            ("register timeout", self.register_timeout),
            ("status timeout", self.status_timeout),
            ("poll interval", self.poll_interval),
            ("minimum poll interval", self.poll_min_interval),
            ("SAS token TTL", self.sas_token_ttl),
        ] {
            if value.is_zero() {
                return Err(ProvisioningError::Configuration(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        // expiry is computed in whole seconds
        if self.sas_token_ttl.as_secs() == 0 {
            return Err(ProvisioningError::Configuration(
                "SAS token TTL must be at least one second".into(),
            ));
        }

        Ok(())
    }

    /// Wait before the next status poll given the service retry hint
    pub(crate) fn poll_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|hint| hint.max(self.poll_min_interval))
            .unwrap_or(self.poll_interval)
    }
}
