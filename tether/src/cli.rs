use clap::{Args, Parser, Subcommand};
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use crate::provisioning::GLOBAL_ENDPOINT;
use crate::util::http::Uri;

fn parse_duration(s: &str) -> Result<Duration, ParseIntError> {
    let millis: u64 = s.parse()?;
    Ok(Duration::from_millis(millis))
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Register this device and print its hub assignment
    Provision(ProvisionArgs),

    /// Remove the stored hub assignment
    Forget,
}

#[derive(Clone, Debug, Args)]
pub struct ProvisionArgs {
    /// Id scope of the provisioning service instance
    #[arg(env = "TETHER_SCOPE_ID", long = "scope-id", value_name = "id")]
    pub scope_id: String,

    /// Registration id of this device
    #[arg(
        env = "TETHER_REGISTRATION_ID",
        long = "registration-id",
        value_name = "id"
    )]
    pub registration_id: String,

    /// Provisioning service endpoint URI
    #[arg(
        env = "TETHER_ENDPOINT",
        long = "endpoint",
        value_name = "uri",
        default_value = GLOBAL_ENDPOINT
    )]
    pub endpoint: Uri,

    /// PEM file with the device certificate chain
    #[arg(
        env = "TETHER_CERTIFICATE",
        long = "certificate",
        value_name = "path",
        requires = "private_key",
        conflicts_with = "symmetric_key",
        required_unless_present = "symmetric_key"
    )]
    pub certificate: Option<PathBuf>,

    /// PEM file with the private key of the device certificate
    #[arg(
        env = "TETHER_PRIVATE_KEY",
        long = "private-key",
        value_name = "path",
        requires = "certificate"
    )]
    pub private_key: Option<PathBuf>,

    /// Base64 encoded device key for key based authentication
    #[arg(env = "TETHER_SYMMETRIC_KEY", long = "symmetric-key", value_name = "key")]
    pub symmetric_key: Option<String>,

    /// Base64 encoded endorsement key, answers the TPM challenge instead
    /// of signing with the device key
    #[arg(
        env = "TETHER_ENDORSEMENT_KEY",
        long = "endorsement-key",
        value_name = "key",
        requires = "symmetric_key",
        requires = "storage_root_key"
    )]
    pub endorsement_key: Option<String>,

    /// Base64 encoded storage root key, used with the endorsement key
    #[arg(
        env = "TETHER_STORAGE_ROOT_KEY",
        long = "storage-root-key",
        value_name = "key",
        requires = "symmetric_key",
        requires = "endorsement_key"
    )]
    pub storage_root_key: Option<String>,

    /// Wait between registration status polls in milliseconds
    #[arg(
        env = "TETHER_POLL_INTERVAL_MS",
        long = "poll-interval-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub poll_interval: Option<Duration>,

    /// Upper bound for the registration request in milliseconds
    #[arg(
        env = "TETHER_REGISTER_TIMEOUT_MS",
        long = "register-timeout-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub register_timeout: Option<Duration>,

    /// Provision again even if an assignment is stored
    #[arg(env = "TETHER_FORCE", long = "force")]
    pub force: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}
