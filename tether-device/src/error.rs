use thiserror::Error;

use super::transport::TransportError;

#[derive(Debug, Error)]
pub enum PumpError {
    #[error("invalid pump configuration: {0}")]
    Configuration(String),

    #[error("failed to open transport: {0}")]
    TransportOpen(#[from] TransportError),

    #[error("connection is not open")]
    NotOpen,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
