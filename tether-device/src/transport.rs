use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::message::Message;
use super::state::ConnectionState;

/// Wire protocol spoken by a transport
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Https,
    Amqps,
    AmqpsWs,
    Mqtt,
    MqttWs,
}

impl Protocol {
    /// Whether receiving requires polling the hub rather than
    /// reading from a long-lived link
    pub fn is_polling(&self) -> bool {
        matches!(self, Protocol::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Https => "https",
            Protocol::Amqps => "amqps",
            Protocol::AmqpsWs => "amqps-ws",
            Protocol::Mqtt => "mqtt",
            Protocol::MqttWs => "mqtt-ws",
        };
        f.write_str(name)
    }
}

/// Why the transport changed its connection status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusChangeReason {
    ClientClose,
    ConnectionOk,
    NoNetwork,
    RetryExpired,
    BadCredential,
    ExpiredSasToken,
    CommunicationError,
}

/// A connection status change reported by the transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub status: ConnectionState,
    pub reason: StatusChangeReason,
    pub cause: Option<String>,
}

impl StatusChange {
    pub fn new(status: ConnectionState, reason: StatusChangeReason) -> Self {
        Self {
            status,
            reason,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

/// Outcome of delivering a single message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    Ok,
    Error,
    MessageExpired,
    MessageCancelledOnClose,
    Throttled,
    Unauthorized,
}

/// Invoked once with the delivery outcome of a queued message
pub type EventCallback = Box<dyn FnOnce(DeliveryStatus) + Send>;

/// Receives connection status changes, possibly from a transport thread
pub type StatusListener = Arc<dyn Fn(StatusChange) + Send + Sync>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    Refused(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A physical connection to the hub over some wire protocol.
///
/// Implementations queue messages on `add_message` and only put them on the
/// wire when `send_messages` is called. Connectivity changes are reported
/// through the listener installed with `set_status_listener`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, reconnecting: bool) -> Result<(), TransportError>;

    async fn close(&self, reason: StatusChangeReason, cause: Option<String>);

    fn add_message(
        &self,
        message: Message,
        callback: Option<EventCallback>,
        connection_device_id: Option<String>,
    );

    /// Flush queued messages
    async fn send_messages(&self);

    /// Receive and dispatch pending cloud-to-device messages
    async fn handle_messages(&self);

    fn protocol(&self) -> Protocol;

    fn is_open(&self) -> bool;

    fn set_status_listener(&self, listener: StatusListener);
}
