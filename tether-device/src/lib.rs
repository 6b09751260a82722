/*
Everything needed to keep a device connected to its hub.

The connection pump owns the logical connection state of a device, drives
the periodic send and receive work of a wire-protocol transport and reacts
to connectivity changes reported by that transport. Wire codecs are not
implemented here, they plug in through the `Transport` trait.
*/

mod config;
mod error;
mod message;
mod pump;
mod state;
mod transport;

pub use config::PumpConfig;
pub use error::PumpError;
pub use message::Message;
pub use pump::ConnectionPump;
pub use state::{ConnectionState, Effect, Event, Lifecycle, transition};
pub use transport::{
    DeliveryStatus, EventCallback, Protocol, StatusChange, StatusChangeReason, StatusListener,
    Transport, TransportError,
};

use tether_util as util;
