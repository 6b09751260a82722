use std::collections::BTreeMap;

use crate::util::crypto::{ALPHA_NUM, pseudorandom_string};

/// A device-to-cloud message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    body: Vec<u8>,
    message_id: String,
    connection_device_id: Option<String>,
    properties: BTreeMap<String, String>,
}

impl Message {
    /// Create a message with a random message id
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            message_id: pseudorandom_string(ALPHA_NUM, 32),
            connection_device_id: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Id of the device this message is sent on behalf of, when several
    /// devices share one connection
    pub fn connection_device_id(&self) -> Option<&str> {
        self.connection_device_id.as_deref()
    }

    pub(crate) fn set_connection_device_id(&mut self, connection_device_id: Option<String>) {
        self.connection_device_id = connection_device_id;
    }
}
