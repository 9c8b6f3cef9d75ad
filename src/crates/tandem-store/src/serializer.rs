//! Wire serialization for messages handed to a broker

use crate::error::Result;
use crate::message::Message;
use serde::{Deserialize, Serialize};

/// Protocol for turning values into transport bytes and back
///
/// Brokers use this to move [`Message`] values across process boundaries.
/// Every message, including ones embedded in another message's options,
/// must survive a `dumps`/`loads` round trip unchanged.
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;

    /// Encode a message for transport
    fn encode_message(&self, message: &Message) -> Result<Vec<u8>> {
        self.dumps(message)
    }

    /// Decode a message received from transport
    fn decode_message(&self, data: &[u8]) -> Result<Message> {
        self.loads(data)
    }
}

/// JSON-based serializer (default)
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}
