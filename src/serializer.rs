//! Concrete serialization formats.

use bytes::Bytes;

use crate::{Result, Serializer, WampError, WireValue};

/// JSON frames via `serde_json`.
///
/// The default format of a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    // ---
    fn name(&self) -> &str {
        "json"
    }

    fn serialize(&self, value: &WireValue) -> Result<Bytes> {
        // ---
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| WampError::Format(e.to_string()))
    }

    fn deserialize(&self, frame: &[u8]) -> Result<WireValue> {
        // ---
        serde_json::from_slice(frame).map_err(|e| WampError::Format(e.to_string()))
    }
}
