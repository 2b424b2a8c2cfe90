// src/domain/serializer.rs

//! Serialization collaborator.
//!
//! Converts between the generic [`WireValue`] tree and frame bytes. The
//! session never looks inside a frame; it hands every outbound message to
//! `serialize()` and every inbound frame to `deserialize()`.

use std::sync::Arc;

use bytes::Bytes;

use crate::{Result, WireValue};

/// Frame serialization format.
///
/// Implementations report failures as
/// [`WampError::Format`](crate::WampError::Format).
pub trait Serializer: Send + Sync {
    // ---
    /// Subprotocol style name of the format, e.g. `"json"`.
    fn name(&self) -> &str;

    /// Encode one message value into a frame.
    fn serialize(&self, value: &WireValue) -> Result<Bytes>;

    /// Decode one frame into a message value.
    fn deserialize(&self, frame: &[u8]) -> Result<WireValue>;
}

/// Shared serializer pointer.
pub type SerializerPtr = Arc<dyn Serializer>;
