//! Domain layer public interface.
//!
//! This module defines the collaborator abstractions the session core
//! depends on: the frame transport and the serialization format. Both are
//! independent of any concrete socket library or wire encoding.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod serializer;
mod transport;

// --- Serializer domain re-exports ---

pub use serializer::{Serializer, SerializerPtr};

// --- Transport domain re-exports ---

pub use transport::{
    //
    FrameHandle,
    Transport,
    TransportBase,
    TransportEvent,
    TransportPtr,
};
