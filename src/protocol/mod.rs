//! Wire protocol spoken with the analysis backend
//!
//! Control messages are JSON text tagged with `MESSAGE_TYPE`; every `FRAME`
//! header is immediately followed by one binary message carrying the payload.

pub mod messages;

pub use messages::{AckMessage, ClientMessage, FrameHeader, ServerMessage};
