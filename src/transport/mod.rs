//! Duplex connection plumbing
//!
//! - `socket`: transport-neutral connection traits
//! - `websocket`: tokio-tungstenite implementation
//! - `opener`: timeout + retry wrapper used to establish sessions

pub mod opener;
pub mod socket;
pub mod websocket;

pub use opener::{ConnectionOpener, OpenPolicy, OpenedConnection, ReadySignal};
pub use socket::{Socket, SocketEvent, Transport};
pub use websocket::{WsSocket, WsTransport};
