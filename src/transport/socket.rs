use crate::error::Result;

/// Events observed on a duplex connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The platform reported the connection as open
    Opened,
    Text(String),
    Binary(Vec<u8>),
    /// Remote close or transport failure; no further events follow
    Closed(Option<String>),
}

/// A duplex message connection
///
/// Sends on a connection that is no longer open must complete without error.
#[async_trait::async_trait]
pub trait Socket: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<()>;

    /// Next inbound event, `None` once the event stream is exhausted
    async fn next_event(&mut self) -> Option<SocketEvent>;

    /// Best-effort readiness flag, polled while opening
    fn is_open(&self) -> bool;

    async fn close(&mut self);
}

/// Creates connections
///
/// `dial` starts connecting and may return before the connection is usable;
/// readiness is signalled through `SocketEvent::Opened`, the first inbound
/// message, or `Socket::is_open`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn dial(&self, url: &str) -> Result<Box<dyn Socket>>;
}
