pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod session;
pub mod transport;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    FsSliceStore, Microphone, Recording, SliceArtifact, SliceStore, WavMicrophone,
};
pub use config::Config;
pub use error::{CodecError, ProtocolError, RecorderError, Result, StreamError};
pub use http::{create_router, AppState};
pub use protocol::{AckMessage, ClientMessage, FrameHeader, ServerMessage};
pub use session::{
    SessionEvent, SessionState, SessionStats, StartOptions, StreamingController,
    StreamingSettings,
};
pub use transport::{ConnectionOpener, OpenPolicy, Socket, SocketEvent, Transport, WsTransport};
