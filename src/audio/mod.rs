pub mod backend;
pub mod file;
pub mod recorder;
pub mod store;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, SilenceBackend,
};
pub use file::{AudioFile, FileBackend};
pub use recorder::{Microphone, Recording, SliceArtifact, WavMicrophone};
pub use store::{FsSliceStore, SliceStore};
