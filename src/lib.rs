//! Streaming chat responses with hidden, machine-readable update blocks.

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod orchestrator;
pub mod phase;
pub mod relay;
pub mod state;
#[doc(hidden)]
pub mod test_support;
pub mod types;
pub mod util;

pub use error::{ErrorKind, StreamError, UpdateParseError};
pub use orchestrator::{
    stream_chat_response, StreamCallbacks, StreamOutcome, StreamSession, StreamUpdate,
};
pub use phase::{Phase, PhaseContext, StreamRequest};
pub use types::{ExtractedUpdate, UpdateKind};
