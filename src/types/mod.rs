pub mod frame;
pub mod update;

pub use frame::{DoneFrame, FrameKind, OutOfBandEvent, RawFrame, PROGRESS_UPDATE};
pub use update::{ExtractedUpdate, UpdateKind};
