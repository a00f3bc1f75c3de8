pub mod classifier;
pub mod stream_block;

pub use classifier::{Classifier, KeywordWatch};
pub use stream_block::BlockState;
