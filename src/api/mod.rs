pub mod client;
pub mod logging;
pub mod mock_client;
pub mod stream;

pub use client::{ByteStream, ChatClient, StreamSource};
pub use mock_client::{MockResponse, MockStreamSource};
pub use stream::SseFrameReader;
