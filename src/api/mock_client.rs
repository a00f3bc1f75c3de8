use crate::api::client::{ByteStream, StreamSource};
use crate::error::StreamError;
use crate::phase::StreamRequest;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::sync::{Arc, Mutex};

/// Canned response for one call to [`MockStreamSource::open`].
#[derive(Clone)]
pub enum MockResponse {
    /// SSE messages; each is framed with a trailing blank line if missing.
    Frames(Vec<String>),
    /// Raw body chunks, sent exactly as given.
    Raw(Vec<Vec<u8>>),
    /// Sends the messages, then never ends.
    Stall(Vec<String>),
    /// `open` fails with this error.
    Fail(Arc<dyn Fn() -> StreamError + Send + Sync>),
}

impl MockResponse {
    pub fn frames<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MockResponse::Frames(messages.into_iter().map(Into::into).collect())
    }

    /// Text chunks wrapped as `{"chunk": ...}` frames, ended by `{"done": true}`.
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut messages: Vec<String> = chunks
            .into_iter()
            .map(|chunk| format!("data: {}", serde_json::json!({ "chunk": chunk.as_ref() })))
            .collect();
        messages.push("data: {\"done\":true}".to_string());
        MockResponse::Frames(messages)
    }
}

/// [`StreamSource`] that replays queued responses in order.
#[derive(Clone, Default)]
pub struct MockStreamSource {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    requests: Arc<Mutex<Vec<StreamRequest>>>,
}

impl MockStreamSource {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::default(),
        }
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StreamSource for MockStreamSource {
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, StreamError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| (!responses.is_empty()).then(|| responses.remove(0)));
        let Some(response) = next else {
            return Err(StreamError::Server(
                "MockStreamSource: no more responses configured".to_string(),
            ));
        };

        match response {
            MockResponse::Frames(messages) => Ok(Box::pin(stream::iter(framed(messages)))),
            MockResponse::Raw(chunks) => Ok(Box::pin(stream::iter(
                chunks.into_iter().map(|chunk| Ok(Bytes::from(chunk))),
            ))),
            MockResponse::Stall(messages) => Ok(Box::pin(
                stream::iter(framed(messages)).chain(stream::pending()),
            )),
            MockResponse::Fail(make_error) => Err(make_error()),
        }
    }
}

fn framed(messages: Vec<String>) -> Vec<Result<Bytes, StreamError>> {
    messages
        .into_iter()
        .map(|message| {
            let framed = if message.ends_with("\n\n") {
                message
            } else {
                format!("{message}\n\n")
            };
            Ok(Bytes::from(framed))
        })
        .collect()
}

impl std::fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockResponse::Frames(messages) => f.debug_tuple("Frames").field(messages).finish(),
            MockResponse::Raw(chunks) => f.debug_tuple("Raw").field(&chunks.len()).finish(),
            MockResponse::Stall(messages) => f.debug_tuple("Stall").field(messages).finish(),
            MockResponse::Fail(_) => f.write_str("Fail"),
        }
    }
}
