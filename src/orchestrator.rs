//! Client-side driver: SSE body in, callbacks out.
//!
//! [`StreamSession`] is the synchronous core (bytes → frames → classifier →
//! extractor). [`stream_chat_response`] wraps it with transport, timeout and
//! cancellation.

use crate::api::client::StreamSource;
use crate::api::logging::{emit_stream_complete, emit_stream_failure};
use crate::api::stream::SseFrameReader;
use crate::error::{ErrorKind, StreamError, UpdateParseError};
use crate::extract::{extract_update, Extraction};
use crate::phase::StreamRequest;
use crate::state::{Classifier, KeywordWatch};
use crate::types::{DoneFrame, ExtractedUpdate, FrameKind, OutOfBandEvent, UpdateKind};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receives the user-visible results of one streamed response.
///
/// `on_chunk` carries only text that is safe to show. `on_complete` fires at
/// most once, after the last `on_chunk`, and never after `on_error`.
pub trait StreamCallbacks {
    fn on_chunk(&mut self, text: &str);

    fn on_progress_update(&mut self, _event: &OutOfBandEvent) {}

    fn on_complete(&mut self, update: Option<&ExtractedUpdate>, text: &str);

    fn on_error(&mut self, _error: &StreamError) {}
}

/// Channel form of [`StreamCallbacks`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    Chunk(String),
    Progress(OutOfBandEvent),
    Complete {
        update: Option<ExtractedUpdate>,
        text: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl StreamCallbacks for mpsc::UnboundedSender<StreamUpdate> {
    fn on_chunk(&mut self, text: &str) {
        let _ = self.send(StreamUpdate::Chunk(text.to_string()));
    }

    fn on_progress_update(&mut self, event: &OutOfBandEvent) {
        let _ = self.send(StreamUpdate::Progress(event.clone()));
    }

    fn on_complete(&mut self, update: Option<&ExtractedUpdate>, text: &str) {
        let _ = self.send(StreamUpdate::Complete {
            update: update.cloned(),
            text: text.to_string(),
        });
    }

    fn on_error(&mut self, error: &StreamError) {
        let _ = self.send(StreamUpdate::Error {
            kind: error.kind(),
            message: error.user_message().to_string(),
        });
    }
}

/// Result of a completed stream, mirroring the final `on_complete` call.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub update: Option<ExtractedUpdate>,
    pub text: String,
    /// Set when an update block was present but could not be parsed.
    pub parse_error: Option<UpdateParseError>,
}

pub struct StreamSession {
    reader: SseFrameReader,
    classifier: Classifier,
    kinds: Vec<UpdateKind>,
    done: Option<DoneFrame>,
}

impl StreamSession {
    pub fn new(watch: KeywordWatch, kinds: Vec<UpdateKind>) -> Self {
        Self {
            reader: SseFrameReader::new(),
            classifier: Classifier::new(watch),
            kinds,
            done: None,
        }
    }

    pub fn for_request(request: &StreamRequest) -> Self {
        Self::new(request.watch.clone(), request.kinds.clone())
    }

    /// True once a terminal frame has been seen; later bytes are ignored.
    pub fn is_done(&self) -> bool {
        self.done.is_some()
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Feeds one chunk of the response body.
    ///
    /// An error frame from the server ends the session with
    /// [`StreamError::Server`].
    pub fn feed<C>(&mut self, bytes: &[u8], callbacks: &mut C) -> Result<(), StreamError>
    where
        C: StreamCallbacks + ?Sized,
    {
        if self.is_done() {
            return Ok(());
        }
        for frame in self.reader.process(bytes) {
            self.apply(frame.classify(), callbacks)?;
            if self.is_done() {
                break;
            }
        }
        Ok(())
    }

    /// Ends the stream: runs extraction and reports the outcome through
    /// `on_complete`.
    pub fn finish<C>(mut self, callbacks: &mut C) -> Result<StreamOutcome, StreamError>
    where
        C: StreamCallbacks + ?Sized,
    {
        if !self.is_done() {
            for frame in self.reader.finish() {
                self.apply(frame.classify(), callbacks)?;
                if self.is_done() {
                    break;
                }
            }
        }

        let buffer = self.classifier.buffer().to_string();
        let outcome = match extract_update(&buffer, &self.kinds) {
            Extraction::Found {
                update,
                span,
                fenced,
            } => {
                let tail = self.classifier.finish();
                if !tail.is_empty() {
                    callbacks.on_chunk(&tail);
                }
                let text = if fenced {
                    self.classifier.revealed().to_string()
                } else {
                    format!("{}{}", &buffer[..span.start], &buffer[span.end..])
                };
                StreamOutcome {
                    update: Some(update),
                    text,
                    parse_error: None,
                }
            }
            // The raw text (block included) goes out once, through
            // on_complete only.
            Extraction::Failed(error) => StreamOutcome {
                update: None,
                text: buffer.clone(),
                parse_error: Some(error),
            },
            Extraction::None => {
                let tail = self.classifier.finish();
                if !tail.is_empty() {
                    callbacks.on_chunk(&tail);
                }
                let server_update = self
                    .done
                    .as_ref()
                    .and_then(|done| server_update(done, &self.kinds));
                let relayed_text = self
                    .done
                    .as_ref()
                    .and_then(server_text)
                    .filter(|text| !text.is_empty());
                match relayed_text {
                    Some(text) if buffer.trim().is_empty() => StreamOutcome {
                        update: server_update,
                        text,
                        parse_error: None,
                    },
                    // A relay that could not parse the block sends the raw
                    // text back while the block itself never reached us.
                    Some(text) if server_update.is_none() => {
                        match extract_update(&text, &self.kinds) {
                            Extraction::Failed(error) => StreamOutcome {
                                update: None,
                                text,
                                parse_error: Some(error),
                            },
                            _ => StreamOutcome {
                                update: None,
                                text: self.classifier.revealed().to_string(),
                                parse_error: None,
                            },
                        }
                    }
                    _ => StreamOutcome {
                        update: server_update,
                        text: self.classifier.revealed().to_string(),
                        parse_error: None,
                    },
                }
            }
        };

        callbacks.on_complete(outcome.update.as_ref(), &outcome.text);
        Ok(outcome)
    }

    fn apply<C>(&mut self, frame: FrameKind, callbacks: &mut C) -> Result<(), StreamError>
    where
        C: StreamCallbacks + ?Sized,
    {
        match frame {
            FrameKind::Text(text) => {
                let visible = self.classifier.push(&text);
                if !visible.is_empty() {
                    callbacks.on_chunk(&visible);
                }
            }
            FrameKind::Event(event) => callbacks.on_progress_update(&event),
            FrameKind::Done(done) => self.done = Some(done),
            FrameKind::Error(message) => return Err(StreamError::Server(message)),
            FrameKind::Ignored => {}
        }
        Ok(())
    }
}

/// Update already extracted by the server and carried on the `done` frame.
fn server_update(done: &DoneFrame, kinds: &[UpdateKind]) -> Option<ExtractedUpdate> {
    let data = done.data.as_ref().filter(|data| !data.is_null())?;
    let frame_type = done.frame_type.as_deref()?;
    if !matches!(frame_type, "update" | "analysis" | "appraisal_update") {
        return None;
    }

    if let Some(kind) = done.kind.as_deref().and_then(UpdateKind::from_key) {
        return Some(ExtractedUpdate {
            kind,
            payload: data.clone(),
        });
    }

    if let Value::Object(map) = data {
        let keyed = UpdateKind::PRECEDENCE
            .into_iter()
            .filter(|kind| kinds.contains(kind))
            .find_map(|kind| {
                map.get(kind.key()).map(|payload| ExtractedUpdate {
                    kind,
                    payload: payload.clone(),
                })
            });
        if keyed.is_some() {
            return keyed;
        }
    }

    let kind = match frame_type {
        "analysis" => Some(UpdateKind::FinalMarketAnalysis),
        "appraisal_update" => Some(UpdateKind::AppraisalUpdate),
        _ => kinds.first().copied(),
    }?;
    Some(ExtractedUpdate {
        kind,
        payload: data.clone(),
    })
}

fn server_text(done: &DoneFrame) -> Option<String> {
    if done.frame_type.as_deref() != Some("text") {
        return None;
    }
    match done.data.as_ref()? {
        Value::String(text) => Some(text.trim().to_string()),
        _ => None,
    }
}

/// Streams one request through `source`, reporting progress to `callbacks`.
///
/// The whole call, connection included, is bounded by `request.timeout`.
/// Cancellation ends the call without `on_error` or `on_complete`; text
/// already revealed stays revealed.
pub async fn stream_chat_response<S, C>(
    source: &S,
    request: &StreamRequest,
    callbacks: &mut C,
    cancel: &CancellationToken,
) -> Result<StreamOutcome, StreamError>
where
    S: StreamSource + ?Sized,
    C: StreamCallbacks + ?Sized,
{
    let result = drive(source, request, callbacks, cancel).await;
    match &result {
        Ok(outcome) => emit_stream_complete(
            &request.url,
            outcome.update.as_ref().map(|update| update.kind.key()),
            outcome.text.len(),
        ),
        Err(StreamError::Cancelled) => {}
        Err(error) => {
            emit_stream_failure(&request.url, error);
            callbacks.on_error(error);
        }
    }
    result
}

async fn drive<S, C>(
    source: &S,
    request: &StreamRequest,
    callbacks: &mut C,
    cancel: &CancellationToken,
) -> Result<StreamOutcome, StreamError>
where
    S: StreamSource + ?Sized,
    C: StreamCallbacks + ?Sized,
{
    let deadline = tokio::time::sleep(request.timeout);
    tokio::pin!(deadline);

    let mut body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(StreamError::Cancelled),
        _ = &mut deadline => return Err(StreamError::Timeout(request.timeout)),
        opened = source.open(request) => opened?,
    };

    let mut session = StreamSession::for_request(request);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            _ = &mut deadline => return Err(StreamError::Timeout(request.timeout)),
            next = body.next() => match next {
                Some(Ok(bytes)) => {
                    session.feed(&bytes, callbacks)?;
                    if session.is_done() {
                        break;
                    }
                }
                Some(Err(error)) => return Err(error),
                None => break,
            },
        }
    }

    session.finish(callbacks)
}
