//! Server side of the wire: upstream LLM text in, SSE frames out.
//!
//! Runs the same classifier and extractor as the client so update blocks never
//! reach the browser as `chunk` frames.

use crate::api::logging::emit_upstream_error;
use crate::extract::{extract_update, strip_update_blocks, Extraction};
use crate::state::{Classifier, KeywordWatch};
use crate::types::{RawFrame, UpdateKind};
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use serde_json::Value;
use std::fmt::Display;
use std::pin::Pin;

const RELAY_ERROR_MESSAGE: &str = "Failed to process request";

/// Encodes one frame as `data: <json>\n\n`.
pub fn encode_frame(frame: &RawFrame) -> Bytes {
    let json = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("data: {json}\n\n"))
}

struct RelayState<S> {
    upstream: Pin<Box<S>>,
    classifier: Classifier,
    kinds: Vec<UpdateKind>,
    /// Whitespace-only reveals held until the next non-blank one.
    pending_whitespace: String,
}

/// Re-streams upstream text as SSE, hiding update blocks.
///
/// Ends with a single terminal frame: the extracted update, the plain text,
/// or an error frame if the upstream fails.
pub fn relay<S, E>(
    upstream: S,
    watch: KeywordWatch,
    kinds: Vec<UpdateKind>,
) -> impl Stream<Item = Bytes> + Send
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = RelayState {
        upstream: Box::pin(upstream),
        classifier: Classifier::new(watch),
        kinds,
        pending_whitespace: String::new(),
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            match state.upstream.next().await {
                Some(Ok(text)) => {
                    let visible = state.classifier.push(&text);
                    if visible.is_empty() {
                        continue;
                    }
                    if visible.trim().is_empty() {
                        state.pending_whitespace.push_str(&visible);
                        continue;
                    }
                    let mut chunk = std::mem::take(&mut state.pending_whitespace);
                    chunk.push_str(&visible);
                    return Some((encode_frame(&RawFrame::text(chunk)), Some(state)));
                }
                Some(Err(error)) => {
                    emit_upstream_error(&error);
                    let frame = RawFrame::done(
                        "error",
                        None,
                        Value::String(RELAY_ERROR_MESSAGE.to_string()),
                    );
                    return Some((encode_frame(&frame), None));
                }
                None => return Some((finish(&mut state), None)),
            }
        }
    })
}

fn finish<S>(state: &mut RelayState<S>) -> Bytes {
    let buffer = state.classifier.buffer().to_string();
    let extraction = extract_update(&buffer, &state.kinds);

    let mut tail = std::mem::take(&mut state.pending_whitespace);
    if !matches!(extraction, Extraction::Failed(_)) {
        tail.push_str(&state.classifier.finish());
    }

    let terminal = match extraction {
        Extraction::Found { update, .. } => RawFrame::done(
            update.kind.done_type(),
            Some(update.kind.key()),
            update.payload,
        ),
        Extraction::Failed(_) => {
            RawFrame::done("text", None, Value::String(buffer.trim().to_string()))
        }
        Extraction::None => RawFrame::done(
            "text",
            None,
            Value::String(strip_update_blocks(&buffer, &state.kinds)),
        ),
    };

    let mut out = Vec::new();
    if !tail.is_empty() {
        out.extend_from_slice(&encode_frame(&RawFrame::text(tail)));
    }
    out.extend_from_slice(&encode_frame(&terminal));
    Bytes::from(out)
}
