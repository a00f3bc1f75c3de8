use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded `data: <json>` SSE message, as it appears on the wire.
///
/// The wire carries several loosely-related shapes (`{chunk}`, `{done}`,
/// `{type, data}`, `{type: "content", content}`, `{error}`), so every field is
/// optional here and [`RawFrame::classify`] resolves the single meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub frame_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Update key attached by the relay to its terminal frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    /// Text to append to the accumulated response.
    Text(String),
    /// Out-of-band event (`progress_update`, `thinking`, `sources`, ...).
    Event(OutOfBandEvent),
    /// Terminal marker, possibly carrying a server-side result.
    Done(DoneFrame),
    /// Server-reported failure.
    Error(String),
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoneFrame {
    pub frame_type: Option<String>,
    pub kind: Option<String>,
    pub data: Option<Value>,
}

/// Out-of-band frame delivered to the caller immediately, bypassing the
/// classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfBandEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

impl OutOfBandEvent {
    pub fn progress(data: Value) -> Self {
        Self {
            event_type: PROGRESS_UPDATE.to_string(),
            data,
        }
    }

    pub fn is_progress_update(&self) -> bool {
        self.event_type == PROGRESS_UPDATE
    }
}

pub const PROGRESS_UPDATE: &str = "progress_update";

impl RawFrame {
    pub fn text(chunk: impl Into<String>) -> Self {
        Self {
            chunk: Some(chunk.into()),
            ..Self::default()
        }
    }

    pub fn done(frame_type: &str, kind: Option<&str>, data: Value) -> Self {
        Self {
            done: Some(true),
            frame_type: Some(frame_type.to_string()),
            data: Some(data),
            kind: kind.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn event(event: OutOfBandEvent) -> Self {
        Self {
            frame_type: Some(event.event_type),
            data: Some(event.data),
            ..Self::default()
        }
    }

    pub fn classify(self) -> FrameKind {
        if let Some(error) = self.error {
            return FrameKind::Error(value_to_message(error));
        }

        let frame_type = self.frame_type.as_deref();
        if self.done == Some(true) || frame_type == Some("done") {
            if frame_type == Some("error") {
                return FrameKind::Error(
                    self.data
                        .map(value_to_message)
                        .unwrap_or_else(|| "unknown server error".to_string()),
                );
            }
            return FrameKind::Done(DoneFrame {
                frame_type: self.frame_type.filter(|t| t != "done"),
                kind: self.kind,
                data: self.data,
            });
        }

        match frame_type {
            Some("error") => FrameKind::Error(
                self.data
                    .or(self.content.map(Value::String))
                    .map(value_to_message)
                    .unwrap_or_else(|| "unknown server error".to_string()),
            ),
            Some("content") => match self.content.or(self.chunk) {
                Some(text) => FrameKind::Text(text),
                None => FrameKind::Ignored,
            },
            Some(event_type) => FrameKind::Event(OutOfBandEvent {
                event_type: event_type.to_string(),
                data: self
                    .data
                    .or(self.content.map(Value::String))
                    .unwrap_or(Value::Null),
            }),
            None => match self.chunk {
                Some(text) => FrameKind::Text(text),
                None => FrameKind::Ignored,
            },
        }
    }
}

fn value_to_message(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Object(ref map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}
