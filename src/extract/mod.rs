//! Terminal extraction of the update block from a finished response.
//!
//! Runs once, after the stream has ended, over the complete accumulated text.
//! Everything here is a pure function of its input.

pub mod fence;
pub mod repair;

use crate::api::logging::emit_update_parse_error;
use crate::error::UpdateParseError;
use crate::types::{ExtractedUpdate, UpdateKind};
use crate::util::truncate_for_log;
use fence::{fenced_blocks, outer_object_span};
use repair::repair_json;
use serde_json::Value;
use std::ops::Range;

const SNIPPET_BYTES: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Found {
        update: ExtractedUpdate,
        /// Byte span of the block (or bare object) in the input.
        span: Range<usize>,
        /// False when the update came from an unfenced object.
        fenced: bool,
    },
    /// A candidate block was found but could not be parsed even after repair.
    Failed(UpdateParseError),
    /// No candidate carries a recognised key.
    None,
}

impl Extraction {
    pub fn update(&self) -> Option<&ExtractedUpdate> {
        match self {
            Extraction::Found { update, .. } => Some(update),
            _ => None,
        }
    }
}

/// Locates, repairs and parses the update block in `text`.
///
/// Fences whose body (or label just before it) names one of `kinds` are tried
/// from last to first, since producers sometimes show illustrative fences
/// around the real one. The first that parses to a recognised update wins.
/// Only when no fence qualifies is a bare `{ ... }` object tried.
pub fn extract_update(text: &str, kinds: &[UpdateKind]) -> Extraction {
    let mut failure = None;
    for block in fenced_blocks(text).into_iter().rev() {
        let label_kind = label_kind(block.label, kinds);
        if label_kind.is_none() && !mentions_any(block.body, kinds) {
            continue;
        }
        match parse_candidate(block.body.trim(), kinds, label_kind) {
            Ok(Some(update)) => {
                return Extraction::Found {
                    update,
                    span: block.span,
                    fenced: true,
                }
            }
            Ok(None) => {}
            Err(error) => {
                failure.get_or_insert(error);
            }
        }
    }

    if let Some(error) = failure {
        emit_update_parse_error(&error);
        return Extraction::Failed(error);
    }

    let Some(span) = outer_object_span(text) else {
        return Extraction::None;
    };
    let body = &text[span.clone()];
    if !mentions_any(body, kinds) {
        return Extraction::None;
    }
    match parse_candidate(body, kinds, None) {
        Ok(Some(update)) => Extraction::Found {
            update,
            span,
            fenced: false,
        },
        Ok(None) => Extraction::None,
        Err(error) => {
            emit_update_parse_error(&error);
            Extraction::Failed(error)
        }
    }
}

/// `text` with every update block removed, trimmed. Ordinary code blocks stay.
pub fn strip_update_blocks(text: &str, kinds: &[UpdateKind]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for block in fenced_blocks(text) {
        if mentions_any(block.body, kinds) || label_kind(block.label, kinds).is_some() {
            out.push_str(&text[last..block.span.start]);
            last = block.span.end;
        }
    }
    out.push_str(&text[last..]);
    out.trim().to_string()
}

fn parse_candidate(
    body: &str,
    kinds: &[UpdateKind],
    label_kind: Option<UpdateKind>,
) -> Result<Option<ExtractedUpdate>, UpdateParseError> {
    let repaired = repair_json(body);
    let value: Value = serde_json::from_str(&repaired).map_err(|error| UpdateParseError {
        snippet: truncate_for_log(&repaired, SNIPPET_BYTES).to_string(),
        length: repaired.len(),
        message: error.to_string(),
    })?;

    if let Value::Object(map) = &value {
        let keyed = UpdateKind::PRECEDENCE
            .into_iter()
            .filter(|kind| kinds.contains(kind))
            .find_map(|kind| match map.get(kind.key()) {
                Some(payload) if !payload.is_null() => Some(ExtractedUpdate {
                    kind,
                    payload: payload.clone(),
                }),
                _ => None,
            });
        if keyed.is_some() {
            return Ok(keyed);
        }
    }

    Ok(label_kind.map(|kind| ExtractedUpdate {
        kind,
        payload: value,
    }))
}

fn mentions_any(text: &str, kinds: &[UpdateKind]) -> bool {
    kinds.iter().any(|kind| text.contains(kind.key()))
}

/// Kind named in the last line of a fence label, e.g. `FINAL_MARKET_ANALYSIS:`.
fn label_kind(label: &str, kinds: &[UpdateKind]) -> Option<UpdateKind> {
    let last_line = label.trim_end().lines().last()?;
    UpdateKind::PRECEDENCE
        .into_iter()
        .filter(|kind| kinds.contains(kind))
        .find(|kind| last_line.contains(kind.key()))
}
