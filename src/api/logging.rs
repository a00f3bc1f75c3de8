use crate::error::{StreamError, UpdateParseError};
use crate::util::{parse_bool_flag, truncate_for_log};
use serde_json::Value;

const DEBUG_PAYLOAD_ENV: &str = "CHATFENCE_DEBUG_PAYLOAD";
const MAX_LOGGED_DATA_BYTES: usize = 2048;

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(parse_bool_flag)
        .unwrap_or(false)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    tracing::debug!(
        target: "chatfence::api",
        url = request_url,
        "payload_request\n{formatted_payload}"
    );
}

pub fn emit_sse_parse_error(json_data: &str, parse_error: &serde_json::Error) {
    tracing::warn!(
        target: "chatfence::api",
        error = %parse_error,
        data = truncate_for_log(json_data, MAX_LOGGED_DATA_BYTES),
        "sse_parse_failed"
    );
}

pub fn emit_update_parse_error(error: &UpdateParseError) {
    tracing::warn!(
        target: "chatfence::extract",
        kind = %error.kind(),
        length = error.length,
        error = %error.message,
        snippet = %error.snippet,
        "update_parse_failed"
    );
}

pub fn emit_error_response(request_url: &str, status: u16, body: &str) {
    tracing::error!(
        target: "chatfence::api",
        url = request_url,
        status,
        body = truncate_for_log(body, MAX_LOGGED_DATA_BYTES),
        "api_error_response"
    );
}

pub fn emit_stream_failure(request_url: &str, error: &StreamError) {
    tracing::warn!(
        target: "chatfence::stream",
        url = request_url,
        kind = %error.kind(),
        error = %error,
        "stream_failed"
    );
}

pub fn emit_stream_complete(request_url: &str, update_kind: Option<&str>, text_bytes: usize) {
    tracing::info!(
        target: "chatfence::stream",
        url = request_url,
        update = update_kind.unwrap_or("none"),
        text_bytes,
        "stream_complete"
    );
}

pub fn emit_upstream_error(error: &dyn std::fmt::Display) {
    tracing::error!(target: "chatfence::relay", error = %error, "upstream_failed");
}
