use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

/// Process-wide lock for tests that mutate `CHATFENCE_*` environment variables.
/// Use `.blocking_lock()` in sync tests and `.lock().await` in async tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// One SSE message carrying `value`, without the trailing blank line.
pub fn sse_message(value: &Value) -> String {
    format!("data: {value}")
}

/// A whole transcript: `{"chunk"}` messages followed by `{"done": true}`.
pub fn sse_transcript(chunks: &[&str]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&sse_message(&serde_json::json!({ "chunk": chunk })));
        out.push_str("\n\n");
    }
    out.push_str("data: {\"done\":true}\n\n");
    out
}
