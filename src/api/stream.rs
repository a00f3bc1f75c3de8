use super::logging::emit_sse_parse_error;
use crate::types::RawFrame;

/// Incremental SSE decoder: raw body bytes in, [`RawFrame`]s out.
#[derive(Default)]
pub struct SseFrameReader {
    buffer: String,
    /// Trailing bytes of a UTF-8 sequence split across reads.
    pending_bytes: Vec<u8>,
}

impl SseFrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.decode_into_buffer(chunk);
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some((end, delimiter_len)) = find_message_end(&self.buffer[start..]) {
            let message_end = start + end + delimiter_len;
            if let Some(frame) = parse_message(&self.buffer[start..start + end]) {
                frames.push(frame);
            }
            start = message_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        frames
    }

    /// Parses whatever is left once the body has ended. Producers sometimes
    /// close the connection without the final blank line.
    pub fn finish(&mut self) -> Vec<RawFrame> {
        let tail = self.flush();
        parse_message(tail.trim_end_matches(['\r', '\n']))
            .into_iter()
            .collect()
    }

    pub fn flush(&mut self) -> String {
        if !self.pending_bytes.is_empty() {
            let pending = std::mem::take(&mut self.pending_bytes);
            self.buffer.push_str(&String::from_utf8_lossy(&pending));
        }
        std::mem::take(&mut self.buffer)
    }

    fn decode_into_buffer(&mut self, chunk: &[u8]) {
        let mut bytes = std::mem::take(&mut self.pending_bytes);
        bytes.extend_from_slice(chunk);

        match std::str::from_utf8(&bytes) {
            Ok(text) => self.buffer.push_str(text),
            Err(error) if error.error_len().is_none() => {
                // Incomplete sequence at the end; keep it for the next read.
                let valid = error.valid_up_to();
                self.buffer
                    .push_str(&String::from_utf8_lossy(&bytes[..valid]));
                self.pending_bytes = bytes[valid..].to_vec();
            }
            Err(_) => self.buffer.push_str(&String::from_utf8_lossy(&bytes)),
        }
    }
}

fn find_message_end(text: &str) -> Option<(usize, usize)> {
    let lf = text.find("\n\n").map(|idx| (idx, 2));
    let crlf = text.find("\r\n\r\n").map(|idx| (idx, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_message(message: &str) -> Option<RawFrame> {
    let mut data_lines = Vec::new();
    for line in message.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        return None;
    }

    let json_data = data_lines.join("\n");
    let json_data = json_data.trim();
    if json_data.is_empty() || json_data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<RawFrame>(json_data) {
        Ok(frame) => Some(frame),
        Err(error) => {
            emit_sse_parse_error(json_data, &error);
            None
        }
    }
}
