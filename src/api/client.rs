use super::logging::{debug_payload_enabled, emit_debug_payload, emit_error_response};
use crate::config::Config;
use crate::error::{ErrorKind, StreamError};
use crate::phase::StreamRequest;
use crate::util::is_local_endpoint_url;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Opens the raw SSE body for one request.
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, StreamError>;
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl ChatClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.base_url)
    }
}

#[async_trait]
impl StreamSource for ChatClient {
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, StreamError> {
        let request_url = request.url.clone();
        let mut builder = self
            .http
            .post(&request_url)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&request.body);

        if debug_payload_enabled() {
            emit_debug_payload(&request_url, &request.body);
        }

        if let Some(api_key) = &self.api_key {
            builder = builder.header("authorization", format!("Bearer {api_key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|error| map_request_error(error, &request_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            emit_error_response(&request_url, status.as_u16(), &body);
            return Err(StreamError::Status {
                url: request_url,
                status,
                body: error_body_message(&body),
            });
        }

        let url_for_stream = request_url.clone();
        let stream = response
            .bytes_stream()
            .map(move |item| item.map_err(|error| map_request_error(error, &url_for_stream)));
        Ok(Box::pin(stream))
    }
}

/// Error routes answer with `{ "error": "..." }`; fall back to the raw body.
fn error_body_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn map_request_error(error: reqwest::Error, request_url: &str) -> StreamError {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return StreamError::Transport {
            url: request_url.to_string(),
            kind: ErrorKind::Network,
            message: format!(
                "cannot reach local endpoint: {error}. Start the app server or update CHATFENCE_BASE_URL."
            ),
        };
    }
    if error.is_connect() {
        return StreamError::Transport {
            url: request_url.to_string(),
            kind: ErrorKind::Network,
            message: format!("cannot reach endpoint: {error}"),
        };
    }
    if error.is_timeout() {
        return StreamError::Transport {
            url: request_url.to_string(),
            kind: ErrorKind::Timeout,
            message: format!("request timed out: {error}"),
        };
    }
    if let Some(status) = error.status() {
        return StreamError::Status {
            url: request_url.to_string(),
            status,
            body: error.to_string(),
        };
    }
    let message = error.to_string();
    StreamError::Transport {
        url: request_url.to_string(),
        kind: match ErrorKind::classify_message(&message) {
            ErrorKind::Unknown => ErrorKind::Network,
            kind => kind,
        },
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_message_prefers_error_field() {
        assert_eq!(
            error_body_message(r#"{"error":"Insufficient credits"}"#),
            "Insufficient credits"
        );
        assert_eq!(error_body_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn test_client_reports_local_endpoint() {
        let config = Config {
            base_url: "http://127.0.0.1:3000".to_string(),
            api_key: None,
            timeout_override: None,
        };
        let client = ChatClient::new(&config);
        assert!(client.is_local_endpoint());
        assert_eq!(client.base_url(), "http://127.0.0.1:3000");
    }

    #[tokio::test]
    async fn test_unreachable_local_endpoint_is_network_error() {
        let config = Config {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            timeout_override: None,
        };
        let client = ChatClient::new(&config);
        let request = StreamRequest::new(
            "http://127.0.0.1:9/api/ai/challenge",
            serde_json::json!({"userInput": "hi"}),
            crate::state::KeywordWatch::AnyOf(vec!["FINAL_SUMMARY".to_string()]),
        );
        match client.open(&request).await {
            Err(error) => assert_eq!(error.kind(), ErrorKind::Network),
            Ok(_) => panic!("port 9 should refuse connections"),
        }
    }
}
