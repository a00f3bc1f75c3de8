use chatfence::api::{MockResponse, MockStreamSource};
use chatfence::state::KeywordWatch;
use chatfence::test_support::sse_transcript;
use chatfence::types::OutOfBandEvent;
use chatfence::{
    stream_chat_response, ErrorKind, ExtractedUpdate, Phase, PhaseContext, StreamCallbacks,
    StreamError, StreamOutcome, StreamRequest, StreamUpdate, UpdateKind,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Recorder {
    chunks: Vec<String>,
    events: Vec<OutOfBandEvent>,
    completes: Vec<(Option<ExtractedUpdate>, String)>,
    errors: Vec<ErrorKind>,
}

impl Recorder {
    fn shown(&self) -> String {
        self.chunks.concat()
    }
}

impl StreamCallbacks for Recorder {
    fn on_chunk(&mut self, text: &str) {
        self.chunks.push(text.to_string());
    }

    fn on_progress_update(&mut self, event: &OutOfBandEvent) {
        self.events.push(event.clone());
    }

    fn on_complete(&mut self, update: Option<&ExtractedUpdate>, text: &str) {
        self.completes.push((update.cloned(), text.to_string()));
    }

    fn on_error(&mut self, error: &StreamError) {
        self.errors.push(error.kind());
    }
}

fn ideation_request() -> StreamRequest {
    Phase::Ideation.request("http://localhost:3000", &PhaseContext::new("ideas?"), None)
}

async fn run_chunks(
    request: &StreamRequest,
    chunks: &[&str],
) -> (Recorder, Result<StreamOutcome, StreamError>) {
    let source = MockStreamSource::new(vec![MockResponse::chunks(chunks.iter().copied())]);
    let mut recorder = Recorder::default();
    let result =
        stream_chat_response(&source, request, &mut recorder, &CancellationToken::new()).await;
    (recorder, result)
}

#[tokio::test]
async fn test_ideas_update_example() {
    let request = ideation_request();
    let (recorder, result) = run_chunks(
        &request,
        &[
            "Here are your ideas:\n",
            "```json\n{\"IDEAS_UPDATE\":",
            "{\"ideas\":[]}}\n```",
        ],
    )
    .await;

    let outcome = result.expect("stream should complete");
    assert_eq!(recorder.chunks, vec!["Here are your ideas:\n"]);
    assert_eq!(
        recorder.completes,
        vec![(
            Some(ExtractedUpdate {
                kind: UpdateKind::IdeasUpdate,
                payload: json!({"ideas": []}),
            }),
            "Here are your ideas:\n".to_string(),
        )]
    );
    assert_eq!(outcome.update.map(|u| u.kind), Some(UpdateKind::IdeasUpdate));
    assert!(recorder.errors.is_empty());
}

#[tokio::test]
async fn test_block_never_leaks_for_any_two_way_split() {
    let response = "Intro text.\n```json\n{\"IDEAS_UPDATE\": {\"ideas\": [{\"name\": \"A\"}]}}\n```\nThanks!";
    let request = ideation_request();

    let boundaries: Vec<usize> = (1..response.len())
        .filter(|idx| response.is_char_boundary(*idx))
        .collect();
    for split in boundaries {
        let (recorder, result) =
            run_chunks(&request, &[&response[..split], &response[split..]]).await;
        result.expect("stream should complete");

        let shown = recorder.shown();
        assert!(!shown.contains("IDEAS_UPDATE"), "leak at split {split}: {shown:?}");
        assert!(!shown.contains("```"), "fence leak at split {split}: {shown:?}");
        assert_eq!(shown, "Intro text.\n\nThanks!", "split {split}");
        assert_eq!(recorder.completes.len(), 1);
        assert_eq!(
            recorder.completes[0].0.as_ref().map(|u| u.payload["ideas"][0]["name"].clone()),
            Some(json!("A"))
        );
    }
}

#[tokio::test]
async fn test_block_never_leaks_with_single_character_chunks() {
    let response = "Sure.\n```json\n{'MARKET_UPDATE': {'tam': '$4B'}}\n```";
    let chars: Vec<String> = response.chars().map(String::from).collect();
    let chunks: Vec<&str> = chars.iter().map(String::as_str).collect();
    let request = Phase::Market.request("http://localhost:3000", &PhaseContext::new("tam"), None);

    let (recorder, result) = run_chunks(&request, &chunks).await;
    let outcome = result.expect("stream should complete");

    assert_eq!(recorder.shown(), "Sure.\n");
    assert_eq!(
        outcome.update,
        Some(ExtractedUpdate {
            kind: UpdateKind::MarketUpdate,
            payload: json!({"tam": "$4B"}),
        })
    );
}

#[tokio::test]
async fn test_plain_response_with_code_is_shown_in_full() {
    let response = "Try this:\n```python\nprint('hi')\n```\nThat's it.";
    let request = ideation_request();
    let (recorder, result) = run_chunks(&request, &[&response[..15], &response[15..]]).await;
    let outcome = result.expect("stream should complete");

    assert_eq!(recorder.shown(), response);
    assert_eq!(outcome.update, None);
    assert_eq!(outcome.text, response);
}

#[tokio::test]
async fn test_malformed_block_degrades_to_plain_text() {
    let response = "Here you go:\n```json\n{\"IDEAS_UPDATE\": {\"ideas\": [\n```";
    let request = ideation_request();
    let (recorder, result) = run_chunks(&request, &[response]).await;
    let outcome = result.expect("parse failure is not a stream error");

    assert_eq!(recorder.shown(), "Here you go:\n");
    assert!(recorder.errors.is_empty());
    assert_eq!(recorder.completes.len(), 1);
    assert_eq!(recorder.completes[0].0, None);
    assert_eq!(recorder.completes[0].1, response);
    let parse_error = outcome.parse_error.expect("parse error recorded");
    assert_eq!(parse_error.kind(), ErrorKind::UpdateParseFailed);
}

#[tokio::test]
async fn test_timeout_reports_error_without_completion() {
    let request = ideation_request().with_timeout(Duration::from_millis(50));
    let source = MockStreamSource::new(vec![MockResponse::Stall(vec![
        "data: {\"chunk\":\"partial \"}".to_string(),
    ])]);
    let mut recorder = Recorder::default();

    let result =
        stream_chat_response(&source, &request, &mut recorder, &CancellationToken::new()).await;

    match result {
        Err(StreamError::Timeout(limit)) => assert_eq!(limit, Duration::from_millis(50)),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(recorder.shown(), "partial ");
    assert_eq!(recorder.errors, vec![ErrorKind::Timeout]);
    assert!(recorder.completes.is_empty());
    assert_eq!(
        ErrorKind::Timeout.user_message(),
        "The response is taking too long. Please try again or rephrase your message."
    );
}

#[tokio::test]
async fn test_cancellation_is_silent() {
    let request = ideation_request();
    let source = MockStreamSource::new(vec![MockResponse::Stall(vec![
        "data: {\"chunk\":\"thinking\"}".to_string(),
    ])]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let mut recorder = Recorder::default();

    let result = stream_chat_response(&source, &request, &mut recorder, &cancel).await;

    assert!(matches!(result, Err(StreamError::Cancelled)));
    assert_eq!(recorder.shown(), "thinking");
    assert!(recorder.errors.is_empty());
    assert!(recorder.completes.is_empty());
}

#[tokio::test]
async fn test_server_error_frame_is_classified() {
    let source = MockStreamSource::new(vec![MockResponse::frames([
        "data: {\"chunk\":\"Hi\"}",
        "data: {\"error\":\"Rate limit exceeded (429)\"}",
    ])]);
    let mut recorder = Recorder::default();

    let result = stream_chat_response(
        &source,
        &ideation_request(),
        &mut recorder,
        &CancellationToken::new(),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(recorder.errors, vec![ErrorKind::RateLimitOrCredit]);
    assert!(recorder.completes.is_empty());
}

#[tokio::test]
async fn test_http_status_failure_is_classified() {
    let source = MockStreamSource::new(vec![MockResponse::Fail(Arc::new(|| {
        StreamError::Status {
            url: "http://localhost:3000/api/assistant/ideation".to_string(),
            status: reqwest::StatusCode::UNAUTHORIZED,
            body: "Unauthorized".to_string(),
        }
    }))]);
    let mut recorder = Recorder::default();

    let error = stream_chat_response(
        &source,
        &ideation_request(),
        &mut recorder,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Auth);
    assert_eq!(recorder.errors, vec![ErrorKind::Auth]);
}

#[tokio::test]
async fn test_progress_updates_are_forwarded_immediately() {
    let request = Phase::InvestmentAppraisal.request(
        "http://localhost:3000",
        &PhaseContext::new("appraise"),
        None,
    );
    let source = MockStreamSource::new(vec![MockResponse::frames([
        "data: {\"type\":\"progress_update\",\"data\":{\"stage\":\"npv\"}}",
        "data: {\"chunk\":\"NPV is positive.\\n\"}",
        "data: {\"chunk\":\"```json\\n{\\\"APPRAISAL_UPDATE\\\": {\\\"npv\\\": 12}}\\n```\"}",
        "data: {\"done\":true}",
    ])]);
    let mut recorder = Recorder::default();

    let outcome = stream_chat_response(&source, &request, &mut recorder, &CancellationToken::new())
        .await
        .expect("stream should complete");

    assert_eq!(recorder.events.len(), 1);
    assert_eq!(recorder.events[0].data, json!({"stage": "npv"}));
    assert_eq!(recorder.shown(), "NPV is positive.\n");
    assert_eq!(
        outcome.update.map(|u| (u.kind, u.payload)),
        Some((UpdateKind::AppraisalUpdate, json!({"npv": 12})))
    );
}

#[tokio::test]
async fn test_appraisal_hides_bare_json_without_keyword() {
    let request = Phase::InvestmentAppraisal.request(
        "http://localhost:3000",
        &PhaseContext::new("appraise"),
        None,
    );
    let (recorder, result) = run_chunks(
        &request,
        &["Figures below.\n```json\n{\"npv\": 3}\n```\nDone."],
    )
    .await;
    result.expect("stream should complete");
    assert_eq!(recorder.shown(), "Figures below.\n\nDone.");
}

#[tokio::test]
async fn test_channel_callbacks_receive_ordered_updates() {
    let (mut tx, mut rx) = mpsc::unbounded_channel::<StreamUpdate>();
    let source = MockStreamSource::new(vec![MockResponse::chunks([
        "Hello ",
        "```json\n{\"IDEAS_UPDATE\": {\"ideas\": []}}\n```",
    ])]);

    stream_chat_response(&source, &ideation_request(), &mut tx, &CancellationToken::new())
        .await
        .expect("stream should complete");
    drop(tx);

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    assert_eq!(updates[0], StreamUpdate::Chunk("Hello ".to_string()));
    match updates.last() {
        Some(StreamUpdate::Complete { update, text }) => {
            assert_eq!(update.as_ref().map(|u| u.kind), Some(UpdateKind::IdeasUpdate));
            assert_eq!(text, "Hello ");
        }
        other => panic!("unexpected last update: {other:?}"),
    }
}

#[tokio::test]
async fn test_replay_recorded_transcript_from_file() {
    let transcript = sse_transcript(&[
        "Final numbers:\n",
        "FINAL_MARKET_ANALYSIS:\n```json\n{\"tam\": \"$7B\"}\n```",
    ]);
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(transcript.as_bytes()).expect("write transcript");

    let body = std::fs::read(file.path()).expect("read transcript");
    let source = MockStreamSource::new(vec![MockResponse::Raw(vec![body])]);
    let request = StreamRequest::new(
        "file://transcript",
        json!({}),
        KeywordWatch::for_kinds(&[UpdateKind::FinalMarketAnalysis]),
    );
    let mut recorder = Recorder::default();

    let outcome = stream_chat_response(&source, &request, &mut recorder, &CancellationToken::new())
        .await
        .expect("replay should complete");

    assert!(!recorder.shown().contains("$7B"));
    let update = outcome.update.expect("labelled block extracted");
    assert_eq!(update.kind, UpdateKind::FinalMarketAnalysis);
    assert_eq!(update.payload["tam"], "$7B");
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test]
async fn test_relay_output_round_trips_through_client() {
    use futures::StreamExt;

    let upstream = futures::stream::iter(
        [
            "Pitch deck refreshed.\n",
            "```json\n{\"PITCH_DECK_UPDATE\": {\"slides\": 10}}\n```",
        ]
        .into_iter()
        .map(|chunk| Ok::<_, std::io::Error>(chunk.to_string()))
        .collect::<Vec<_>>(),
    );
    let request = Phase::Pitch.request("http://localhost:3000", &PhaseContext::new("deck"), None);
    let relayed: Vec<Vec<u8>> = chatfence::relay::relay(
        upstream,
        request.watch.clone(),
        request.kinds.clone(),
    )
    .map(|bytes| bytes.to_vec())
    .collect()
    .await;

    let source = MockStreamSource::new(vec![MockResponse::Raw(relayed)]);
    let mut recorder = Recorder::default();
    let outcome = stream_chat_response(&source, &request, &mut recorder, &CancellationToken::new())
        .await
        .expect("stream should complete");

    assert_eq!(recorder.shown(), "Pitch deck refreshed.\n");
    assert_eq!(
        outcome.update,
        Some(ExtractedUpdate {
            kind: UpdateKind::PitchDeckUpdate,
            payload: json!({"slides": 10}),
        })
    );
}

#[tokio::test]
async fn test_relayed_unparseable_block_reaches_client_as_raw_text() {
    use futures::StreamExt;

    let upstream = futures::stream::iter(
        ["Here you go:\n", "```json\n{\"IDEAS_UPDATE\": {\"ideas\": [\n```"]
            .into_iter()
            .map(|chunk| Ok::<_, std::io::Error>(chunk.to_string()))
            .collect::<Vec<_>>(),
    );
    let request = ideation_request();
    let relayed: Vec<Vec<u8>> = chatfence::relay::relay(
        upstream,
        request.watch.clone(),
        request.kinds.clone(),
    )
    .map(|bytes| bytes.to_vec())
    .collect()
    .await;

    let source = MockStreamSource::new(vec![MockResponse::Raw(relayed)]);
    let mut recorder = Recorder::default();
    let outcome = stream_chat_response(&source, &request, &mut recorder, &CancellationToken::new())
        .await
        .expect("stream should complete");

    let raw = "Here you go:\n```json\n{\"IDEAS_UPDATE\": {\"ideas\": [\n```";
    assert_eq!(recorder.shown(), "Here you go:\n");
    assert_eq!(recorder.completes, vec![(None, raw.to_string())]);
    assert_eq!(outcome.update, None);
    let error = outcome.parse_error.expect("parse error should be reported");
    assert_eq!(error.kind(), ErrorKind::UpdateParseFailed);
}

#[tokio::test]
async fn test_later_fence_naming_the_key_keeps_earlier_update() {
    let (recorder, result) = run_chunks(
        &ideation_request(),
        &[
            "Ideas:\n```json\n{\"IDEAS_UPDATE\": {\"ideas\": [1]}}\n```\n",
            "To change them later, send:\n```\nupdate IDEAS_UPDATE with new ideas\n```",
        ],
    )
    .await;
    let outcome = result.expect("stream should complete");

    assert_eq!(
        outcome.update,
        Some(ExtractedUpdate {
            kind: UpdateKind::IdeasUpdate,
            payload: json!({"ideas": [1]}),
        })
    );
    assert_eq!(outcome.parse_error, None);
    assert!(!recorder.shown().contains("IDEAS_UPDATE"));
    assert_eq!(recorder.completes.len(), 1);
}
