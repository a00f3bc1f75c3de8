use anyhow::{bail, Context, Result};
use chatfence::api::{ChatClient, MockResponse, MockStreamSource, StreamSource};
use chatfence::config::Config;
use chatfence::state::KeywordWatch;
use chatfence::types::OutOfBandEvent;
use chatfence::{
    stream_chat_response, ExtractedUpdate, Phase, PhaseContext, StreamCallbacks, StreamError,
    StreamRequest, UpdateKind,
};
use std::io::Write;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage:\n  \
chatfence send <phase> <user input...>\n  \
chatfence replay <transcript file> [phase]\n\n\
phases: challenge, market, ideation, investment_appraisal, pitch, text_analysis";

/// Prints visible text live and the extracted update as pretty JSON.
struct TerminalPrinter {
    printed_any: bool,
}

impl StreamCallbacks for TerminalPrinter {
    fn on_chunk(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
        self.printed_any = true;
    }

    fn on_progress_update(&mut self, event: &OutOfBandEvent) {
        eprintln!("[{}] {}", event.event_type, event.data);
    }

    fn on_complete(&mut self, update: Option<&ExtractedUpdate>, text: &str) {
        if !self.printed_any && !text.is_empty() {
            println!("{text}");
        } else {
            println!();
        }
        if let Some(update) = update {
            let pretty = serde_json::to_string_pretty(&update.payload)
                .unwrap_or_else(|_| update.payload.to_string());
            println!("\n{}:\n{pretty}", update.kind);
        }
    }

    fn on_error(&mut self, error: &StreamError) {
        eprintln!("\n[{}] {}", error.kind(), error.user_message());
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "chatfence=info".into());
    match std::env::var("CHATFENCE_LOG_PATH") {
        Ok(path) if !path.trim().is_empty() => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path.trim())
                .with_context(|| format!("cannot open CHATFENCE_LOG_PATH '{}'", path.trim()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn parse_phase(value: &str) -> Result<Phase> {
    match Phase::parse(value) {
        Some(phase) => Ok(phase),
        None => bail!("unknown phase '{value}'\n\n{USAGE}"),
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}

async fn run<S>(source: &S, request: &StreamRequest) -> Result<()>
where
    S: StreamSource + ?Sized,
{
    let mut printer = TerminalPrinter { printed_any: false };
    let cancel = cancel_on_ctrl_c();
    match stream_chat_response(source, request, &mut printer, &cancel).await {
        Ok(_) => Ok(()),
        Err(StreamError::Cancelled) => {
            eprintln!("\ncancelled");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

async fn send(phase: Phase, input: String) -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let client = ChatClient::new(&config);
    let request = phase.request(
        client.base_url(),
        &PhaseContext::new(input),
        config.timeout_override,
    );
    run(&client, &request).await
}

async fn replay(path: &str, phase: Option<Phase>) -> Result<()> {
    let body = std::fs::read(path).with_context(|| format!("cannot read transcript '{path}'"))?;
    let (watch, kinds) = match phase {
        Some(phase) => (phase.watch(), phase.update_kinds()),
        None => {
            let kinds = UpdateKind::PRECEDENCE.to_vec();
            (KeywordWatch::for_kinds(&kinds), kinds)
        }
    };

    let mut request = StreamRequest::new(format!("file://{path}"), serde_json::json!({}), watch);
    if phase != Some(Phase::TextAnalysis) {
        request.kinds = kinds;
    }
    let source = MockStreamSource::new(vec![MockResponse::Raw(vec![body])]);
    run(&source, &request).await
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("send") if args.len() >= 3 => {
            let phase = parse_phase(&args[1])?;
            send(phase, args[2..].join(" ")).await
        }
        Some("replay") if args.len() == 2 || args.len() == 3 => {
            let phase = args.get(2).map(|value| parse_phase(value)).transpose()?;
            replay(&args[1], phase).await
        }
        Some("-h") | Some("--help") | Some("help") => {
            println!("{USAGE}");
            Ok(())
        }
        _ => bail!("{USAGE}"),
    }
}
