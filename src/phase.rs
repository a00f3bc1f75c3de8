use crate::state::KeywordWatch;
use crate::types::UpdateKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const APPRAISAL_TIMEOUT: Duration = Duration::from_secs(180);

/// Wizard phase a chat turn belongs to. Each phase is one streaming call-site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Challenge,
    Market,
    Ideation,
    InvestmentAppraisal,
    Pitch,
    TextAnalysis,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Challenge,
        Phase::Market,
        Phase::Ideation,
        Phase::InvestmentAppraisal,
        Phase::Pitch,
        Phase::TextAnalysis,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Challenge => "challenge",
            Phase::Market => "market",
            Phase::Ideation => "ideation",
            Phase::InvestmentAppraisal => "investment_appraisal",
            Phase::Pitch => "pitch",
            Phase::TextAnalysis => "text_analysis",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "appraisal" | "investment" => Some(Phase::InvestmentAppraisal),
            "ideate" | "ideas" => Some(Phase::Ideation),
            "analysis" | "analyze" => Some(Phase::TextAnalysis),
            other => Self::ALL.into_iter().find(|phase| phase.name() == other),
        }
    }

    pub fn endpoint_path(self) -> &'static str {
        match self {
            Phase::Challenge => "/api/ai/challenge",
            Phase::Market => "/api/assistant/market",
            Phase::Ideation => "/api/assistant/ideation",
            Phase::InvestmentAppraisal => "/api/assistant/investment-appraisal",
            Phase::Pitch => "/api/assistant/pitch",
            Phase::TextAnalysis => "/api/ai/analyze-selection-enhanced",
        }
    }

    pub fn update_kinds(self) -> Vec<UpdateKind> {
        match self {
            Phase::Challenge => vec![UpdateKind::FinalSummary],
            Phase::Market => vec![UpdateKind::MarketUpdate, UpdateKind::FinalMarketAnalysis],
            // Ideation replies may also amend the market analysis.
            Phase::Ideation => vec![UpdateKind::IdeasUpdate, UpdateKind::MarketUpdate],
            Phase::InvestmentAppraisal => {
                vec![UpdateKind::AppraisalUpdate, UpdateKind::FinalSummary]
            }
            Phase::Pitch => vec![UpdateKind::PitchDeckUpdate],
            Phase::TextAnalysis => Vec::new(),
        }
    }

    pub fn watch(self) -> KeywordWatch {
        let keywords = self
            .update_kinds()
            .into_iter()
            .map(|kind| kind.key().to_string())
            .collect();
        match self {
            // Appraisal replies often fence bare financial JSON without a key.
            Phase::InvestmentAppraisal => KeywordWatch::Either(keywords),
            Phase::TextAnalysis => KeywordWatch::JsonLike,
            _ => KeywordWatch::AnyOf(keywords),
        }
    }

    pub fn default_timeout(self) -> Duration {
        match self {
            Phase::InvestmentAppraisal => APPRAISAL_TIMEOUT,
            _ => DEFAULT_TIMEOUT,
        }
    }

    pub fn request(
        self,
        base_url: &str,
        context: &PhaseContext,
        timeout_override: Option<Duration>,
    ) -> StreamRequest {
        let watch = self.watch();
        let kinds = match self {
            Phase::TextAnalysis => watch.kinds(),
            _ => self.update_kinds(),
        };
        StreamRequest {
            url: format!("{}{}", base_url.trim_end_matches('/'), self.endpoint_path()),
            body: context.to_body(self),
            watch,
            kinds,
            timeout: timeout_override.unwrap_or_else(|| self.default_timeout()),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Everything one call needs from the wizard session, passed explicitly.
///
/// Built by the caller per request and never mutated by the engine; results
/// flow back through the callbacks instead of being written into shared state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseContext {
    pub user_input: String,
    #[serde(default)]
    pub conversation_history: Vec<ChatTurn>,
    /// Prior-phase results the call-site forwards (`challenge`,
    /// `marketAnalysis`, `ideas`, `selectedIdea`, ...).
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl PhaseContext {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    fn to_body(&self, phase: Phase) -> Value {
        let mut body = Map::new();
        match phase {
            Phase::TextAnalysis => {
                body.insert(
                    "selectedText".to_string(),
                    Value::String(self.user_input.clone()),
                );
            }
            _ => {
                body.insert(
                    "userInput".to_string(),
                    Value::String(self.user_input.clone()),
                );
                let history = self
                    .conversation_history
                    .iter()
                    .map(|turn| {
                        serde_json::json!({
                            "role": turn.role,
                            "content": turn.content,
                        })
                    })
                    .collect();
                body.insert("conversationHistory".to_string(), Value::Array(history));
            }
        }
        for (key, value) in &self.fields {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(body)
    }
}

/// One fully-specified streaming call.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub url: String,
    pub body: Value,
    pub watch: KeywordWatch,
    pub kinds: Vec<UpdateKind>,
    pub timeout: Duration,
}

impl StreamRequest {
    pub fn new(url: impl Into<String>, body: Value, watch: KeywordWatch) -> Self {
        let kinds = watch.kinds();
        Self {
            url: url.into(),
            body,
            watch,
            kinds,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
