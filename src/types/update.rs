use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level key of a machine-readable update block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    #[serde(rename = "MARKET_UPDATE")]
    MarketUpdate,
    #[serde(rename = "IDEAS_UPDATE")]
    IdeasUpdate,
    #[serde(rename = "APPRAISAL_UPDATE")]
    AppraisalUpdate,
    #[serde(rename = "FINAL_SUMMARY")]
    FinalSummary,
    #[serde(rename = "FINAL_MARKET_ANALYSIS")]
    FinalMarketAnalysis,
    #[serde(rename = "PITCH_DECK_UPDATE")]
    PitchDeckUpdate,
}

impl UpdateKind {
    /// Every kind, in the order used to break ties when one object carries
    /// several recognised keys: final summaries win over incremental updates.
    pub const PRECEDENCE: [UpdateKind; 6] = [
        UpdateKind::FinalMarketAnalysis,
        UpdateKind::FinalSummary,
        UpdateKind::MarketUpdate,
        UpdateKind::IdeasUpdate,
        UpdateKind::AppraisalUpdate,
        UpdateKind::PitchDeckUpdate,
    ];

    pub fn key(self) -> &'static str {
        match self {
            UpdateKind::MarketUpdate => "MARKET_UPDATE",
            UpdateKind::IdeasUpdate => "IDEAS_UPDATE",
            UpdateKind::AppraisalUpdate => "APPRAISAL_UPDATE",
            UpdateKind::FinalSummary => "FINAL_SUMMARY",
            UpdateKind::FinalMarketAnalysis => "FINAL_MARKET_ANALYSIS",
            UpdateKind::PitchDeckUpdate => "PITCH_DECK_UPDATE",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::PRECEDENCE
            .into_iter()
            .find(|kind| kind.key() == key.trim())
    }

    /// `type` tag used on the terminal `done` frame for this kind.
    pub fn done_type(self) -> &'static str {
        match self {
            UpdateKind::FinalMarketAnalysis => "analysis",
            UpdateKind::AppraisalUpdate => "appraisal_update",
            _ => "update",
        }
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Structured payload recovered from a completed update block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedUpdate {
    pub kind: UpdateKind,
    pub payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_keys_round_trip_through_from_key() {
        for kind in UpdateKind::PRECEDENCE {
            assert_eq!(UpdateKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(UpdateKind::from_key("SOMETHING_ELSE"), None);
    }

    #[test]
    fn test_extracted_update_serializes_kind_as_key() {
        let update = ExtractedUpdate {
            kind: UpdateKind::IdeasUpdate,
            payload: serde_json::json!({"ideas": []}),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["kind"], "IDEAS_UPDATE");
    }
}
