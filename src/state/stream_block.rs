use serde::{Deserialize, Serialize};

/// Where the tail of the accumulated response sits relative to a fenced
/// update block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    /// No update block has been opened yet.
    #[default]
    Outside,
    /// A fence is open and has not seen its closing fence. Nothing after the
    /// fence start is revealed in this state.
    InsideUnclosed,
    /// A fence already judged to be ordinary code is open; its body streams
    /// live.
    InsideCode,
    /// At least one update block has opened and closed; text after it is
    /// revealed again.
    Closed,
}
