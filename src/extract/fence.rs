use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// A complete fenced region in the final response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Byte span of the whole block, fences included.
    pub span: Range<usize>,
    /// Text between the fences, minus the optional `json` tag.
    pub body: &'a str,
    /// Text between the previous block (or start) and this fence, which some
    /// producers use to name the block (`FINAL_MARKET_ANALYSIS:`).
    pub label: &'a str,
}

fn fence_regex() -> &'static Regex {
    static FENCE_RE: OnceLock<Regex> = OnceLock::new();
    FENCE_RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence pattern must compile")
    })
}

pub fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut previous_end = 0;

    for captures in fence_regex().captures_iter(text) {
        let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        blocks.push(FencedBlock {
            span: whole.range(),
            body: body.as_str(),
            label: &text[previous_end..whole.start()],
        });
        previous_end = whole.end();
    }

    blocks
}

/// Best-effort span of the outermost `{ ... }` in `text`.
pub fn outer_object_span(text: &str) -> Option<Range<usize>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then_some(start..end + 1)
}
