use super::stream_block::BlockState;
use crate::types::UpdateKind;
use crate::util::{floor_char_boundary, utf16_offset};
use aho_corasick::AhoCorasick;

pub const FENCE: &str = "```";

/// Which fenced blocks count as machine-readable updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordWatch {
    /// A fence is an update block once any of these literals has appeared
    /// anywhere in the response, before or after the fence opens.
    AnyOf(Vec<String>),
    /// No keyword known up front: a fence whose tag or body starts with
    /// `json`, `{` or `[` is an update block.
    JsonLike,
    /// Both rules.
    Either(Vec<String>),
}

impl KeywordWatch {
    pub fn for_kinds(kinds: &[UpdateKind]) -> Self {
        KeywordWatch::AnyOf(kinds.iter().map(|kind| kind.key().to_string()).collect())
    }

    pub fn keywords(&self) -> &[String] {
        match self {
            KeywordWatch::AnyOf(keywords) | KeywordWatch::Either(keywords) => keywords,
            KeywordWatch::JsonLike => &[],
        }
    }

    pub fn uses_json_heuristic(&self) -> bool {
        matches!(self, KeywordWatch::JsonLike | KeywordWatch::Either(_))
    }

    /// Update kinds named by the watched keywords; every kind for `JsonLike`.
    pub fn kinds(&self) -> Vec<UpdateKind> {
        match self {
            KeywordWatch::JsonLike => UpdateKind::PRECEDENCE.to_vec(),
            _ => self
                .keywords()
                .iter()
                .filter_map(|keyword| UpdateKind::from_key(keyword))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Text,
    /// Fence opened at `open`; may turn out to be an update block.
    Pending { open: usize },
    /// Fence opened at `open`, known to be ordinary code; revealed live.
    Code { open: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagDecision {
    Json,
    NotJson,
    Undecided,
}

/// Decides, chunk by chunk, how much of a streamed response is safe to show.
///
/// Text inside a fenced block that is (or may still become) an update block is
/// never returned from [`Classifier::push`]. Offsets are byte offsets into
/// [`Classifier::buffer`].
pub struct Classifier {
    watch: KeywordWatch,
    keywords: Vec<String>,
    matcher: Option<AhoCorasick>,
    max_keyword_len: usize,
    keyword_scan_from: usize,
    keyword_seen: bool,
    buffer: String,
    cursor: usize,
    scan: Scan,
    closed_blocks: usize,
    revealed: String,
}

impl Classifier {
    pub fn new(watch: KeywordWatch) -> Self {
        let keywords: Vec<String> = watch
            .keywords()
            .iter()
            .filter(|keyword| !keyword.is_empty())
            .cloned()
            .collect();
        let matcher = if keywords.is_empty() {
            None
        } else {
            AhoCorasick::new(&keywords).ok()
        };
        let max_keyword_len = keywords.iter().map(String::len).max().unwrap_or(0);

        Self {
            watch,
            keywords,
            matcher,
            max_keyword_len,
            keyword_scan_from: 0,
            keyword_seen: false,
            buffer: String::new(),
            cursor: 0,
            scan: Scan::Text,
            closed_blocks: 0,
            revealed: String::new(),
        }
    }

    /// Appends `chunk` and returns the newly revealable text (possibly empty).
    pub fn push(&mut self, chunk: &str) -> String {
        self.buffer.push_str(chunk);
        self.scan_keywords();
        self.advance(false)
    }

    /// End of stream: releases withheld text that is not part of an update
    /// block (an unclosed ordinary fence, trailing backticks). An unclosed
    /// update block stays hidden.
    pub fn finish(&mut self) -> String {
        self.advance(true)
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Everything returned by `push`/`finish` so far, concatenated.
    pub fn revealed(&self) -> &str {
        &self.revealed
    }

    pub fn display_cursor(&self) -> usize {
        self.cursor
    }

    pub fn display_cursor_utf16(&self) -> usize {
        utf16_offset(&self.buffer, self.cursor)
    }

    pub fn keyword_seen(&self) -> bool {
        self.keyword_seen
    }

    /// Position of the stream tail. An open fence reports `InsideUnclosed`
    /// while undecided and `InsideCode` once judged to be plain code.
    pub fn block_state(&self) -> BlockState {
        match self.scan {
            Scan::Pending { .. } => BlockState::InsideUnclosed,
            Scan::Code { .. } => BlockState::InsideCode,
            Scan::Text if self.closed_blocks > 0 => BlockState::Closed,
            Scan::Text => BlockState::Outside,
        }
    }

    fn scan_keywords(&mut self) {
        if self.keyword_seen || self.keywords.is_empty() {
            return;
        }

        // Rescan the last `max_keyword_len - 1` bytes so keywords split across
        // chunks are still found.
        let from = floor_char_boundary(&self.buffer, self.keyword_scan_from);
        let window = &self.buffer[from..];
        self.keyword_seen = match &self.matcher {
            Some(matcher) => matcher.is_match(window),
            None => self.keywords.iter().any(|keyword| window.contains(keyword)),
        };
        self.keyword_scan_from = self
            .buffer
            .len()
            .saturating_sub(self.max_keyword_len.saturating_sub(1));
    }

    fn advance(&mut self, at_end: bool) -> String {
        let mut out = String::new();

        loop {
            match self.scan {
                Scan::Text => match find_from(&self.buffer, FENCE, self.cursor) {
                    Some(open) => {
                        self.emit(open, &mut out);
                        self.scan = Scan::Pending { open };
                    }
                    None => {
                        let safe = self.safe_end(at_end);
                        self.emit(safe, &mut out);
                        break;
                    }
                },
                Scan::Pending { open } => {
                    match find_from(&self.buffer, FENCE, open + FENCE.len()) {
                        Some(close) => {
                            let end = close + FENCE.len();
                            if self.is_update_block(open) {
                                self.cursor = end;
                                self.closed_blocks += 1;
                            } else {
                                self.emit(end, &mut out);
                            }
                            self.scan = Scan::Text;
                        }
                        None if at_end => {
                            if !self.is_update_block(open) {
                                self.emit(self.buffer.len(), &mut out);
                                self.scan = Scan::Text;
                            }
                            break;
                        }
                        None => {
                            let plain_code = matches!(self.watch, KeywordWatch::JsonLike)
                                && self.tag_decision(open) == TagDecision::NotJson;
                            if plain_code {
                                self.scan = Scan::Code { open };
                            } else {
                                break;
                            }
                        }
                    }
                }
                Scan::Code { open } => match find_from(&self.buffer, FENCE, open + FENCE.len()) {
                    Some(close) => {
                        self.emit(close + FENCE.len(), &mut out);
                        self.scan = Scan::Text;
                    }
                    None => {
                        let safe = self.safe_end(at_end);
                        self.emit(safe, &mut out);
                        break;
                    }
                },
            }
        }

        out
    }

    /// End of the revealable region when no fence is pending: everything but a
    /// trailing run of backticks that may still grow into a fence.
    fn safe_end(&self, at_end: bool) -> usize {
        if at_end {
            return self.buffer.len();
        }
        let tail = &self.buffer[self.cursor..];
        let backticks = tail.len() - tail.trim_end_matches('`').len();
        self.buffer.len() - backticks
    }

    fn is_update_block(&self, open: usize) -> bool {
        if self.keyword_seen {
            return true;
        }
        self.watch.uses_json_heuristic() && self.tag_decision(open) == TagDecision::Json
    }

    fn tag_decision(&self, open: usize) -> TagDecision {
        let after = self.buffer[open + FENCE.len()..].trim_start();
        if after.is_empty() {
            return TagDecision::Undecided;
        }
        if after.starts_with('{') || after.starts_with('[') {
            return TagDecision::Json;
        }
        let probe = &after[..floor_char_boundary(after, 4)];
        if probe.eq_ignore_ascii_case("json") {
            TagDecision::Json
        } else if probe.len() < 4 && "json".starts_with(&probe.to_ascii_lowercase()) {
            TagDecision::Undecided
        } else {
            TagDecision::NotJson
        }
    }

    fn emit(&mut self, upto: usize, out: &mut String) {
        if upto > self.cursor {
            let text = &self.buffer[self.cursor..upto];
            out.push_str(text);
            self.revealed.push_str(text);
            self.cursor = upto;
        }
    }
}

fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    haystack
        .get(from..)
        .and_then(|rest| rest.find(needle))
        .map(|idx| idx + from)
}
