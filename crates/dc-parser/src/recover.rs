//! Ordered parse strategies for malformed model JSON.
//!
//! Cheap, non-destructive fixes run first so that well-formed input is never
//! touched by the aggressive ones. Truncation repair discards data and runs
//! last.

use std::cell::OnceCell;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::scan::{StringState, excerpt, nesting_delta};

const EXCERPT_CHARS: usize = 200;

/// Parse strategy, in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoveryStrategy {
    /// The payload parsed as-is.
    Direct,
    /// Raw control characters inside strings were escaped.
    EscapeControlChars,
    /// Whitespace outside strings was removed as well.
    CompactWhitespace,
    /// Bare keys were quoted and single quotes converted.
    NormalizeQuotes,
    /// A truncated payload was cut back to its last complete object.
    RepairTruncation,
}

impl RecoveryStrategy {
    pub const ALL: [Self; 5] = [
        Self::Direct,
        Self::EscapeControlChars,
        Self::CompactWhitespace,
        Self::NormalizeQuotes,
        Self::RepairTruncation,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::EscapeControlChars => "escape-control-chars",
            Self::CompactWhitespace => "compact-whitespace",
            Self::NormalizeQuotes => "normalize-quotes",
            Self::RepairTruncation => "repair-truncation",
        }
    }

    fn attempt(self, input: &Prepared<'_>) -> Result<Value, String> {
        match self {
            Self::Direct => parse_strict(input.raw),
            Self::EscapeControlChars => parse_strict(input.escaped()),
            Self::CompactWhitespace => parse_strict(input.compacted()),
            Self::NormalizeQuotes => parse_loose(&normalize_quotes(input.compacted())),
            Self::RepairTruncation => {
                let repaired = repair_truncation(input.compacted()).ok_or_else(|| {
                    "payload is not truncated or holds no complete object".to_string()
                })?;
                parse_strict(&repaired)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Value,
    pub strategy: RecoveryStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("all {attempts} parse strategies failed; last error: {last_error}")]
pub struct RecoveryError {
    pub attempts: usize,
    pub last_error: String,
    /// Head of the payload that could not be parsed.
    pub excerpt: String,
}

/// Intermediate texts, computed once and only when a strategy needs them.
struct Prepared<'a> {
    raw: &'a str,
    escaped: OnceCell<String>,
    compacted: OnceCell<String>,
}

impl<'a> Prepared<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            escaped: OnceCell::new(),
            compacted: OnceCell::new(),
        }
    }

    fn escaped(&self) -> &str {
        self.escaped.get_or_init(|| escape_control_chars(self.raw))
    }

    fn compacted(&self) -> &str {
        self.compacted
            .get_or_init(|| compact_whitespace(self.escaped()))
    }
}

/// Parse `payload`, trying each [`RecoveryStrategy`] in order.
pub fn recover_array(payload: &str) -> Result<Recovered, RecoveryError> {
    let prepared = Prepared::new(payload);
    let mut last_error = String::new();

    for strategy in RecoveryStrategy::ALL {
        match strategy.attempt(&prepared) {
            Ok(value) => return Ok(Recovered { value, strategy }),
            Err(error) => last_error = format!("{}: {error}", strategy.as_str()),
        }
    }

    Err(RecoveryError {
        attempts: RecoveryStrategy::ALL.len(),
        last_error,
        excerpt: excerpt(payload, EXCERPT_CHARS),
    })
}

fn parse_strict(text: &str) -> Result<Value, String> {
    serde_json::from_str::<Value>(text).map_err(|error| error.to_string())
}

fn parse_loose(text: &str) -> Result<Value, String> {
    serde_json::from_str::<Value>(text).or_else(|json_error| {
        json5::from_str::<Value>(text).map_err(|json5_error| {
            format!("JSON parse failed ({json_error}); JSON5 parse failed ({json5_error})")
        })
    })
}

/// Escape raw control characters that appear inside string literals.
pub(crate) fn escape_control_chars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut state = StringState::default();
    for ch in input.chars() {
        let inside = state.in_string();
        state.advance(ch);
        if inside && u32::from(ch) < 0x20 {
            match ch {
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                other => out.push_str(&format!("\\u{:04x}", u32::from(other))),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Drop whitespace that lies outside string literals.
pub(crate) fn compact_whitespace(input: &str) -> String {
    let mut state = StringState::default();
    input
        .chars()
        .filter(|ch| !(state.advance(*ch) && ch.is_whitespace()))
        .collect()
}

/// Quote bare object keys and, when single quotes dominate, convert them to
/// double quotes.
pub(crate) fn normalize_quotes(input: &str) -> String {
    let single = input.matches('\'').count();
    let double = input.matches('"').count();
    let requoted = if single > double * 2 {
        input.replace('\'', "\"")
    } else {
        input.to_string()
    };
    quote_bare_keys(&requoted)
}

fn quote_bare_keys(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut state = StringState::default();
    let mut expect_key = false;
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        if expect_key && !state.in_string() && is_key_start(ch) {
            let mut end = index;
            while end < chars.len() && is_key_continue(chars[end]) {
                end += 1;
            }
            let mut look = end;
            while look < chars.len() && chars[look].is_whitespace() {
                look += 1;
            }
            if chars.get(look) == Some(&':') {
                out.push('"');
                out.extend(&chars[index..end]);
                out.push('"');
                index = end;
                expect_key = false;
                continue;
            }
        }

        if state.advance(ch) {
            if ch == '{' || ch == ',' {
                expect_key = true;
            } else if !ch.is_whitespace() {
                expect_key = false;
            }
        } else {
            expect_key = false;
        }
        out.push(ch);
        index += 1;
    }
    out
}

fn is_key_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_key_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' || ch == '-'
}

/// Cut an unterminated array back to its last complete top-level object and
/// close it. Returns `None` when the input is already terminated or no
/// object ever closed at depth one.
pub(crate) fn repair_truncation(input: &str) -> Option<String> {
    let mut state = StringState::default();
    let mut depth = 0_isize;
    let mut last_complete = None;

    for (index, ch) in input.char_indices() {
        if !state.advance(ch) {
            continue;
        }
        depth += nesting_delta(ch);
        if ch == '}' && depth == 1 {
            last_complete = Some(index);
        }
    }

    if depth <= 0 && !state.in_string() {
        return None;
    }
    let end = last_complete?;
    let mut repaired = input[..=end].to_string();
    repaired.push(']');
    Some(repaired)
}
