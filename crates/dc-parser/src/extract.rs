//! Locate the JSON array inside a decorated model response.

use std::borrow::Cow;

use serde::Serialize;
use thiserror::Error;

use crate::scan::{StringState, nesting_delta};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("response is empty")]
    Empty,
    #[error("no JSON array start `[` found")]
    NoArrayStart,
    #[error("no JSON array end `]` found and no complete object to recover")]
    NoArrayEnd,
}

/// How the end of the array was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BracketMatch {
    /// Depth-tracked match of the opening bracket.
    Structural,
    /// Last `]` in the text. Used when the slice is balanced or no object
    /// ever closed.
    LastBracket,
    /// No closing bracket at all; the payload runs to the end of the text.
    Unterminated,
}

impl BracketMatch {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::LastBracket => "last-bracket",
            Self::Unterminated => "unterminated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Text believed to hold exactly one top-level JSON array.
    pub payload: String,
    pub matched: BracketMatch,
    /// The response looked double-encoded and was decoded first.
    pub decoded: bool,
}

/// Find the JSON array payload in `input`.
///
/// Order of operations:
/// 1. Undo double encoding (a JSON string holding the response).
/// 2. Unwrap a markdown code fence.
/// 3. Match the first `[` with its closing bracket, tracking strings.
/// 4. Fall back to the last `]` when that slice is balanced, else to the
///    unterminated tail.
/// 5. Drop trailing commas before `}` or `]`.
pub fn extract_array_payload(input: &str) -> Result<Extracted, ExtractError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::Empty);
    }

    let decoded = decode_double_encoding(trimmed);
    let was_decoded = matches!(decoded, Cow::Owned(_));
    let body = strip_code_fence(decoded.trim());

    let start = body.find('[').ok_or(ExtractError::NoArrayStart)?;
    let tail = &body[start..];
    let (slice, matched) = if let Some(end) = matching_bracket(body, start) {
        (&body[start..=end], BracketMatch::Structural)
    } else {
        match body.rfind(']').filter(|end| *end > start) {
            // An unbalanced slice would end inside nested `points`; the tail
            // keeps the complete objects before the cut.
            Some(end) if is_balanced(&body[start..=end]) || !tail.contains('}') => {
                (&body[start..=end], BracketMatch::LastBracket)
            }
            _ if tail.contains('}') => (tail, BracketMatch::Unterminated),
            _ => return Err(ExtractError::NoArrayEnd),
        }
    };

    Ok(Extracted {
        payload: strip_trailing_commas(slice),
        matched,
        decoded: was_decoded,
    })
}

fn decode_double_encoding(trimmed: &str) -> Cow<'_, str> {
    let looks_encoded = trimmed.contains("\\\"") || trimmed.contains("\\n");
    if trimmed.starts_with('[') || !looks_encoded {
        return Cow::Borrowed(trimmed);
    }
    match serde_json::from_str::<String>(trimmed) {
        Ok(decoded) => Cow::Owned(decoded),
        Err(_) => Cow::Owned(unescape_common(trimmed)),
    }
}

fn unescape_common(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let replacement = match chars.peek() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('t') => '\t',
            Some('"') => '"',
            Some('\\') => '\\',
            _ => {
                out.push(ch);
                continue;
            }
        };
        chars.next();
        out.push(replacement);
    }
    out
}

fn strip_code_fence(input: &str) -> &str {
    const FENCE: &str = "```";
    if input.starts_with('[') {
        return input;
    }
    let Some(open) = input.find(FENCE) else {
        return input;
    };
    let mut rest = &input[open + FENCE.len()..];
    if rest
        .get(..4)
        .is_some_and(|tag| tag.eq_ignore_ascii_case("json"))
    {
        rest = &rest[4..];
    }
    let inner = match rest.find(FENCE) {
        Some(close) => &rest[..close],
        None => rest,
    };
    inner.trim()
}

/// Byte index of the bracket closing the one at `start`.
fn matching_bracket(input: &str, start: usize) -> Option<usize> {
    let mut state = StringState::default();
    let mut depth = 0_usize;
    for (offset, ch) in input[start..].char_indices() {
        if !state.advance(ch) {
            continue;
        }
        match ch {
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every `[`/`{` is closed, outside strings, and the slice ends outside a
/// string.
fn is_balanced(input: &str) -> bool {
    let mut state = StringState::default();
    let mut depth = 0_isize;
    for ch in input.chars() {
        if state.advance(ch) {
            depth += nesting_delta(ch);
            if depth < 0 {
                return false;
            }
        }
    }
    depth == 0 && !state.in_string()
}

/// Remove commas that directly precede `}` or `]`, outside strings. Runs of
/// commas before a closer are removed together.
pub(crate) fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut state = StringState::default();
    for (index, ch) in input.char_indices() {
        if state.advance(ch) && ch == ',' {
            let rest = input[index + 1..]
                .trim_start_matches(|next: char| next.is_whitespace() || next == ',');
            if rest.starts_with('}') || rest.starts_with(']') {
                continue;
            }
        }
        out.push(ch);
    }
    out
}
