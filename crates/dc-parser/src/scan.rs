//! String-literal tracking shared by every text pass over JSON-ish input.

/// Tracks whether a scan is inside a double-quoted string literal.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StringState {
    in_string: bool,
    escaped: bool,
}

impl StringState {
    /// Feed one character. Returns `true` when the character is structural,
    /// i.e. outside any string literal and not a quote delimiter.
    pub(crate) fn advance(&mut self, ch: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return false;
        }
        if ch == '"' {
            self.in_string = true;
            return false;
        }
        true
    }

    pub(crate) const fn in_string(self) -> bool {
        self.in_string
    }
}

/// Bracket depth over `[`/`]` and `{`/`}` outside strings.
pub(crate) fn nesting_delta(ch: char) -> isize {
    match ch {
        '[' | '{' => 1,
        ']' | '}' => -1,
        _ => 0,
    }
}

/// First `max_chars` characters of `input`, for diagnostics.
pub(crate) fn excerpt(input: &str, max_chars: usize) -> String {
    let mut chars = input.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
