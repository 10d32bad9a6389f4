//! Textual repairs for near-miss JSON emitted by language models.
//!
//! Every repair is a pure `&str -> String` function that leaves string literals
//! untouched, so each one can be exercised in isolation.

#[derive(Clone, Copy)]
pub struct Repair {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

impl std::fmt::Debug for Repair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repair").field("name", &self.name).finish()
    }
}

/// Applied in order; the extractor retries parsing after each one.
pub const REPAIRS: &[Repair] = &[
    Repair {
        name: "strip_trailing_commas",
        apply: strip_trailing_commas,
    },
    Repair {
        name: "quote_bare_keys",
        apply: quote_bare_keys,
    },
    Repair {
        name: "quote_bare_values",
        apply: quote_bare_values,
    },
];

/// Removes a comma that is followed (after whitespace) by `}` or `]`.
pub fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut literal = LiteralState::default();
    for (idx, ch) in chars.iter().copied().enumerate() {
        if literal.feed(ch) {
            out.push(ch);
            continue;
        }
        if ch == ',' {
            let next = chars[idx + 1..]
                .iter()
                .copied()
                .find(|next| !next.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Wraps identifier-like object keys (`{name: 1}`, `{'name': 1}`) in double quotes.
pub fn quote_bare_keys(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut literal = LiteralState::default();
    let mut stack: Vec<char> = Vec::new();
    let mut expect_key = false;
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        if literal.feed(ch) {
            out.push(ch);
            idx += 1;
            continue;
        }
        match ch {
            '{' => {
                stack.push('{');
                expect_key = true;
            }
            '[' => {
                stack.push('[');
                expect_key = false;
            }
            '}' | ']' => {
                stack.pop();
                expect_key = false;
            }
            ',' => expect_key = stack.last() == Some(&'{'),
            _ if ch.is_whitespace() => {}
            _ if expect_key => {
                expect_key = false;
                if let Some((key, end)) = bare_key_at(&chars, idx) {
                    out.push('"');
                    out.push_str(&escape_json(&key));
                    out.push('"');
                    idx = end;
                    continue;
                }
            }
            _ => {}
        }
        out.push(ch);
        idx += 1;
    }
    out
}

/// Wraps unquoted scalar values (`"level": N5`, `["ニチ", ジツ]`) in double
/// quotes. Numbers and the literals `true`, `false`, `null` are left alone.
pub fn quote_bare_values(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut literal = LiteralState::default();
    let mut stack: Vec<char> = Vec::new();
    let mut expect_value = false;
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        if literal.feed(ch) {
            out.push(ch);
            idx += 1;
            continue;
        }
        match ch {
            '{' => {
                stack.push('{');
                expect_value = false;
            }
            '[' => {
                stack.push('[');
                expect_value = true;
            }
            '}' | ']' => {
                stack.pop();
                expect_value = false;
            }
            ':' => expect_value = stack.last() == Some(&'{'),
            ',' => expect_value = stack.last() == Some(&'['),
            '"' => expect_value = false,
            _ if ch.is_whitespace() => {}
            _ if expect_value => {
                expect_value = false;
                let end = chars[idx..]
                    .iter()
                    .position(|next| matches!(next, ',' | '}' | ']' | '\n' | '\r'))
                    .map(|offset| idx + offset)
                    .unwrap_or(chars.len());
                let token: String = chars[idx..end].iter().collect();
                let trimmed = token.trim_end();
                if is_json_scalar_literal(trimmed) {
                    out.push_str(&token);
                } else {
                    let unquoted = trimmed.trim_matches('\'');
                    out.push('"');
                    out.push_str(&escape_json(unquoted));
                    out.push('"');
                    out.push_str(&token[trimmed.len()..]);
                }
                idx = end;
                continue;
            }
            _ => {}
        }
        out.push(ch);
        idx += 1;
    }
    out
}

/// Tracks whether the scanner is inside a double-quoted string literal.
#[derive(Default)]
struct LiteralState {
    in_string: bool,
    escaped: bool,
}

impl LiteralState {
    /// Feeds one char; returns `true` when the char belongs to a string literal
    /// (including its quotes) and must be copied through unchanged.
    fn feed(&mut self, ch: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return true;
        }
        if ch == '"' {
            self.in_string = true;
            return true;
        }
        false
    }
}

fn bare_key_at(chars: &[char], start: usize) -> Option<(String, usize)> {
    let quoted = chars[start] == '\'';
    let mut end = start;
    let key: String = if quoted {
        let close = chars[start + 1..].iter().position(|ch| *ch == '\'')? + start + 1;
        end = close + 1;
        chars[start + 1..close].iter().collect()
    } else {
        while end < chars.len() && is_key_char(chars[end]) {
            end += 1;
        }
        chars[start..end].iter().collect()
    };
    if key.is_empty() && !quoted {
        return None;
    }
    let colon = chars[end..].iter().position(|ch| !ch.is_whitespace())? + end;
    if chars[colon] != ':' {
        return None;
    }
    Some((key, end))
}

fn is_key_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '$' | '-')
}

fn is_json_scalar_literal(token: &str) -> bool {
    if token.is_empty() || matches!(token, "true" | "false" | "null") {
        return true;
    }
    if token.starts_with(['{', '[', '"']) {
        return true;
    }
    serde_json::from_str::<serde_json::Number>(token).is_ok()
}

fn escape_json(raw: &str) -> String {
    let encoded = serde_json::to_string(raw).unwrap_or_default();
    encoded
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or_default()
        .to_string()
}
