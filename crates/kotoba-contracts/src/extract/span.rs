/// Candidate JSON spans inside free text, most specific first: the contents of
/// every fenced code block, then balanced `{…}` / `[…]` spans in order of
/// their opening bracket.
pub fn candidate_spans(text: &str) -> Vec<&str> {
    let mut spans: Vec<&str> = Vec::new();
    for fenced in fenced_blocks(text) {
        push_unique(&mut spans, fenced);
    }

    let object_start = text.find('{');
    let array_start = text.find('[');
    let mut starts: Vec<usize> = [object_start, array_start].into_iter().flatten().collect();
    starts.sort_unstable();
    for start in starts {
        if let Some(span) = balanced_span(text, start) {
            push_unique(&mut spans, span);
        }
    }
    spans
}

/// Best base text for textual repairs: the first fenced block, else the first
/// object span (balanced or running to the last `}`), else the first array span.
pub fn repair_base(text: &str) -> &str {
    if let Some(fenced) = fenced_blocks(text).into_iter().next() {
        return fenced;
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        let Some(start) = text.find(open) else {
            continue;
        };
        if let Some(span) = balanced_span(text, start) {
            return span;
        }
        return match text.rfind(close) {
            Some(end) if end > start => &text[start..=end],
            _ => &text[start..],
        };
    }
    text
}

/// Contents of triple-backtick fences, with an optional language tag
/// (```` ```json ````) removed.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let body_start = match after_open.find('\n') {
            Some(newline)
                if after_open[..newline]
                    .trim()
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric()) =>
            {
                newline + 1
            }
            _ => 0,
        };
        let body = &after_open[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        let content = body[..close].trim();
        if !content.is_empty() {
            out.push(content);
        }
        rest = &body[close + 3..];
    }
    out
}

/// Slice from `start` (an opening bracket) through its matching close bracket,
/// honouring string literals. `None` when the brackets never balance.
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

fn push_unique<'a>(spans: &mut Vec<&'a str>, span: &'a str) {
    if !spans.contains(&span) {
        spans.push(span);
    }
}

#[cfg(test)]
mod tests {
    use super::{candidate_spans, repair_base};

    #[test]
    fn fenced_json_block_comes_first() {
        let text = "Sure! Here it is:\n```json\n{\"a\": 1}\n```\nHope that helps {ok}.";
        assert_eq!(candidate_spans(text)[0], "{\"a\": 1}");
    }

    #[test]
    fn untagged_fence_is_recognized() {
        let text = "```\n[1, 2]\n```";
        assert_eq!(candidate_spans(text)[0], "[1, 2]");
    }

    #[test]
    fn balanced_span_skips_braces_in_strings() {
        let text = "result: {\"note\": \"a } b\", \"n\": {\"x\": 1}} trailing }";
        assert_eq!(
            candidate_spans(text),
            vec!["{\"note\": \"a } b\", \"n\": {\"x\": 1}}"]
        );
    }

    #[test]
    fn array_and_object_spans_are_ordered_by_position() {
        let text = "See [note] then {\"a\": 1}";
        assert_eq!(candidate_spans(text), vec!["[note]", "{\"a\": 1}"]);
    }

    #[test]
    fn repair_base_runs_to_last_brace_when_unbalanced() {
        let text = "x {\"a\": {\"b\": 1} y";
        assert_eq!(repair_base(text), "{\"a\": {\"b\": 1}");
    }
}
