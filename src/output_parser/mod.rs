//! Structured-output extraction for agent answers.
//!
//! Worker agents are instructed to end their reasoning with a fenced ```json
//! block holding `{"note": ..., "result": {...}}`. In practice the model may
//! think out loud before the block, wrap the result object in a one-element
//! array, embed quotes and braces inside string values, or emit payloads
//! polluted with Python literals (`None`, `True`, single-quoted dicts) that a
//! tool serialized with its native string form. Extraction therefore uses a
//! string-aware balanced-brace scan instead of regexes: a non-greedy pattern
//! truncates at the first inner `}` and corrupts nested tool outputs.
//!
//! The entry point never panics and never returns an error: degraded input
//! degrades to a diagnostic payload the caller must handle.

use serde_json::{json, Value};

/// Parsed `(note, result)` pair recovered from raw model text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOutput {
    pub note: Option<String>,
    pub result: ResultPayload,
}

/// The three shapes a result can take. Callers must handle all of them.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    /// The extracted result substring parsed as a JSON object.
    Parsed(Value),
    /// A result substring was found but is not valid JSON. The raw text is
    /// preserved verbatim together with the parse error; nothing is silently
    /// dropped and nothing is semantically repaired.
    Unparsed { text: String, parse_error: String },
    /// No fenced block and no `"result"` key were found at all.
    Missing { full_output: String },
}

impl ResultPayload {
    /// The payload as a JSON value suitable for merging into shared state.
    pub fn to_value(&self) -> Value {
        match self {
            ResultPayload::Parsed(value) => value.clone(),
            ResultPayload::Unparsed { text, parse_error } => json!({
                "raw_result": text,
                "parse_error": parse_error,
            }),
            ResultPayload::Missing { full_output } => json!({
                "full_output": full_output,
            }),
        }
    }

    pub fn as_parsed(&self) -> Option<&Value> {
        match self {
            ResultPayload::Parsed(value) => Some(value),
            _ => None,
        }
    }
}

/// Parse the structured `(note, result)` answer out of raw agent text.
///
/// Pure and total: identical input yields identical output, and every input
/// yields some `ParsedOutput`.
pub fn parse_structured_output(agent_output: &str) -> ParsedOutput {
    let region = extract_fenced_block(agent_output).unwrap_or(agent_output);
    let note = extract_note(region);

    match extract_result_text(region) {
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => ParsedOutput {
                note,
                result: ResultPayload::Parsed(value),
            },
            Err(e) => ParsedOutput {
                note,
                result: ResultPayload::Unparsed {
                    text: raw.to_string(),
                    parse_error: e.to_string(),
                },
            },
        },
        None => ParsedOutput {
            note: note
                .or_else(|| Some("No structured output found in agent answer".to_string())),
            result: ResultPayload::Missing {
                full_output: agent_output.to_string(),
            },
        },
    }
}

/// Interior of the last complete fenced code block, if any. Agents sometimes
/// emit an exploratory block before the final structured answer, so the last
/// one wins. The fence label (`json`) is skipped along with the rest of the
/// opening line.
pub(crate) fn extract_fenced_block(text: &str) -> Option<&str> {
    let mut last_block = None;
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find("```") {
        let open = search_from + rel;
        let after_label = match text[open + 3..].find('\n') {
            Some(i) => open + 3 + i + 1,
            None => break,
        };
        let close = match text[after_label..].find("```") {
            Some(i) => after_label + i,
            None => break,
        };
        last_block = Some(&text[after_label..close]);
        search_from = close + 3;
    }
    last_block
}

/// Extract the string value of the `"note"` key with an escape-aware scan;
/// a greedy regex would stop at the first quote inside the note text.
fn extract_note(region: &str) -> Option<String> {
    let key = region.find("\"note\"")?;
    let after_key = &region[key + "\"note\"".len()..];
    let colon = after_key.find(':')?;
    let value = after_key[colon + 1..].trim_start();
    if !value.starts_with('"') {
        return None;
    }
    let quoted = scan_quoted_string(value)?;
    // Unescape through serde; fall back to the raw interior if the string
    // uses escapes serde rejects.
    match serde_json::from_str::<String>(quoted) {
        Ok(s) => Some(s),
        Err(_) => Some(quoted[1..quoted.len() - 1].to_string()),
    }
}

/// The candidate text of the `"result"` value. Scans to the opening brace
/// (skipping whitespace and array brackets, since tool outputs sometimes wrap
/// a single object in a one-element list) and balance-matches to the true
/// closing brace. When the braces never balance the remainder of the region
/// is returned so the caller can surface it as an unparsed payload instead of
/// discarding it.
fn extract_result_text(region: &str) -> Option<&str> {
    let key = region.find("\"result\"")?;
    let after_key = &region[key + "\"result\"".len()..];
    let colon = after_key.find(':')?;
    let value = &after_key[colon + 1..];

    let mut start = None;
    for (i, c) in value.char_indices() {
        match c {
            '{' => {
                start = Some(i);
                break;
            }
            c if c.is_whitespace() || c == '[' => continue,
            _ => return None,
        }
    }
    let start = start?;
    let candidate = &value[start..];
    Some(balanced_object(candidate).unwrap_or_else(|| candidate.trim_end()))
}

/// Slice of `s` from its leading `{` to the matching `}` at depth zero.
/// Braces inside quoted strings are ignored and escape sequences are honored.
/// Returns `None` when the braces never balance.
pub(crate) fn balanced_object(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                b'\\' if !escaped => escaped = true,
                b'"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Escape-aware scan over a quoted string, returning the slice including both
/// quote characters.
fn scan_quoted_string(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    debug_assert_eq!(bytes.first(), Some(&b'"'));
    let mut escaped = false;
    for i in 1..bytes.len() {
        match bytes[i] {
            b'\\' if !escaped => escaped = true,
            b'"' if !escaped => return Some(&s[..i + 1]),
            _ => escaped = false,
        }
    }
    None
}
