//! Parsing of incomplete JSON text.
//!
//! Structured output arrives as JSON text split across many deltas. To show
//! progress, the prefix received so far is closed off at the last position
//! where it can be made valid: open strings are terminated, dangling keys,
//! commas and unfinished literals are cut, and open containers are closed.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

impl Container {
    fn closer(self) -> char {
        match self {
            Container::Object => '}',
            Container::Array => ']',
        }
    }
}

fn closers(stack: &[Container]) -> String {
    stack.iter().rev().map(|c| c.closer()).collect()
}

/// Index of the first `{` or `[`, skipping any leading prose or code fence.
fn json_start(text: &str) -> Option<usize> {
    text.find(['{', '['])
}

fn is_complete_scalar(token: &str) -> bool {
    match token {
        "true" | "false" | "null" => true,
        _ => {
            !token.ends_with(['.', 'e', 'E', '-', '+'])
                && serde_json::from_str::<serde_json::Number>(token).is_ok()
        }
    }
}

/// Completes a JSON prefix into the longest valid document it implies.
///
/// Returns `None` when not even an empty container can be recovered.
#[must_use]
pub fn complete_partial_json(text: &str) -> Option<String> {
    let start = json_start(text)?;
    let text = &text[start..];

    let mut stack: Vec<Container> = Vec::new();
    // Byte length of the longest prefix that is valid once closed, and
    // the closers it needs.
    let mut safe: Option<(usize, String)> = None;

    let mut in_string = false;
    let mut string_is_key = false;
    let mut escape_start: Option<usize> = None;
    let mut unicode_digits: Option<u8> = None;
    let mut token_start: Option<usize> = None;
    // Whether the next string in the current object is a key.
    let mut expect_key = false;

    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if in_string {
            if let Some(remaining) = unicode_digits {
                if c.is_ascii_hexdigit() {
                    unicode_digits = if remaining > 1 { Some(remaining - 1) } else { None };
                    if unicode_digits.is_none() {
                        escape_start = None;
                    }
                    continue;
                }
                // Malformed escape; give up on anything after the last safe point.
                break;
            }
            if escape_start.is_some() {
                if c == 'u' {
                    unicode_digits = Some(4);
                } else {
                    escape_start = None;
                }
                continue;
            }
            match c {
                '\\' => escape_start = Some(i),
                '"' => {
                    in_string = false;
                    if !string_is_key {
                        safe = Some((i + 1, closers(&stack)));
                    }
                }
                _ => {}
            }
            continue;
        }

        if let Some(ts) = token_start {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+') {
                continue;
            }
            token_start = None;
            if is_complete_scalar(&text[ts..i]) {
                safe = Some((i, closers(&stack)));
            } else {
                break;
            }
        }

        match c {
            '{' => {
                stack.push(Container::Object);
                expect_key = true;
                safe = Some((i + 1, closers(&stack)));
            }
            '[' => {
                stack.push(Container::Array);
                expect_key = false;
                safe = Some((i + 1, closers(&stack)));
            }
            '}' | ']' => {
                let expected = if c == '}' {
                    Container::Object
                } else {
                    Container::Array
                };
                if stack.pop() != Some(expected) {
                    break;
                }
                safe = Some((i + 1, closers(&stack)));
                if stack.is_empty() {
                    return Some(text[..=i].to_string());
                }
                expect_key = false;
            }
            '"' => {
                in_string = true;
                string_is_key = expect_key && stack.last() == Some(&Container::Object);
                expect_key = false;
            }
            ',' => {
                expect_key = stack.last() == Some(&Container::Object);
            }
            ':' => {
                expect_key = false;
            }
            c if c.is_whitespace() => {}
            c if c.is_ascii_alphanumeric() || c == '-' => {
                token_start = Some(i);
            }
            _ => break,
        }
    }

    // Input ended mid-token: use it if it can be closed as is.
    if in_string && !string_is_key {
        // An unfinished escape sequence is cut off entirely.
        let end = escape_start.unwrap_or(text.len());
        return Some(format!("{}\"{}", &text[..end], closers(&stack)));
    }
    if let Some(ts) = token_start {
        if is_complete_scalar(&text[ts..]) {
            return Some(format!("{}{}", text, closers(&stack)));
        }
    }

    safe.map(|(end, close)| format!("{}{}", &text[..end], close))
}

/// Returns the first balanced JSON document in `text`, ignoring anything
/// around it, or `None` if the document never closes.
#[must_use]
pub fn closed_document(text: &str) -> Option<&str> {
    let start = json_start(text)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return text.get(start..=start + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses a JSON prefix into the value it implies so far.
#[must_use]
pub fn parse_partial_json(text: &str) -> Option<Value> {
    let completed = complete_partial_json(text)?;
    serde_json::from_str(&completed).ok()
}
