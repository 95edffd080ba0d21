use crate::error::ReviewError;
use crate::types::ReviewVerdict;
use serde_json::Value;

/// The outermost `{ ... }` region of a model answer, or the whole answer.
fn extract_json_object(text: &str) -> &str {
    let trimmed = text.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Rewrites single-quoted strings, bare keys and bare string values into
/// strict JSON. Double-quoted strings are copied untouched.
fn repair_loose_json(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        i = match chars[i] {
            '"' => copy_double_quoted(&chars, i, &mut out),
            '\'' => quote_single_quoted(&chars, i, &mut out),
            c if is_bare_start(c) => quote_bare_token(&chars, i, &mut out),
            c => {
                out.push(c);
                i + 1
            }
        };
    }
    out
}

fn is_bare_start(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '-' | '+' | '.')
}

fn is_structural(c: char) -> bool {
    matches!(c, ',' | '{' | '}' | '[' | ']' | ':' | '"' | '\'' | '\n' | '\r')
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from.min(chars.len())..]
        .iter()
        .copied()
        .find(|c| !c.is_whitespace())
}

fn copy_double_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        if c == '\\' && i + 1 < chars.len() {
            out.push(chars[i + 1]);
            i += 2;
            continue;
        }
        i += 1;
        if c == '"' {
            break;
        }
    }
    i
}

/// A quote only closes the string when structure follows it, so apostrophes
/// inside words (`doesn't`) stay part of the text.
fn quote_single_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            text.push(match chars[i + 1] {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
            i += 2;
            continue;
        }
        i += 1;
        if c == '\''
            && matches!(next_significant(chars, i), None | Some(',' | '}' | ']' | ':'))
        {
            break;
        }
        text.push(c);
    }
    out.push_str(&Value::String(text).to_string());
    i
}

fn quote_bare_token(chars: &[char], start: usize, out: &mut String) -> usize {
    let mut end = start;
    while end < chars.len() && !is_structural(chars[end]) {
        end += 1;
    }
    let token: String = chars[start..end].iter().collect();
    let value = token.trim_end();

    let is_key = next_significant(chars, end) == Some(':');
    let is_literal = matches!(value, "true" | "false" | "null")
        || serde_json::from_str::<f64>(value).is_ok();
    if !is_key && is_literal {
        out.push_str(value);
    } else {
        out.push_str(&Value::String(value.to_string()).to_string());
    }
    out.push_str(&token[value.len()..]);
    end
}

/// Parses strict JSON, falling back to repairing the loosely quoted objects
/// models tend to emit (`{confidenceThreshold: 1, reviewComment: 'ok'}`).
pub fn parse_loose_json(input: &str) -> Result<Value, serde_json::Error> {
    match serde_json::from_str(input) {
        Ok(value) => Ok(value),
        Err(strict) => {
            let repaired = repair_loose_json(input);
            serde_json::from_str(&repaired).map_err(|e| {
                tracing::debug!("Loose JSON repair failed ({}), strict error: {}", e, strict);
                e
            })
        }
    }
}

/// Validates the judge's answer into a verdict with a confidence in `[0, 1]`.
pub fn parse_verdict(raw: &str) -> Result<ReviewVerdict, ReviewError> {
    let invalid = |reason: &str| ReviewError::VerdictParse {
        reason: reason.to_string(),
        payload: raw.to_string(),
    };

    let value = parse_loose_json(extract_json_object(raw)).map_err(|e| invalid(&e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| invalid("answer is not a JSON object"))?;

    let review_comment = match object.get("reviewComment") {
        Some(Value::String(comment)) => comment.clone(),
        _ => return Err(invalid("reviewComment must be a string")),
    };

    let confidence = match object.get("confidenceThreshold") {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite())
    .ok_or_else(|| invalid("confidenceThreshold must be a finite number"))?;

    Ok(ReviewVerdict {
        confidence_threshold: confidence.clamp(0.0, 1.0),
        review_comment,
    })
}
