use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Double,
    Single,
}

/// Rewrites the JSON-ish text LLMs emit into strict JSON where possible.
///
/// - `'single quoted'` literals outside a double-quoted string become
///   double-quoted, with interior `"` escaped and `\'` unescaped.
/// - A `"` inside a double-quoted string that is not followed by `,` `:` `}`
///   `]` or end of input is an unescaped interior quote and gets escaped.
/// - Existing escapes inside double-quoted strings are copied untouched.
///
/// Valid JSON comes back borrowed and unchanged.
pub fn repair_json(text: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(text.len() + 8);
    let mut changed = false;
    let mut state = Quote::None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        match state {
            Quote::None => match ch {
                '"' => {
                    state = Quote::Double;
                    out.push(ch);
                }
                '\'' => {
                    state = Quote::Single;
                    out.push('"');
                    changed = true;
                }
                _ => out.push(ch),
            },
            Quote::Double => match ch {
                '\\' => {
                    out.push(ch);
                    if let Some((_, escaped)) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' if closes_string(&text[idx + 1..]) => {
                    state = Quote::None;
                    out.push(ch);
                }
                '"' => {
                    out.push_str("\\\"");
                    changed = true;
                }
                _ => out.push(ch),
            },
            Quote::Single => match ch {
                '\\' => match chars.peek().map(|(_, next)| *next) {
                    Some('\'') => {
                        chars.next();
                        out.push('\'');
                        changed = true;
                    }
                    Some(next) => {
                        chars.next();
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                },
                '"' => {
                    out.push_str("\\\"");
                    changed = true;
                }
                '\'' => {
                    state = Quote::None;
                    out.push('"');
                }
                _ => out.push(ch),
            },
        }
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(text)
    }
}

fn closes_string(rest: &str) -> bool {
    match rest.trim_start().chars().next() {
        None => true,
        Some(next) => matches!(next, ',' | ':' | '}' | ']'),
    }
}
