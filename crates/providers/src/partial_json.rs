//! Best-effort parsing of truncated JSON.
//!
//! Schema-constrained generation streams one JSON document token by token,
//! so at any instant the accumulated text is usually cut off mid-value.
//! `parse_partial` recovers the largest well-formed prefix as a
//! `serde_json::Value`: unterminated strings keep their decoded content so
//! far, complete array elements and object entries survive, and a dangling
//! key or half-written literal is dropped rather than guessed at.

use serde_json::{Map, Value};

/// Parse a possibly-truncated JSON document.
///
/// Returns `None` when no value has started yet (empty input, lone
/// whitespace, or text that is not JSON).
pub fn parse_partial(input: &str) -> Option<Value> {
    let chars: Vec<char> = input.chars().collect();
    let mut parser = Parser { chars, pos: 0 };
    parser.skip_ws();
    parser.parse_value()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_value(&mut self) -> Option<Value> {
        match self.peek()? {
            '{' => self.parse_object(),
            '[' => self.parse_array(),
            '"' => self.parse_string().map(|(s, _)| Value::String(s)),
            't' | 'f' | 'n' => self.parse_literal(),
            c if c == '-' || c.is_ascii_digit() => self.parse_number(),
            _ => None,
        }
    }

    fn parse_object(&mut self) -> Option<Value> {
        self.bump(); // '{'
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Some(Value::Object(map)),
                Some('}') => {
                    self.bump();
                    return Some(Value::Object(map));
                }
                Some('"') => {}
                // Garbage where a key should be; salvage what we have.
                Some(_) => return Some(Value::Object(map)),
            }

            let Some((key, key_complete)) = self.parse_string() else {
                return Some(Value::Object(map));
            };
            if !key_complete {
                // Key still streaming in; drop it.
                return Some(Value::Object(map));
            }

            self.skip_ws();
            if self.peek() != Some(':') {
                return Some(Value::Object(map));
            }
            self.bump();
            self.skip_ws();

            match self.parse_value() {
                Some(value) => {
                    map.insert(key, value);
                }
                None => return Some(Value::Object(map)),
            }

            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {
                    self.bump();
                    return Some(Value::Object(map));
                }
                _ => return Some(Value::Object(map)),
            }
        }
    }

    fn parse_array(&mut self) -> Option<Value> {
        self.bump(); // '['
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Some(Value::Array(items)),
                Some(']') => {
                    self.bump();
                    return Some(Value::Array(items));
                }
                Some(_) => {}
            }

            match self.parse_value() {
                Some(value) => items.push(value),
                None => return Some(Value::Array(items)),
            }

            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {
                    self.bump();
                    return Some(Value::Array(items));
                }
                _ => return Some(Value::Array(items)),
            }
        }
    }

    /// Returns the decoded string and whether the closing quote was seen.
    fn parse_string(&mut self) -> Option<(String, bool)> {
        if self.peek() != Some('"') {
            return None;
        }
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Some((out, false)),
                Some('"') => return Some((out, true)),
                Some('\\') => match self.bump() {
                    // Escape cut off at end of input; keep what we decoded.
                    None => return Some((out, false)),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('b') => out.push('\u{0008}'),
                    Some('f') => out.push('\u{000C}'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('u') => {
                        let mut code = String::new();
                        for _ in 0..4 {
                            match self.bump() {
                                Some(h) => code.push(h),
                                None => return Some((out, false)),
                            }
                        }
                        if let Some(c) =
                            u32::from_str_radix(&code, 16).ok().and_then(char::from_u32)
                        {
                            out.push(c);
                        }
                    }
                    Some(other) => out.push(other),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_literal(&mut self) -> Option<Value> {
        for (word, value) in [
            ("true", Value::Bool(true)),
            ("false", Value::Bool(false)),
            ("null", Value::Null),
        ] {
            if self.matches_prefix_of(word) {
                let remaining = self.chars.len() - self.pos;
                if remaining >= word.len() {
                    self.pos += word.len();
                    return Some(value);
                }
                // A prefix of the literal at end of input; incomplete.
                self.pos = self.chars.len();
                return None;
            }
        }
        None
    }

    fn matches_prefix_of(&self, word: &str) -> bool {
        let available = &self.chars[self.pos..];
        let take = available.len().min(word.len());
        word.chars().take(take).eq(available[..take].iter().copied())
    }

    fn parse_number(&mut self) -> Option<Value> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')
        ) {
            self.bump();
        }
        let mut token: String = self.chars[start..self.pos].iter().collect();
        // Trim characters that cannot end a number (cut-off exponent etc.).
        while matches!(token.chars().last(), Some('-' | '+' | '.' | 'e' | 'E')) {
            token.pop();
        }
        if token.is_empty() {
            return None;
        }
        if let Ok(i) = token.parse::<i64>() {
            return Some(Value::Number(i.into()));
        }
        token
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn complete_document_parses_exactly() {
        let v = parse_partial(r#"{"code": "fn main() {}", "done": true}"#).unwrap();
        assert_eq!(v, json!({"code": "fn main() {}", "done": true}));
    }

    #[test]
    fn unterminated_string_keeps_decoded_prefix() {
        let v = parse_partial(r#"{"code": "fn mai"#).unwrap();
        assert_eq!(v, json!({"code": "fn mai"}));
    }

    #[test]
    fn dangling_key_is_dropped() {
        let v = parse_partial(r#"{"code": "ok", "next"#).unwrap();
        assert_eq!(v, json!({"code": "ok"}));

        let v = parse_partial(r#"{"code": "ok", "next":"#).unwrap();
        assert_eq!(v, json!({"code": "ok"}));
    }

    #[test]
    fn half_written_literal_is_dropped() {
        let v = parse_partial(r#"{"flag": tru"#).unwrap();
        assert_eq!(v, json!({}));
    }

    #[test]
    fn truncated_array_keeps_complete_elements() {
        let v = parse_partial(r#"[{"a": 1}, {"b": 2}, {"c"#).unwrap();
        assert_eq!(v, json!([{"a": 1}, {"b": 2}, {}]));
    }

    #[test]
    fn nested_objects_recover() {
        let v = parse_partial(r#"{"outer": {"inner": [1, 2"#).unwrap();
        assert_eq!(v, json!({"outer": {"inner": [1, 2]}}));
    }

    #[test]
    fn escape_cut_mid_sequence() {
        let v = parse_partial(r#"{"s": "line\"#).unwrap();
        assert_eq!(v, json!({"s": "line"}));

        let v = parse_partial(r#"{"s": "tab\tdone"#).unwrap();
        assert_eq!(v, json!({"s": "tab\tdone"}));
    }

    #[test]
    fn truncated_exponent_is_trimmed() {
        let v = parse_partial(r#"{"n": 1.5e"#).unwrap();
        assert_eq!(v, json!({"n": 1.5}));
    }

    #[test]
    fn unicode_escape() {
        let v = parse_partial(r#"{"s": "café"}"#).unwrap();
        assert_eq!(v, json!({"s": "café"}));
    }

    #[test]
    fn empty_and_non_json_input() {
        assert!(parse_partial("").is_none());
        assert!(parse_partial("   ").is_none());
        assert!(parse_partial("not json").is_none());
    }

    #[test]
    fn bare_open_brace() {
        assert_eq!(parse_partial("{").unwrap(), json!({}));
        assert_eq!(parse_partial("[").unwrap(), json!([]));
    }
}
