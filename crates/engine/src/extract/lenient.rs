//! Tolerant parser for the engine's semi-structured result notation.
//!
//! The engine serializes its step context in something that is usually, but not
//! always, JSON: keys may be bare, strings may use single quotes, members may be
//! separated by newlines instead of commas, trailing commas are common, and the text
//! may be cut off mid-document. This parser accepts that grammar subset and reports
//! what it had to repair instead of failing.
//!
//! ```text
//! value  := object | array | string | scalar
//! object := '{' (member (sep member)*)? sep? '}'
//! member := (string | bare-key) ':' value
//! array  := '[' (value (sep value)*)? sep? ']'
//! sep    := ',' | newline
//! scalar := bare text up to ',' '}' ']' or newline; true/false/null/numbers are typed
//! ```
//!
//! Parsing never panics. Leading text before the first `{` or `[` is skipped, unclosed
//! containers are closed at end of input, and nesting deeper than [`MAX_DEPTH`] is
//! replaced by `null`.

use serde_json::{Map, Value};

/// Deepest container nesting that is materialized.
pub const MAX_DEPTH: usize = 64;

/// Parsed value plus the repairs applied while parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LenientParse {
    /// `None` when the input held no object or array at all.
    pub value: Option<Value>,
    pub issues: Vec<String>,
}

/// Parses the first object or array found in `input`.
pub fn parse(input: &str) -> LenientParse {
    let mut parser = Parser::new(input);
    let Some(start) = parser.chars.iter().position(|character| matches!(character, '{' | '[')) else {
        return LenientParse {
            value: None,
            issues: vec!["no object or array found".to_string()],
        };
    };
    if start > 0 {
        parser.issue(format!("skipped {start} leading characters"));
    }
    parser.position = start;

    let value = parser.parse_value(0);
    parser.skip_whitespace();
    if !parser.at_end() {
        let remaining = parser.chars.len() - parser.position;
        parser.issue(format!("ignored {remaining} trailing characters"));
    }

    LenientParse {
        value: Some(value),
        issues: parser.issues,
    }
}

struct Parser {
    chars: Vec<char>,
    position: usize,
    issues: Vec<String>,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            position: 0,
            issues: Vec::new(),
        }
    }

    fn issue(&mut self, message: impl Into<String>) {
        self.issues.push(message.into());
    }

    fn at_end(&self) -> bool {
        self.position >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let character = self.peek()?;
        self.position += 1;
        Some(character)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    /// Skips whitespace and member separators.
    fn skip_separators(&mut self) {
        while self.peek().is_some_and(|character| character.is_whitespace() || character == ',') {
            self.position += 1;
        }
    }

    fn parse_value(&mut self, depth: usize) -> Value {
        self.skip_whitespace();
        match self.peek() {
            None => {
                self.issue("value missing at end of input");
                Value::Null
            }
            Some('{') | Some('[') if depth >= MAX_DEPTH => {
                self.issue(format!("nesting deeper than {MAX_DEPTH} replaced by null"));
                self.skip_container();
                Value::Null
            }
            Some('{') => {
                self.position += 1;
                self.parse_object(depth + 1)
            }
            Some('[') => {
                self.position += 1;
                self.parse_array(depth + 1)
            }
            Some(quote @ ('"' | '\'')) => {
                self.position += 1;
                Value::String(self.parse_string(quote))
            }
            Some(',') | Some('}') | Some(']') => Value::Null,
            Some(_) => self.parse_scalar(),
        }
    }

    fn parse_object(&mut self, depth: usize) -> Value {
        let mut members = Map::new();
        loop {
            self.skip_separators();
            let before = self.position;
            match self.peek() {
                None => {
                    self.issue("object truncated");
                    break;
                }
                Some('}') => {
                    self.position += 1;
                    break;
                }
                Some(']') => {
                    self.issue("object closed by ']'");
                    self.position += 1;
                    break;
                }
                Some(_) => {}
            }

            let key = self.parse_key();
            self.skip_inline_whitespace();
            if self.peek() == Some(':') {
                self.position += 1;
                let value = self.parse_value(depth);
                if let Some(key) = key {
                    members.insert(key, value);
                }
            } else if let Some(key) = key {
                self.issue(format!("member '{key}' has no value"));
                members.insert(key, Value::Null);
            }

            if self.position == before {
                let skipped = self.advance();
                self.issue(format!("unexpected {skipped:?} inside object"));
            }
        }
        Value::Object(members)
    }

    fn parse_array(&mut self, depth: usize) -> Value {
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            let before = self.position;
            match self.peek() {
                None => {
                    self.issue("array truncated");
                    break;
                }
                Some(']') => {
                    self.position += 1;
                    break;
                }
                Some('}') => {
                    self.issue("array closed by '}'");
                    self.position += 1;
                    break;
                }
                Some(_) => {}
            }

            let value = self.parse_value(depth);
            if self.position == before {
                let skipped = self.advance();
                self.issue(format!("unexpected {skipped:?} inside array"));
            } else {
                items.push(value);
            }
        }
        Value::Array(items)
    }

    fn parse_key(&mut self) -> Option<String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.position += 1;
                Some(self.parse_string(quote))
            }
            _ => {
                let start = self.position;
                while self
                    .peek()
                    .is_some_and(|character| !matches!(character, ':' | ',' | '{' | '}' | '[' | ']' | '\n'))
                {
                    self.position += 1;
                }
                let key: String = self.chars[start..self.position].iter().collect();
                let key = key.trim();
                if key.is_empty() { None } else { Some(key.to_string()) }
            }
        }
    }

    fn skip_inline_whitespace(&mut self) {
        while self.peek().is_some_and(|character| character == ' ' || character == '\t') {
            self.position += 1;
        }
    }

    /// Reads a quoted string whose opening quote was already consumed.
    fn parse_string(&mut self, quote: char) -> String {
        let mut text = String::new();
        loop {
            match self.advance() {
                None => {
                    self.issue("string truncated");
                    return text;
                }
                Some(character) if character == quote => return text,
                Some('\\') => match self.advance() {
                    None => {
                        self.issue("string truncated after escape");
                        return text;
                    }
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('b') => text.push('\u{0008}'),
                    Some('f') => text.push('\u{000C}'),
                    Some('u') => text.push_str(&self.parse_unicode_escape()),
                    Some(other) => text.push(other),
                },
                Some(character) => text.push(character),
            }
        }
    }

    /// Decodes the four hex digits after `\u`, keeping the raw text when they are invalid.
    fn parse_unicode_escape(&mut self) -> String {
        let end = (self.position + 4).min(self.chars.len());
        let digits: String = self.chars[self.position..end].iter().collect();
        let decoded = (digits.len() == 4)
            .then(|| u32::from_str_radix(&digits, 16).ok())
            .flatten()
            .and_then(char::from_u32);
        match decoded {
            Some(character) => {
                self.position = end;
                character.to_string()
            }
            None => {
                self.issue("invalid unicode escape kept verbatim");
                "\\u".to_string()
            }
        }
    }

    fn parse_scalar(&mut self) -> Value {
        let start = self.position;
        while self
            .peek()
            .is_some_and(|character| !matches!(character, ',' | '}' | ']' | '\n'))
        {
            self.position += 1;
        }
        let text: String = self.chars[start..self.position].iter().collect();
        typed_scalar(text.trim())
    }

    /// Skips a container without materializing it, honoring quoted strings.
    fn skip_container(&mut self) {
        let mut depth = 0usize;
        while let Some(character) = self.advance() {
            match character {
                '{' | '[' => depth += 1,
                '}' | ']' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                quote @ ('"' | '\'') => {
                    self.parse_string(quote);
                }
                _ => {}
            }
        }
    }
}

fn typed_scalar(text: &str) -> Value {
    match text {
        "" | "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match serde_json::from_str::<Value>(text) {
            Ok(number @ Value::Number(_)) => number,
            _ => Value::String(text.to_string()),
        },
    }
}
