/// Literal (non-executing) parser for Python data literals
///
/// Accepts the grammar produced by Python's `repr()` for plain data and the
/// serialized test specs of APPS/TACO-style datasets: strings (single, double
/// and triple quoted, `r`/`b`/`u` prefixes, implicit concatenation), integers
/// (underscores, `0x`/`0o`/`0b`), floats, `True`/`False`/`None` (plus the JSON
/// spellings `true`/`false`/`null`), `inf`/`nan`, lists, tuples, dicts and
/// sets. Nothing is ever evaluated.
use crate::value::Value;
use thiserror::Error;

/// Maximum container nesting accepted before giving up
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },
    #[error("invalid number literal {literal:?} at offset {offset}")]
    InvalidNumber { literal: String, offset: usize },
    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: usize },
    #[error("unknown name {name:?} at offset {offset}")]
    UnknownName { name: String, offset: usize },
    #[error("nesting deeper than {} levels", MAX_DEPTH)]
    TooDeep,
    #[error("trailing input at offset {offset}")]
    TrailingInput { offset: usize },
    #[error("test spec must be a mapping, found {found}")]
    NotAMapping { found: &'static str },
    #[error("test spec is missing key {0:?}")]
    MissingKey(&'static str),
    #[error("test spec key {key:?} must be a {expected}")]
    WrongType { key: &'static str, expected: &'static str },
    #[error("test spec has {inputs} inputs but {outputs} outputs")]
    LengthMismatch { inputs: usize, outputs: usize },
}

/// Parse a complete literal; trailing non-whitespace is an error
pub fn parse_literal(text: &str) -> Result<Value, ParseError> {
    let mut parser = Parser::new(text);
    let value = parser.parse_value(0)?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(ParseError::TrailingInput { offset: parser.pos });
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '\\' && matches!(self.peek_at(1), Some('\n')) {
                // explicit line continuation
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    fn expect_any(&mut self) -> Result<char, ParseError> {
        let c = self.peek().ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(c)
    }

    fn unexpected(&self) -> ParseError {
        match self.peek() {
            Some(found) => ParseError::UnexpectedChar {
                found,
                offset: self.pos,
            },
            None => ParseError::UnexpectedEnd,
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, ParseError> {
        if depth > MAX_DEPTH {
            return Err(ParseError::TooDeep);
        }
        self.skip_whitespace();
        let c = self.peek().ok_or(ParseError::UnexpectedEnd)?;
        match c {
            '[' => {
                self.pos += 1;
                let items = self.parse_items(']', depth)?;
                Ok(Value::List(items))
            }
            '(' => self.parse_paren(depth),
            '{' => self.parse_brace(depth),
            '\'' | '"' => self.parse_strings(),
            '-' | '+' => {
                self.pos += 1;
                let operand = self.parse_value(depth + 1)?;
                apply_sign(c, operand, self.pos)
            }
            c if c.is_ascii_digit() || c == '.' => self.parse_number(),
            c if c.is_alphabetic() || c == '_' => self.parse_name_or_prefixed_string(),
            _ => Err(self.unexpected()),
        }
    }

    /// Comma separated values up to `close`, trailing comma allowed
    fn parse_items(&mut self, close: char, depth: usize) -> Result<Vec<Value>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.parse_value(depth + 1)?);
            self.skip_whitespace();
            match self.expect_any()? {
                ',' => continue,
                c if c == close => return Ok(items),
                found => {
                    return Err(ParseError::UnexpectedChar {
                        found,
                        offset: self.pos - 1,
                    })
                }
            }
        }
    }

    fn parse_paren(&mut self, depth: usize) -> Result<Value, ParseError> {
        self.pos += 1;
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(Value::Tuple(Vec::new()));
        }
        let first = self.parse_value(depth + 1)?;
        self.skip_whitespace();
        match self.expect_any()? {
            // parenthesized expression, not a tuple
            ')' => Ok(first),
            ',' => {
                let mut items = vec![first];
                items.extend(self.parse_items(')', depth)?);
                Ok(Value::Tuple(items))
            }
            found => Err(ParseError::UnexpectedChar {
                found,
                offset: self.pos - 1,
            }),
        }
    }

    fn parse_brace(&mut self, depth: usize) -> Result<Value, ParseError> {
        self.pos += 1;
        self.skip_whitespace();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(Value::Dict(Vec::new()));
        }
        let first = self.parse_value(depth + 1)?;
        self.skip_whitespace();
        if self.peek() != Some(':') {
            // set literal
            let mut items = vec![first];
            match self.expect_any()? {
                '}' => return Ok(Value::Set(items)),
                ',' => {
                    items.extend(self.parse_items('}', depth)?);
                    return Ok(Value::Set(items));
                }
                found => {
                    return Err(ParseError::UnexpectedChar {
                        found,
                        offset: self.pos - 1,
                    })
                }
            }
        }

        let mut pairs = Vec::new();
        let mut key = first;
        loop {
            self.skip_whitespace();
            if self.expect_any()? != ':' {
                return Err(ParseError::UnexpectedChar {
                    found: self.chars[self.pos - 1],
                    offset: self.pos - 1,
                });
            }
            let value = self.parse_value(depth + 1)?;
            pairs.push((key, value));
            self.skip_whitespace();
            match self.expect_any()? {
                '}' => return Ok(Value::Dict(pairs)),
                ',' => {
                    self.skip_whitespace();
                    if self.peek() == Some('}') {
                        self.pos += 1;
                        return Ok(Value::Dict(pairs));
                    }
                    key = self.parse_value(depth + 1)?;
                }
                found => {
                    return Err(ParseError::UnexpectedChar {
                        found,
                        offset: self.pos - 1,
                    })
                }
            }
        }
    }

    fn parse_name_or_prefixed_string(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek(), Some('\'') | Some('"'))
            && name.len() <= 2
            && name.chars().all(|c| matches!(c.to_ascii_lowercase(), 'r' | 'b' | 'u'))
        {
            self.pos = start;
            return self.parse_strings();
        }

        match name.as_str() {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::None),
            "inf" | "Infinity" => Ok(Value::Float(f64::INFINITY)),
            "nan" | "NaN" => Ok(Value::Float(f64::NAN)),
            _ => Err(ParseError::UnknownName { name, offset: start }),
        }
    }

    /// One or more adjacent string literals, concatenated
    fn parse_strings(&mut self) -> Result<Value, ParseError> {
        let mut out = String::new();
        loop {
            self.parse_one_string(&mut out)?;
            let save = self.pos;
            self.skip_whitespace();
            let next_is_string = match self.peek() {
                Some('\'') | Some('"') => true,
                Some(c) if matches!(c.to_ascii_lowercase(), 'r' | 'b' | 'u') => {
                    matches!(self.peek_at(1), Some('\'') | Some('"'))
                }
                _ => false,
            };
            if !next_is_string {
                self.pos = save;
                return Ok(Value::Str(out));
            }
        }
    }

    fn parse_one_string(&mut self, out: &mut String) -> Result<(), ParseError> {
        let mut raw = false;
        while let Some(c) = self.peek() {
            match c.to_ascii_lowercase() {
                'r' => raw = true,
                'b' | 'u' => {}
                _ => break,
            }
            self.pos += 1;
        }

        let quote = self.expect_any()?;
        if quote != '\'' && quote != '"' {
            return Err(ParseError::UnexpectedChar {
                found: quote,
                offset: self.pos - 1,
            });
        }
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }

        loop {
            let c = self.expect_any()?;
            if c == quote {
                if !triple {
                    return Ok(());
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.pos += 2;
                    return Ok(());
                }
                out.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(ParseError::UnexpectedChar {
                    found: c,
                    offset: self.pos - 1,
                });
            }
            if c != '\\' {
                out.push(c);
                continue;
            }

            let escape_at = self.pos - 1;
            let e = self.expect_any()?;
            if raw {
                out.push('\\');
                out.push(e);
                continue;
            }
            match e {
                '\n' => {}
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'a' => out.push('\u{7}'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'v' => out.push('\u{b}'),
                '0'..='7' => {
                    let mut code = e.to_digit(8).unwrap_or(0);
                    for _ in 0..2 {
                        match self.peek().and_then(|d| d.to_digit(8)) {
                            Some(d) => {
                                code = code * 8 + d;
                                self.pos += 1;
                            }
                            None => break,
                        }
                    }
                    out.push(char::from_u32(code).ok_or(ParseError::InvalidEscape {
                        offset: escape_at,
                    })?);
                }
                'x' => out.push(self.hex_escape(2, escape_at)?),
                'u' => out.push(self.hex_escape(4, escape_at)?),
                'U' => out.push(self.hex_escape(8, escape_at)?),
                other => {
                    // unknown escapes are kept verbatim, as Python does
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn hex_escape(&mut self, len: usize, escape_at: usize) -> Result<char, ParseError> {
        let mut code = 0u32;
        for _ in 0..len {
            let digit = self
                .peek()
                .and_then(|d| d.to_digit(16))
                .ok_or(ParseError::InvalidEscape { offset: escape_at })?;
            code = code * 16 + digit;
            self.pos += 1;
        }
        char::from_u32(code).ok_or(ParseError::InvalidEscape { offset: escape_at })
    }

    fn parse_number(&mut self) -> Result<Value, ParseError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let exponent_sign = matches!(c, '+' | '-')
                && matches!(self.chars.get(self.pos.wrapping_sub(1)), Some('e') | Some('E'))
                && !self.chars[start..self.pos]
                    .iter()
                    .any(|c| matches!(c, 'x' | 'X'));
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        let invalid = || ParseError::InvalidNumber {
            literal: literal.clone(),
            offset: start,
        };
        if literal.starts_with('_') || literal.ends_with('_') || literal.contains("__") {
            return Err(invalid());
        }
        let cleaned: String = literal.chars().filter(|c| *c != '_').collect();
        let lowered = cleaned.to_ascii_lowercase();

        for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
            if let Some(digits) = lowered.strip_prefix(prefix) {
                return i128::from_str_radix(digits, radix)
                    .map(Value::Int)
                    .map_err(|_| invalid());
            }
        }

        if lowered.contains(['.', 'e']) {
            return lowered.parse::<f64>().map(Value::Float).map_err(|_| invalid());
        }
        if !lowered.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        match lowered.parse::<i128>() {
            Ok(i) => Ok(Value::Int(i)),
            // beyond i128: keep the magnitude as a float
            Err(_) => lowered.parse::<f64>().map(Value::Float).map_err(|_| invalid()),
        }
    }
}

fn apply_sign(sign: char, operand: Value, offset: usize) -> Result<Value, ParseError> {
    let negate = sign == '-';
    match operand {
        Value::Int(i) => Ok(Value::Int(if negate { -i } else { i })),
        Value::Float(f) => Ok(Value::Float(if negate { -f } else { f })),
        Value::Bool(b) => {
            let i = b as i128;
            Ok(Value::Int(if negate { -i } else { i }))
        }
        _ => Err(ParseError::UnexpectedChar { found: sign, offset }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::Str(text.to_string())
    }

    #[test]
    fn test_scalars() {
        assert_eq!(parse_literal("42").unwrap(), Value::Int(42));
        assert_eq!(parse_literal("-7").unwrap(), Value::Int(-7));
        assert_eq!(parse_literal("1_000").unwrap(), Value::Int(1000));
        assert_eq!(parse_literal("0x1F").unwrap(), Value::Int(31));
        assert_eq!(parse_literal("2.5e-3").unwrap(), Value::Float(0.0025));
        assert_eq!(parse_literal(".5").unwrap(), Value::Float(0.5));
        assert_eq!(parse_literal("True").unwrap(), Value::Bool(true));
        assert_eq!(parse_literal("null").unwrap(), Value::None);
        assert_eq!(parse_literal("-inf").unwrap(), Value::Float(f64::NEG_INFINITY));
    }

    #[test]
    fn test_strings() {
        assert_eq!(parse_literal(r#"'it\'s'"#).unwrap(), s("it's"));
        assert_eq!(parse_literal(r#""a\nb""#).unwrap(), s("a\nb"));
        assert_eq!(parse_literal(r#"'\x41é'"#).unwrap(), s("Aé"));
        assert_eq!(parse_literal(r#"r'\d+'"#).unwrap(), s("\\d+"));
        assert_eq!(parse_literal("'''a\n'b'\n'''").unwrap(), s("a\n'b'\n"));
        assert_eq!(parse_literal("'ab' 'cd'").unwrap(), s("abcd"));
    }

    #[test]
    fn test_containers() {
        let parsed = parse_literal("[1, (2,), (3, 4), (), {5: 'x'}, {6, 7}, {},]").unwrap();
        assert_eq!(
            parsed,
            Value::List(vec![
                Value::Int(1),
                Value::Tuple(vec![Value::Int(2)]),
                Value::Tuple(vec![Value::Int(3), Value::Int(4)]),
                Value::Tuple(vec![]),
                Value::Dict(vec![(Value::Int(5), s("x"))]),
                Value::Set(vec![Value::Int(6), Value::Int(7)]),
                Value::Dict(vec![]),
            ])
        );
        assert_eq!(parse_literal("(5)").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_taco_style_spec() {
        let text = "{'inputs': ['2 3\\n', '10 -1\\n'], 'outputs': ['5\\n', '9\\n']}";
        let parsed = parse_literal(text).unwrap();
        let Value::Dict(pairs) = parsed else {
            panic!("expected a dict");
        };
        assert_eq!(pairs[0].0, s("inputs"));
        assert_eq!(
            pairs[1].1,
            Value::List(vec![s("5\n"), s("9\n")])
        );
    }

    #[test]
    fn test_json_spellings() {
        let parsed = parse_literal(r#"{"fn_name": null, "flag": true}"#).unwrap();
        assert_eq!(
            parsed,
            Value::Dict(vec![
                (s("fn_name"), Value::None),
                (s("flag"), Value::Bool(true)),
            ])
        );
    }

    #[test]
    fn test_huge_integer_degrades_to_float() {
        let parsed = parse_literal("1000000000000000000000000000000000000000000").unwrap();
        assert!(matches!(parsed, Value::Float(f) if f > 1e41));
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(matches!(parse_literal("[1, 2"), Err(ParseError::UnexpectedEnd)));
        assert!(matches!(parse_literal("{'a': }"), Err(ParseError::UnexpectedChar { .. })));
        assert!(matches!(parse_literal("__import__('os')"), Err(ParseError::UnknownName { .. })));
        assert!(matches!(parse_literal("1 2"), Err(ParseError::TrailingInput { .. })));
        assert!(matches!(parse_literal("'abc"), Err(ParseError::UnexpectedEnd)));
        assert!(matches!(parse_literal("-'x'"), Err(ParseError::UnexpectedChar { .. })));
    }

    #[test]
    fn test_depth_limit() {
        let deep = "[".repeat(MAX_DEPTH + 10) + &"]".repeat(MAX_DEPTH + 10);
        assert_eq!(parse_literal(&deep), Err(ParseError::TooDeep));
    }

    #[test]
    fn test_repr_round_trip_of_driver_output() {
        let value = Value::List(vec![
            Value::Tuple(vec![Value::Int(1), s("a'b")]),
            Value::Float(0.1),
            Value::Dict(vec![(Value::Int(2), Value::None)]),
        ]);
        assert_eq!(parse_literal(&value.to_literal()).unwrap(), value);
    }
}
