/// Structured test values
///
/// Mirrors the subset of Python objects that can appear in a test spec or be
/// returned from a candidate: scalars, sequences and mappings. Equality follows
/// Python semantics (`1 == 1.0 == True`, dicts and sets ignore order) except
/// that lists and tuples stay distinct; the equivalence checker normalizes
/// them explicitly.
use std::fmt;

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Set(Vec<Value>),
    Dict(Vec<(Value, Value)>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a list or tuple
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Numeric view used by tolerance comparisons; strings are parsed like `float()`
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => parse_float(s),
            _ => None,
        }
    }

    /// Recursively replace tuples with lists
    pub fn tuples_to_lists(&self) -> Value {
        match self {
            Value::List(items) | Value::Tuple(items) => {
                Value::List(items.iter().map(Value::tuples_to_lists).collect())
            }
            Value::Set(items) => Value::Set(items.iter().map(Value::tuples_to_lists).collect()),
            Value::Dict(pairs) => Value::Dict(
                pairs
                    .iter()
                    .map(|(k, v)| (k.tuples_to_lists(), v.tuples_to_lists()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Python `repr()` rendering; also the literal form sent to the driver
    pub fn to_literal(&self) -> String {
        let mut out = String::new();
        self.write_literal(&mut out);
        out
    }

    /// Python `str()` rendering; strings are emitted without quotes
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_literal(),
        }
    }

    fn write_literal(&self, out: &mut String) {
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => write_quoted(s, out),
            Value::List(items) => write_items(items, "[", "]", out),
            Value::Tuple(items) => {
                if items.len() == 1 {
                    out.push('(');
                    items[0].write_literal(out);
                    out.push_str(",)");
                } else {
                    write_items(items, "(", ")", out);
                }
            }
            Value::Set(items) => {
                if items.is_empty() {
                    out.push_str("set()");
                } else {
                    write_items(items, "{", "}", out);
                }
            }
            Value::Dict(pairs) => {
                out.push('{');
                for (idx, (k, v)) in pairs.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(", ");
                    }
                    k.write_literal(out);
                    out.push_str(": ");
                    v.write_literal(out);
                }
                out.push('}');
            }
        }
    }
}

fn write_items(items: &[Value], open: &str, close: &str, out: &mut String) {
    out.push_str(open);
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        item.write_literal(out);
    }
    out.push_str(close);
}

fn write_quoted(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

/// Float rendering compatible with both Python `repr()` and the driver's decoder
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
        // Debug keeps a trailing `.0` on integral values and uses exponents for extremes
        format!("{:?}", f)
    }
}

/// `float()`-style parsing: surrounding whitespace, `inf`/`nan` spellings, underscores
pub fn parse_float(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    let lowered = t.to_ascii_lowercase();
    let (sign, body) = match lowered.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, lowered.strip_prefix('+').unwrap_or(&lowered)),
    };
    match body {
        "inf" | "infinity" => return Some(sign * f64::INFINITY),
        "nan" => return Some(f64::NAN),
        _ => {}
    }
    if body.starts_with('_') || body.ends_with('_') || body.contains("__") {
        return None;
    }
    let cleaned: String = body.chars().filter(|c| *c != '_').collect();
    if !cleaned
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | '+' | '-'))
    {
        return None;
    }
    cleaned.parse::<f64>().ok().map(|v| sign * v)
}

/// `int()`-style parsing used for re-keying dictionaries
pub fn parse_int(s: &str) -> Option<i128> {
    let t = s.trim();
    let (negative, digits) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
        || !digits.chars().all(|c| c.is_ascii_digit() || c == '_')
    {
        return None;
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let magnitude = cleaned.parse::<i128>().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Exact int/float comparison, as Python does it
fn int_float_eq(i: i128, f: f64) -> bool {
    // i128 covers [-2^127, 2^127)
    const BOUND: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0;
    f.fract() == 0.0 && (-BOUND..BOUND).contains(&f) && f as i128 == i
}

fn write_int_key(i: i128, out: &mut String) {
    out.push('i');
    out.push_str(&i.to_string());
    out.push(';');
}

impl Value {
    /// Order-independent key; values equal under `==` share a key.
    /// `None` when a NaN is involved, since NaN never equals itself.
    fn canonical_key(&self) -> Option<String> {
        let mut out = String::new();
        self.write_key(&mut out)?;
        Some(out)
    }

    fn write_key(&self, out: &mut String) -> Option<()> {
        match self {
            Value::None => out.push('N'),
            Value::Bool(b) => write_int_key(*b as i128, out),
            Value::Int(i) => write_int_key(*i, out),
            Value::Float(f) if f.is_nan() => return None,
            Value::Float(f) if int_float_eq(*f as i128, *f) => write_int_key(*f as i128, out),
            Value::Float(f) => {
                out.push('f');
                out.push_str(&f.to_bits().to_string());
                out.push(';');
            }
            Value::Str(s) => {
                out.push('s');
                out.push_str(&s.len().to_string());
                out.push(':');
                out.push_str(s);
            }
            Value::List(items) | Value::Tuple(items) => {
                out.push(if matches!(self, Value::List(_)) { '[' } else { '(' });
                for item in items {
                    item.write_key(out)?;
                }
                out.push(if matches!(self, Value::List(_)) { ']' } else { ')' });
            }
            Value::Set(items) => {
                out.push('{');
                for key in set_keys(items)? {
                    out.push_str(&key);
                }
                out.push('}');
            }
            Value::Dict(pairs) => {
                out.push('<');
                for key in dict_keys(pairs)? {
                    out.push_str(&key);
                }
                out.push('>');
            }
        }
        Some(())
    }
}

/// Sorted, deduplicated element keys
fn set_keys(items: &[Value]) -> Option<Vec<String>> {
    let mut keys = items.iter().map(Value::canonical_key).collect::<Option<Vec<_>>>()?;
    keys.sort_unstable();
    keys.dedup();
    Some(keys)
}

fn dict_keys(pairs: &[(Value, Value)]) -> Option<Vec<String>> {
    let mut keys = pairs
        .iter()
        .map(|(k, v)| Some(k.canonical_key()? + "=" + &v.canonical_key()?))
        .collect::<Option<Vec<_>>>()?;
    keys.sort_unstable();
    Some(keys)
}

fn set_eq(a: &[Value], b: &[Value]) -> bool {
    match (set_keys(a), set_keys(b)) {
        (Some(a), Some(b)) => a == b,
        // NaN members: only a pairwise search can honour NaN != NaN
        _ => a.iter().all(|x| b.contains(x)) && b.iter().all(|y| a.contains(y)),
    }
}

fn dict_eq(a: &[(Value, Value)], b: &[(Value, Value)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    match (dict_keys(a), dict_keys(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a.iter().all(|pair| b.contains(pair)),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => set_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => dict_eq(a, b),
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Bool(b)) | (Value::Bool(b), Value::Int(a)) => *a == *b as i128,
            (Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => int_float_eq(*i, *f),
            _ => match (numeric(self), numeric(other)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i as i128)
                } else if let Some(u) = n.as_u64() {
                    Value::Int(u as i128)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Dict(
                map.into_iter()
                    .map(|(k, v)| (Value::Str(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}
