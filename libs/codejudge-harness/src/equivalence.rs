/// Equivalence Checker
///
/// **Core Responsibility:**
/// Decide whether a candidate's output matches the expected output.
///
/// **Pipeline:**
/// Six stages run in order; the first stage that answers `Ok(true)` wins.
/// A stage that cannot handle the shapes it was given returns a
/// `StageError`, which is logged at `trace` and treated as "does not
/// apply". Only when every stage declines or disagrees is the output wrong.
///
/// 1. `stripped_exact` - trimmed string equality, or structural equality
/// 2. `joined_lines` - a list of lines joined back into text
/// 3. `numeric_tolerance` - floats compared with `isclose`, 3-decimal fallback
/// 4. `sequence_normalized` - tuples as lists, singleton wrapping
/// 5. `token_split` - lines of whitespace tokens, blanks dropped
/// 6. `unordered` - lines as token sets, in order or as a set, rounded numbers
///
/// Every stage is public so callers can probe them one at a time.
use crate::value::{parse_float, Value};
use std::borrow::Cow;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::trace;

/// `numpy.isclose` defaults
const REL_TOLERANCE: f64 = 1e-5;
const ABS_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error("expected textual output, got {0}")]
    NotText(&'static str),
    #[error("expected a list of strings")]
    NotLines,
    #[error("{0:?} is not a number")]
    NotNumeric(String),
}

pub type StageResult = Result<bool, StageError>;

/// A named comparison stage
#[derive(Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    pub check: fn(&Value, &Value) -> StageResult,
}

pub const STAGES: [Stage; 6] = [
    Stage { name: "stripped_exact", check: stripped_exact },
    Stage { name: "joined_lines", check: joined_lines },
    Stage { name: "numeric_tolerance", check: numeric_tolerance },
    Stage { name: "sequence_normalized", check: sequence_normalized },
    Stage { name: "token_split", check: token_split },
    Stage { name: "unordered", check: unordered },
];

/// Run the pipeline; true on the first matching stage
pub fn compare(actual: &Value, expected: &Value) -> bool {
    for stage in STAGES.iter() {
        match (stage.check)(actual, expected) {
            Ok(true) => {
                trace!(stage = stage.name, "outputs match");
                return true;
            }
            Ok(false) => {}
            Err(e) => trace!(stage = stage.name, error = %e, "stage does not apply"),
        }
    }
    false
}

/// Every stage's answer, for diagnostics
pub fn explain(actual: &Value, expected: &Value) -> Vec<(&'static str, StageResult)> {
    STAGES
        .iter()
        .map(|stage| (stage.name, (stage.check)(actual, expected)))
        .collect()
}

/// `|a - b| <= atol + rtol * |b|`; infinities must match exactly, NaN never does
pub fn isclose(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    if !a.is_finite() || !b.is_finite() {
        return false;
    }
    (a - b).abs() <= ABS_TOLERANCE + REL_TOLERANCE * b.abs()
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::None => "None",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::Str(_) => "str",
        Value::List(_) => "list",
        Value::Tuple(_) => "tuple",
        Value::Set(_) => "set",
        Value::Dict(_) => "dict",
    }
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Int(_) | Value::Float(_))
}

/// Text form of an output: a string, or a list of strings joined by newlines
fn text_view(value: &Value) -> Result<Cow<'_, str>, StageError> {
    match value {
        Value::Str(s) => Ok(Cow::Borrowed(s)),
        Value::List(items) | Value::Tuple(items) => {
            let lines = items
                .iter()
                .map(|item| item.as_str().ok_or(StageError::NotText(kind(item))))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Cow::Owned(lines.join("\n")))
        }
        other => Err(StageError::NotText(kind(other))),
    }
}

/// Non-empty lines, each split into whitespace tokens
fn token_grid(text: &str) -> Vec<Vec<&str>> {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .filter(|tokens| !tokens.is_empty())
        .collect()
}

fn parse_token(token: &str) -> Result<f64, StageError> {
    parse_float(token).ok_or_else(|| StageError::NotNumeric(token.to_string()))
}

/// Numbers carried by a value: a scalar, a sequence of scalars, or whitespace tokens
fn numeric_items(value: &Value) -> Result<Vec<f64>, StageError> {
    match value {
        Value::Str(s) => s.split_whitespace().map(parse_token).collect(),
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(|item| match item {
                Value::Str(s) => parse_token(s.trim()),
                other if is_number(other) => other
                    .to_f64()
                    .ok_or_else(|| StageError::NotNumeric(other.to_literal())),
                other => Err(StageError::NotNumeric(other.to_literal())),
            })
            .collect(),
        other if is_number(other) => Ok(other.to_f64().into_iter().collect()),
        other => Err(StageError::NotNumeric(other.to_literal())),
    }
}

/// Stage 1: trimmed equality for strings, structural equality otherwise
pub fn stripped_exact(actual: &Value, expected: &Value) -> StageResult {
    match (actual, expected) {
        (Value::Str(a), Value::Str(b)) => Ok(a.trim() == b.trim()),
        _ => Ok(actual == expected),
    }
}

/// Stage 2: lines joined with `\n`, then again with every line trimmed
pub fn joined_lines(actual: &Value, expected: &Value) -> StageResult {
    let lines = match actual {
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(|item| item.as_str().ok_or(StageError::NotLines))
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(StageError::NotLines),
    };

    if stripped_exact(&Value::Str(lines.join("\n")), expected)? {
        return Ok(true);
    }
    let trimmed: Vec<&str> = lines.iter().map(|line| line.trim()).collect();
    stripped_exact(&Value::Str(trimmed.join("\n")), expected)
}

/// Stage 3: numeric comparison under `isclose`
///
/// Tries the whole value as one number, then row by row (tokens equal or
/// numerically close), then the flattened numeric sequences, then the same
/// sequences rounded to three decimals.
pub fn numeric_tolerance(actual: &Value, expected: &Value) -> StageResult {
    match (actual, expected) {
        (Value::Str(a), Value::Str(b)) => {
            if let (Some(x), Some(y)) = (parse_float(a.trim()), parse_float(b.trim())) {
                return Ok(isclose(x, y));
            }
            if rows_close(a, b) {
                return Ok(true);
            }
        }
        (a, b) if is_number(a) && is_number(b) => {
            return match (a.to_f64(), b.to_f64()) {
                (Some(x), Some(y)) => Ok(isclose(x, y)),
                _ => Ok(false),
            };
        }
        _ => {}
    }

    let actual_numbers = numeric_items(actual)?;
    let expected_numbers = numeric_items(expected)?;
    if actual_numbers.len() != expected_numbers.len() || actual_numbers.is_empty() {
        return Ok(false);
    }

    let pairs = || actual_numbers.iter().zip(&expected_numbers);
    Ok(pairs().all(|(a, b)| isclose(*a, *b)) || pairs().all(|(a, b)| round3(*a) == round3(*b)))
}

fn rows_close(actual: &str, expected: &str) -> bool {
    let actual_rows = token_grid(actual);
    let expected_rows = token_grid(expected);
    if actual_rows.len() != expected_rows.len() || actual_rows.is_empty() {
        return false;
    }

    actual_rows.iter().zip(&expected_rows).all(|(a_row, e_row)| {
        a_row.len() == e_row.len()
            && a_row.iter().zip(e_row).all(|(a, e)| {
                a == e
                    || matches!((parse_float(a), parse_float(e)), (Some(x), Some(y)) if isclose(x, y))
            })
    })
}

/// Stage 4: tuples become lists; singleton wrapping is tried both ways
pub fn sequence_normalized(actual: &Value, expected: &Value) -> StageResult {
    let actual = actual.tuples_to_lists();
    let expected = expected.tuples_to_lists();

    if actual == expected || actual == Value::List(vec![expected.clone()]) {
        return Ok(true);
    }

    if let Value::List(items) = &expected {
        if let [only] = items.as_slice() {
            if actual == *only {
                return Ok(true);
            }
        }
    }

    if let Value::List(items) = &actual {
        if !items.is_empty() && items.iter().all(|item| matches!(item, Value::Str(_))) {
            let trimmed = Value::List(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| Value::Str(s.trim().to_string()))
                    .collect(),
            );
            return Ok(trimmed == expected);
        }
    }

    Ok(false)
}

/// Stage 5: both sides as lines of whitespace tokens
pub fn token_split(actual: &Value, expected: &Value) -> StageResult {
    let actual = text_view(actual)?;
    let expected = text_view(expected)?;
    Ok(token_grid(&actual) == token_grid(&expected))
}

/// Stage 6: order-insensitive views
///
/// Each line becomes the set of its tokens. Matches when those line sets
/// agree in order, when they agree as a set of lines, or when the numeric
/// tokens rounded to three decimals agree as a set of lines.
pub fn unordered(actual: &Value, expected: &Value) -> StageResult {
    let actual = text_view(actual)?;
    let expected = text_view(expected)?;
    let actual_lines = token_grid(&actual);
    let expected_lines = token_grid(&expected);

    let actual_sets = line_token_sets(&actual_lines);
    let expected_sets = line_token_sets(&expected_lines);
    if actual_sets == expected_sets {
        return Ok(true);
    }
    if actual_sets.iter().collect::<BTreeSet<_>>() == expected_sets.iter().collect::<BTreeSet<_>>() {
        return Ok(true);
    }

    Ok(rounded_line_sets(&actual_lines)? == rounded_line_sets(&expected_lines)?)
}

fn line_token_sets<'a>(lines: &[Vec<&'a str>]) -> Vec<BTreeSet<&'a str>> {
    lines.iter().map(|tokens| tokens.iter().copied().collect()).collect()
}

fn rounded_line_sets(lines: &[Vec<&str>]) -> Result<BTreeSet<BTreeSet<i64>>, StageError> {
    lines
        .iter()
        .map(|tokens| {
            tokens
                .iter()
                .map(|token| parse_token(token).map(|x| (x * 1000.0).round() as i64))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::Str(text.to_string())
    }

    fn list(items: Vec<Value>) -> Value {
        Value::List(items)
    }

    #[test]
    fn test_compare_is_reflexive() {
        let samples = vec![
            s(""),
            s("hello world"),
            s("1 2\n3 4"),
            Value::Int(7),
            Value::Float(2.5),
            Value::None,
            list(vec![Value::Int(1), s("x")]),
            Value::Tuple(vec![Value::Bool(true)]),
            Value::Dict(vec![(Value::Int(1), s("a"))]),
        ];
        for value in samples {
            assert!(compare(&value, &value), "{} should equal itself", value.to_literal());
        }
    }

    #[test]
    fn test_empty_outputs_match_at_first_stage() {
        assert_eq!(stripped_exact(&s(""), &s("")), Ok(true));
        assert_eq!(stripped_exact(&s("  \n"), &s("")), Ok(true));
    }

    #[test]
    fn test_numeric_tolerance() {
        assert!(compare(&s("1.0"), &s("1.0000001")));
        assert_eq!(stripped_exact(&s("1.0"), &s("1.0000001")), Ok(false));
        assert_eq!(numeric_tolerance(&s("1.0"), &s("1.0000001")), Ok(true));
        assert_eq!(numeric_tolerance(&s("1.0"), &s("1.1")), Ok(false));
        assert!(!compare(&s("1.0"), &s("1.1")));
    }

    #[test]
    fn test_numeric_rows_allow_text_tokens() {
        assert_eq!(numeric_tolerance(&s("YES 0.3333333\nx 2"), &s("YES 0.33333334\nx 2")), Ok(true));
        assert_eq!(numeric_tolerance(&s("YES 1"), &s("NO 1")).unwrap_or(false), false);
    }

    #[test]
    fn test_numeric_values_from_calls() {
        assert_eq!(numeric_tolerance(&Value::Float(0.1 + 0.2), &Value::Float(0.3)), Ok(true));
        assert_eq!(
            numeric_tolerance(
                &list(vec![Value::Float(0.30000000000000004), Value::Int(1)]),
                &list(vec![Value::Float(0.3), Value::Int(1)])
            ),
            Ok(true)
        );
        assert!(matches!(
            numeric_tolerance(&list(vec![s("a")]), &list(vec![s("b")])),
            Err(StageError::NotNumeric(_))
        ));
    }

    #[test]
    fn test_rounding_fallback() {
        assert_eq!(numeric_tolerance(&s("0.1234 5"), &s("0.1231 5")), Ok(true));
        assert_eq!(numeric_tolerance(&s("0.124 5"), &s("0.123 5")), Ok(false));
    }

    #[test]
    fn test_joined_lines() {
        let lines = list(vec![s("1 2 "), s("3")]);
        assert_eq!(joined_lines(&lines, &s("1 2\n3")), Ok(true));
        assert_eq!(joined_lines(&s("1"), &s("1")), Err(StageError::NotLines));
    }

    #[test]
    fn test_tuples_and_singletons() {
        let tuple = Value::Tuple(vec![Value::Int(1), Value::Int(2)]);
        let expected = list(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(stripped_exact(&tuple, &expected), Ok(false));
        assert_eq!(sequence_normalized(&tuple, &expected), Ok(true));

        let wrapped = list(vec![list(vec![Value::Int(3)])]);
        assert_eq!(sequence_normalized(&list(vec![Value::Int(3)]), &wrapped), Ok(true));
        assert_eq!(sequence_normalized(&list(vec![Value::Int(3)]), &Value::Int(3)), Ok(true));
    }

    #[test]
    fn test_trimmed_string_list() {
        let actual = list(vec![s(" a "), s("b\n")]);
        let expected = list(vec![s("a"), s("b")]);
        assert_eq!(sequence_normalized(&actual, &expected), Ok(true));
    }

    #[test]
    fn test_token_split_ignores_separator_style() {
        assert_eq!(token_split(&s("1  2\n\n3"), &s("1 2\n3\n")), Ok(true));
        assert_eq!(token_split(&s("1 2 3"), &s("1 2\n3")), Ok(false));
        assert_eq!(token_split(&Value::Int(1), &s("1")), Err(StageError::NotText("int")));
    }

    #[test]
    fn test_unordered_tokens() {
        let actual = s("a b");
        let expected = s("b a");
        for stage in &STAGES[..5] {
            assert_ne!((stage.check)(&actual, &expected), Ok(true), "{} matched", stage.name);
        }
        assert_eq!(unordered(&actual, &expected), Ok(true));
        assert!(compare(&actual, &expected));
    }

    #[test]
    fn test_unordered_keeps_tokens_intact() {
        assert_eq!(unordered(&s("ab ba"), &s("ba ab")), Ok(true));
        assert_eq!(unordered(&s("21"), &s("12")), Ok(false));
        assert_eq!(unordered(&s("100"), &s("10")), Ok(false));
        assert!(unordered(&s("SEY"), &s("YES")).is_err());
        assert!(unordered(&s("abc"), &s("abd")).is_err());

        for (actual, expected) in [("21", "12"), ("100", "10"), ("SEY", "YES"), ("1 12", "21 1")] {
            assert!(!compare(&s(actual), &s(expected)), "{} matched {}", actual, expected);
        }
    }

    #[test]
    fn test_unordered_lines() {
        assert_eq!(unordered(&s("1 2\n3 4"), &s("4 3\n2 1")), Ok(true));
        let actual = list(vec![s("x y"), s("z")]);
        let expected = list(vec![s("z"), s("y x")]);
        assert_eq!(unordered(&actual, &expected), Ok(true));
        // tokens never move between lines
        assert!(unordered(&s("a b\nc"), &s("a\nb c")).is_err());
    }

    #[test]
    fn test_unordered_rounded_numbers() {
        assert_eq!(unordered(&s("1.0001 2"), &s("2.0 1.0")), Ok(true));
    }

    #[test]
    fn test_stage_errors_do_not_abort_comparison() {
        // a dict makes every textual stage decline, structural equality still decides
        let dict = Value::Dict(vec![(Value::Int(1), s("a"))]);
        assert!(compare(&list(vec![dict.clone()]), &dict));
        assert!(!compare(&dict, &s("a")));
    }

    #[test]
    fn test_explain_reports_every_stage() {
        let trace = explain(&s("a b"), &s("b a"));
        assert_eq!(trace.len(), STAGES.len());
        assert_eq!(trace[0], ("stripped_exact", Ok(false)));
        assert_eq!(trace[5], ("unordered", Ok(true)));
    }

    #[test]
    fn test_isclose_edges() {
        assert!(isclose(f64::INFINITY, f64::INFINITY));
        assert!(!isclose(f64::NAN, f64::NAN));
        assert!(isclose(0.0, 1e-9));
        assert!(!isclose(0.0, 1e-7));
    }
}
