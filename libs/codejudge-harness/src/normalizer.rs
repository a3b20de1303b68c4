/// Test-Spec Normalizer
///
/// Turns a raw test spec (serialized literal or structured JSON) into typed
/// test cases and selects the execution mode. Pure transform, no side effects.
use crate::literal::{parse_literal, ParseError};
use crate::value::{parse_int, Value};
use codejudge_common::types::RawTestSpec;

/// How the candidate is invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// The candidate exposes `fn_name`, invoked with structured arguments
    CallBased { fn_name: String },
    /// The candidate is a full program speaking over stdin/stdout
    StandardInput,
}

impl ExecutionMode {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionMode::CallBased { .. } => "call_based",
            ExecutionMode::StandardInput => "standard_input",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub input: Value,
    pub expected: Value,
}

/// Normalized, immutable test spec
#[derive(Debug, Clone, PartialEq)]
pub struct TestSpec {
    pub mode: ExecutionMode,
    pub cases: Vec<TestCase>,
}

impl TestSpec {
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// Parse and normalize a raw spec
pub fn normalize(raw: &RawTestSpec) -> Result<TestSpec, ParseError> {
    let value = match raw {
        RawTestSpec::Serialized(text) => parse_literal(text)?,
        RawTestSpec::Structured(json) => Value::from(json.clone()),
    };
    from_value(value)
}

fn type_name(value: &Value) -> &'static str {
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

fn from_value(value: Value) -> Result<TestSpec, ParseError> {
    let pairs = match value {
        Value::Dict(pairs) => pairs,
        other => {
            return Err(ParseError::NotAMapping {
                found: type_name(&other),
            })
        }
    };

    let mut inputs = None;
    let mut outputs = None;
    let mut fn_name = None;
    for (key, value) in pairs {
        match key.as_str() {
            Some("inputs") => inputs = Some(value),
            Some("outputs") => outputs = Some(value),
            Some("fn_name") => fn_name = Some(value),
            _ => {}
        }
    }

    let inputs = into_sequence(inputs.ok_or(ParseError::MissingKey("inputs"))?, "inputs")?;
    let outputs = into_sequence(outputs.ok_or(ParseError::MissingKey("outputs"))?, "outputs")?;
    if inputs.len() != outputs.len() {
        return Err(ParseError::LengthMismatch {
            inputs: inputs.len(),
            outputs: outputs.len(),
        });
    }

    let mode = match fn_name {
        None | Some(Value::None) => ExecutionMode::StandardInput,
        Some(Value::Str(name)) => ExecutionMode::CallBased { fn_name: name },
        Some(_) => {
            return Err(ParseError::WrongType {
                key: "fn_name",
                expected: "string",
            })
        }
    };

    let cases = inputs
        .into_iter()
        .zip(outputs)
        .map(|(input, output)| TestCase {
            input: rehydrate_input(input),
            expected: rehydrate_output(output),
        })
        .collect();

    Ok(TestSpec { mode, cases })
}

fn into_sequence(value: Value, key: &'static str) -> Result<Vec<Value>, ParseError> {
    match value {
        Value::List(items) | Value::Tuple(items) => Ok(items),
        _ => Err(ParseError::WrongType {
            key,
            expected: "sequence",
        }),
    }
}

/// Re-key a dict whose keys were flattened to strings; `None` if any key is not an integer
fn integer_keyed(pairs: &[(Value, Value)]) -> Option<Value> {
    let mut rekeyed = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        let int_key = match key {
            Value::Int(i) => *i,
            Value::Str(s) => parse_int(s)?,
            Value::Bool(b) => *b as i128,
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => *f as i128,
            _ => return None,
        };
        rekeyed.push((Value::Int(int_key), value.clone()));
    }
    Some(Value::Dict(rekeyed))
}

/// Input shaped `[{"1": ...}]` becomes `[{1: ...}]`
fn rehydrate_input(input: Value) -> Value {
    if let Value::List(items) = &input {
        if let [Value::Dict(pairs)] = items.as_slice() {
            if let Some(dict) = integer_keyed(pairs) {
                return Value::List(vec![dict]);
            }
        }
    }
    input
}

/// Output shaped `{"1": ...}` or `[{"1": ...}]` becomes `[{1: ...}]`
fn rehydrate_output(output: Value) -> Value {
    match &output {
        Value::Dict(pairs) => {
            if let Some(dict) = integer_keyed(pairs) {
                return Value::List(vec![dict]);
            }
        }
        Value::List(items) => {
            if let [Value::Dict(pairs)] = items.as_slice() {
                if let Some(dict) = integer_keyed(pairs) {
                    return Value::List(vec![dict]);
                }
            }
        }
        _ => {}
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn serialized(text: &str) -> RawTestSpec {
        RawTestSpec::Serialized(text.to_string())
    }

    #[test]
    fn test_call_based_mode_from_fn_name() {
        let spec = normalize(&serialized(
            "{'inputs': [[2, 3]], 'outputs': [5], 'fn_name': 'add'}",
        ))
        .unwrap();
        assert_eq!(
            spec.mode,
            ExecutionMode::CallBased {
                fn_name: "add".into()
            }
        );
        assert_eq!(spec.cases[0].input, Value::List(vec![Value::Int(2), Value::Int(3)]));
        assert_eq!(spec.cases[0].expected, Value::Int(5));
    }

    #[test]
    fn test_standard_input_when_fn_name_absent_or_null() {
        let spec = normalize(&serialized("{'inputs': ['2 3'], 'outputs': ['5']}")).unwrap();
        assert_eq!(spec.mode, ExecutionMode::StandardInput);

        let spec = normalize(&RawTestSpec::Structured(
            json!({"inputs": ["1"], "outputs": ["1"], "fn_name": null}),
        ))
        .unwrap();
        assert_eq!(spec.mode, ExecutionMode::StandardInput);
    }

    #[test]
    fn test_malformed_spec_is_a_parse_error() {
        assert!(normalize(&serialized("{'inputs': [")).is_err());
        assert_eq!(
            normalize(&serialized("[1, 2]")),
            Err(ParseError::NotAMapping { found: "list" })
        );
        assert_eq!(
            normalize(&serialized("{'inputs': []}")),
            Err(ParseError::MissingKey("outputs"))
        );
        assert_eq!(
            normalize(&serialized("{'inputs': [1], 'outputs': []}")),
            Err(ParseError::LengthMismatch {
                inputs: 1,
                outputs: 0
            })
        );
    }

    #[test]
    fn test_string_keys_are_rehydrated_to_integers() {
        let spec = normalize(&RawTestSpec::Structured(json!({
            "inputs": [[{"1": "a", "2": "b"}]],
            "outputs": [{"3": true}],
            "fn_name": "f"
        })))
        .unwrap();

        assert_eq!(
            spec.cases[0].input,
            Value::List(vec![Value::Dict(vec![
                (Value::Int(1), Value::Str("a".into())),
                (Value::Int(2), Value::Str("b".into())),
            ])])
        );
        assert_eq!(
            spec.cases[0].expected,
            Value::List(vec![Value::Dict(vec![(Value::Int(3), Value::Bool(true))])])
        );
    }

    #[test]
    fn test_non_integer_keys_are_left_alone() {
        let spec = normalize(&RawTestSpec::Structured(json!({
            "inputs": [[{"a": 1}]],
            "outputs": [[{"b": 2}]],
            "fn_name": "f"
        })))
        .unwrap();
        assert_eq!(
            spec.cases[0].expected,
            Value::List(vec![Value::Dict(vec![(Value::Str("b".into()), Value::Int(2))])])
        );
    }

    #[test]
    fn test_multi_element_inputs_keep_their_shape() {
        let spec = normalize(&RawTestSpec::Structured(json!({
            "inputs": [[{"1": 1}, 5]],
            "outputs": [0],
            "fn_name": "f"
        })))
        .unwrap();
        let items = spec.cases[0].input.as_sequence().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Value::Dict(vec![(Value::Str("1".into()), Value::Int(1))]));
    }
}
