//! Shared evaluation functions for the integration suites.
//!
//! Each function plays the role of an external evaluation process: it
//! receives a named-input map and returns a named-output map.
#![allow(dead_code)]

use optiloop::executor::{EvalOutcome, FnExecutor};
use optiloop::{Value, ValueMap};

/// Builds a single-entry output map under `"result"`.
pub fn result_output(value: Value) -> ValueMap {
    let mut out = ValueMap::new();
    out.insert("result".to_string(), value);
    out
}

/// Reads the scalar input under `key`.
pub fn scalar_input(inputs: &ValueMap, key: &str) -> Result<f64, String> {
    inputs
        .get(key)
        .and_then(Value::as_float)
        .ok_or_else(|| format!("missing numeric input '{key}'"))
}

/// Reads the vector input under `key`.
pub fn point_input(inputs: &ValueMap, key: &str) -> Result<Vec<f64>, String> {
    inputs
        .get(key)
        .and_then(Value::as_point)
        .ok_or_else(|| format!("missing list input '{key}'"))
}

/// `f(x) = x` on the scalar input `x`.
pub fn echo(inputs: &ValueMap) -> EvalOutcome {
    Ok(result_output(Value::Float(scalar_input(inputs, "x")?)))
}

/// `f(x) = -x` on the scalar input `x`.
pub fn negative(inputs: &ValueMap) -> EvalOutcome {
    Ok(result_output(Value::Float(-scalar_input(inputs, "x")?)))
}

/// Euclidean norm of the list input `x`.
pub fn norm(inputs: &ValueMap) -> EvalOutcome {
    let x = point_input(inputs, "x")?;
    let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
    Ok(result_output(Value::Float(norm)))
}

/// `sin(x[0])` of the list input `x`.
pub fn sin_list(inputs: &ValueMap) -> EvalOutcome {
    let x = point_input(inputs, "x")?;
    Ok(result_output(Value::Float(x[0].sin())))
}

/// The Rosenbrock function of the 2-D list input `x`.
pub fn rosenbrock(inputs: &ValueMap) -> EvalOutcome {
    let x = point_input(inputs, "x")?;
    if x.len() != 2 {
        return Err(format!("expected a 2-dimensional input, got {}", x.len()));
    }
    let value = (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
    Ok(result_output(Value::Float(value)))
}

/// An immediate in-process executor around one of the functions above.
pub fn executor_for(
    function: fn(&ValueMap) -> EvalOutcome,
) -> FnExecutor<fn(&ValueMap) -> EvalOutcome> {
    FnExecutor::new(function)
}
