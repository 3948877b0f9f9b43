mod common;

use common::{executor_for, result_output, scalar_input};
use optiloop::engine::{Bisection, OptimizationEngine};
use optiloop::executor::FnExecutor;
use optiloop::runner::run_optimization;
use optiloop::{Value, ValueMap};

#[test]
fn test_bisect() {
    let executor = executor_for(common::echo);
    let engine = Bisection::builder(-1.1, 1.0).tol(1e-1).build().unwrap();

    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
    assert!(outcome.input.as_float().unwrap().abs() < 1e-1);
    assert!(outcome.output.as_float().unwrap().abs() < 1e-1);
}

#[test]
fn test_bisect_switch_lower_upper() {
    let executor = executor_for(common::echo);
    let engine = Bisection::builder(1.0, -1.1).tol(1e-1).build().unwrap();

    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
    assert!(outcome.input.as_float().unwrap().abs() < 1e-1);
    assert!(outcome.output.as_float().unwrap().abs() < 1e-1);
}

#[test]
fn test_bisect_negative() {
    let executor = executor_for(common::negative);
    let engine = Bisection::builder(-2.0, 1.0)
        .tol(1e-1)
        .target_value(-0.2)
        .build()
        .unwrap();

    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
    assert!((outcome.input.as_float().unwrap() - 0.2).abs() < 1e-1);
    assert!((outcome.output.as_float().unwrap() - -0.2).abs() < 1e-1);
}

#[test]
fn test_target_value() {
    let executor = executor_for(common::echo);
    let engine = Bisection::builder(-1.1, 1.0)
        .tol(1e-1)
        .target_value(0.5)
        .build()
        .unwrap();

    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
    assert!((outcome.input.as_float().unwrap() - 0.5).abs() < 1e-1);
    assert!((outcome.output.as_float().unwrap() - 0.5).abs() < 1e-1);
}

#[test]
fn test_input_output_key() {
    let executor = FnExecutor::new(|inputs: &ValueMap| {
        let y = scalar_input(inputs, "y")?;
        let mut out = ValueMap::new();
        out.insert("the_result".to_string(), Value::Float(y));
        Ok(out)
    });
    let engine = Bisection::builder(-1.1, 1.0)
        .tol(1e-1)
        .input_key("y")
        .result_key("the_result")
        .build()
        .unwrap();

    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
    assert!(outcome.input.as_float().unwrap().abs() < 1e-1);
    assert!(outcome.output.as_float().unwrap().abs() < 1e-1);
}

/// Input addressed into a dictionary, result read back from a plain key.
#[test]
fn test_nested_input_key() {
    let executor = FnExecutor::new(|inputs: &ValueMap| {
        let c = inputs["a"]
            .as_map()
            .and_then(|a| a["b"].as_map())
            .and_then(|b| b["c"].as_float())
            .ok_or("missing nested input a:b.c")?;
        let mut out = ValueMap::new();
        out.insert("c".to_string(), Value::Float(c));
        Ok(out)
    });
    let engine = Bisection::builder(-1.1, 1.0)
        .tol(1e-1)
        .input_key("a:b.c")
        .result_key("c")
        .build()
        .unwrap();

    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
    assert!(outcome.output.as_float().unwrap().abs() < 1e-1);
}

/// Result buried inside a dictionary output in a namespace.
#[test]
fn test_nested_result_key() {
    let executor = FnExecutor::new(|inputs: &ValueMap| {
        let x = inputs["f"]
            .as_map()
            .and_then(|f| f["g"].as_float())
            .ok_or("missing nested input f.g")?;
        // Shape: d.e is a dictionary holding {f: {g: x}}.
        let mut g = ValueMap::new();
        g.insert("g".to_string(), Value::Float(x));
        let mut f = ValueMap::new();
        f.insert("f".to_string(), Value::Map(g));
        let mut e = ValueMap::new();
        e.insert("e".to_string(), Value::Map(f));
        let mut out = ValueMap::new();
        out.insert("d".to_string(), Value::Map(e));
        Ok(out)
    });
    let engine = Bisection::builder(-1.1, 1.0)
        .tol(1e-1)
        .input_key("f.g")
        .result_key("d.e:f.g")
        .build()
        .unwrap();

    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
    assert!(outcome.output.as_float().unwrap().abs() < 1e-1);
}

/// The exact value is returned even when it is not the last one evaluated.
#[test]
fn test_exact_value() {
    let executor = executor_for(common::echo);
    let engine = Bisection::builder(0.0, 1.0).tol(1e-1).build().unwrap();

    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
    assert_eq!(outcome.input.as_float().unwrap(), 0.0);
    assert_eq!(outcome.output.as_float().unwrap(), 0.0);
    assert_eq!(outcome.index, 0);
}

/// The same bisected value can feed several inputs at once.
#[test]
fn test_multiple_input_keys() {
    let executor = FnExecutor::new(|inputs: &ValueMap| {
        let x = scalar_input(inputs, "x")?;
        let y = scalar_input(inputs, "y")?;
        Ok(result_output(Value::Float((x + y) / 2.0)))
    });
    let engine = Bisection::builder(-1.0, 1.0)
        .tol(1e-1)
        .input_keys(["x", "y"])
        .build()
        .unwrap();

    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
    assert!(outcome.output.as_float().unwrap().abs() < 1e-1);
}
