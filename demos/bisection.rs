//! Bisect `f(x) = sin(x)` to its zero crossing inside `[-1, 2]`.
//!
//! Run with `cargo run --example bisection`.

use optiloop::prelude::*;

fn main() -> Result<()> {
    let executor = FnExecutor::new(|inputs: &ValueMap| {
        let x = inputs["x"].as_float().ok_or("input 'x' must be numeric")?;
        let mut out = ValueMap::new();
        out.insert("result".to_string(), Value::Float(x.sin()));
        Ok(out)
    });

    let engine = Bisection::builder(-1.0, 2.0).tol(1e-3).build()?;
    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new())?;

    println!("optimal evaluation : #{} ({})", outcome.index, outcome.task);
    println!("optimal input      : {:?}", outcome.input);
    println!("optimal output     : {:?}", outcome.output);
    Ok(())
}
