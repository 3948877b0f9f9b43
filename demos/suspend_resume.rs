//! Suspend an optimization to a checkpoint file and finish it from disk.
//!
//! Run with `cargo run --example suspend_resume --features checkpoint`.

use optiloop::prelude::*;

fn executor() -> FnExecutor<fn(&ValueMap) -> core::result::Result<ValueMap, String>> {
    FnExecutor::new(|inputs: &ValueMap| {
        let x = inputs["x"]
            .as_point()
            .ok_or("input 'x' must be a list of numbers")?;
        let value = (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let mut out = ValueMap::new();
        out.insert("result".to_string(), Value::Float(value));
        Ok(out)
    })
}

fn main() -> Result<()> {
    let dir = std::env::temp_dir();
    let checkpoint = CheckpointFile::new(dir.join("optiloop-demo.json"));

    // Phase one: run a few iterations, then stop and persist.
    {
        let executor = executor();
        let engine = NelderMead::builder(vec![vec![1.2, 0.9], vec![1.0, 2.0], vec![2.0, 1.0]])
            .xtol(1e-3)
            .ftol(1e-3)
            .build()?;
        let mut control = ControlLoop::new(&executor, engine.snapshot());
        for _ in 0..5 {
            if control.is_finished() {
                break;
            }
            control.launch_evaluations()?;
            control.collect_results()?;
        }
        checkpoint.save(&control.state())?;
        println!("suspended after 5 iterations -> {}", checkpoint.path().display());
    }

    // Phase two: a "new process" picks the run back up from the file.
    let executor = executor();
    let mut control = ControlLoop::resume(&executor, checkpoint.load()?);
    let outcome = control.run()?;
    println!("resumed and finished: input {:?}, output {:?}", outcome.input, outcome.output);
    Ok(())
}
