#![cfg(feature = "checkpoint")]

mod common;

use common::executor_for;
use optiloop::checkpoint::CheckpointFile;
use optiloop::engine::{Convergence, OptimizationEngine};
use optiloop::executor::FnExecutor;
use optiloop::runner::ControlLoop;

/// Full dress rehearsal of a process restart: run half the sweep, save a
/// checkpoint, drop everything, and finish from the file.
#[test]
fn test_run_resumes_from_checkpoint_file() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = CheckpointFile::new(dir.path().join("run.json"));

    let candidates = vec![0.0, 1.0, 2.0, 3.0, 4.001, 4.002, 5.0, 4.003, 4.004, 4.005];
    let engine = Convergence::builder(candidates, 1e-1)
        .convergence_window(3)
        .build()
        .unwrap();

    {
        let executor = executor_for(common::echo);
        let mut control = ControlLoop::new(&executor, engine.snapshot());
        control.launch_evaluations().unwrap();
        control.collect_results().unwrap();
        checkpoint.save(&control.state()).unwrap();
        // First "process" ends here.
    }

    let executor = executor_for(common::echo);
    let state = checkpoint.load().unwrap();
    let mut control = ControlLoop::resume(&executor, state);
    let outcome = control.run().unwrap();
    assert_eq!(outcome.input.as_float().unwrap(), 4.003);
}

/// Checkpoints taken with tasks in flight resume cleanly once the
/// executor has caught up.
#[test]
fn test_checkpoint_with_pending_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = CheckpointFile::new(dir.path().join("pending.json"));

    let executor = FnExecutor::deferred(common::echo);
    let engine = optiloop::engine::Bisection::builder(-1.1, 1.0)
        .tol(0.1)
        .build()
        .unwrap();

    let mut control = ControlLoop::new(&executor, engine.snapshot());
    control.launch_evaluations().unwrap();
    checkpoint.save(&control.state()).unwrap();
    drop(control);

    executor.run_pending();

    let mut control = ControlLoop::resume(&executor, checkpoint.load().unwrap());
    control.collect_results().unwrap();
    while !control.is_finished() {
        control.launch_evaluations().unwrap();
        executor.run_pending();
        control.collect_results().unwrap();
    }
    let outcome = control.finalize().unwrap();
    assert!(outcome.output.as_float().unwrap().abs() < 0.1);
}
