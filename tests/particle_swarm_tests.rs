mod common;

use common::executor_for;
use optiloop::engine::{EngineSnapshot, OptimizationEngine, ParticleSwarm};
use optiloop::runner::{ControlLoop, run_optimization};
use optiloop::ValueMap;

fn swarm() -> Vec<Vec<f64>> {
    vec![
        vec![1.2, 0.9],
        vec![1.0, 2.0],
        vec![2.0, 1.0],
        vec![-0.5, 1.5],
        vec![0.0, -1.0],
    ]
}

#[test]
fn test_swarm_improves_rosenbrock() {
    let executor = executor_for(common::rosenbrock);
    let engine = ParticleSwarm::builder(swarm())
        .max_iter(25)
        .seed(42)
        .build()
        .unwrap();

    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
    let initial_best = swarm()
        .iter()
        .map(|x| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2))
        .fold(f64::INFINITY, f64::min);
    assert!(outcome.output.as_float().unwrap() < initial_best);
}

#[test]
fn test_budget_exhaustion_is_a_normal_finish() {
    let executor = executor_for(common::norm);
    let engine = ParticleSwarm::builder(swarm())
        .max_iter(3)
        .seed(1)
        .build()
        .unwrap();

    // Unlike the simplex engine, running out of iterations is success here.
    let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
    assert!(outcome.output.as_float().unwrap().is_finite());
    let particles = outcome.engine_outputs["last_particles"].as_list().unwrap();
    assert_eq!(particles.len(), 5);
}

#[test]
fn test_seeded_runs_are_identical() {
    let run = || {
        let executor = executor_for(common::norm);
        let engine = ParticleSwarm::builder(swarm())
            .max_iter(10)
            .seed(7)
            .build()
            .unwrap();
        run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap()
    };
    assert_eq!(run(), run());
}

/// Suspending after every protocol call reproduces the uninterrupted
/// trajectory bit for bit: the generator state rides along in the
/// serialized snapshot.
#[test]
fn test_resume_reproduces_random_trajectories() {
    let build = || {
        ParticleSwarm::builder(swarm())
            .max_iter(6)
            .seed(99)
            .build()
            .unwrap()
    };

    let executor = executor_for(common::rosenbrock);
    let straight =
        run_optimization(&executor, build().snapshot(), ValueMap::new()).unwrap();

    let executor = executor_for(common::rosenbrock);
    let mut control = ControlLoop::new(&executor, build().snapshot());
    while !control.is_finished() {
        // Round-trip the full continuation through JSON each iteration.
        let json = serde_json::to_string(&control.state()).unwrap();
        control = ControlLoop::resume(&executor, serde_json::from_str(&json).unwrap());
        control.launch_evaluations().unwrap();
        control.collect_results().unwrap();
    }
    let resumed = control.finalize().unwrap();

    assert_eq!(straight.index, resumed.index);
    assert_eq!(straight.input, resumed.input);
    assert_eq!(straight.output, resumed.output);
    assert_eq!(straight.engine_outputs, resumed.engine_outputs);
}

#[test]
fn test_snapshot_tag_names_the_engine() {
    let engine = ParticleSwarm::builder(swarm()).seed(3).build().unwrap();
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.name(), "particle_swarm");
    let json = serde_json::to_string(&snapshot).unwrap();
    let restored: EngineSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, snapshot);
}
