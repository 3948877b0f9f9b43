//! Particle-swarm stochastic search.
//!
//! A fixed-size swarm of particles moves through the search space; each
//! particle is pulled toward its own best-seen position and the swarm's
//! global best, with randomized pull strengths. The whole swarm is
//! evaluated as one batch per iteration, and the only stopping criterion
//! is the iteration budget.
//!
//! The velocity randomness comes from an explicit generator state that is
//! part of the persisted engine state: restoring a snapshot restores the
//! generator mid-stream, so a suspended run produces bit-identical
//! particle trajectories to an uninterrupted one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EngineSnapshot, OptimalResult, OptimizationEngine, min_scored_output};
use crate::error::{Error, Result};
use crate::key::NestedKey;
use crate::ledger::EvaluationLedger;
use crate::rng_util;
use crate::value::{Value, ValueMap};

// Coefficients from Clerc's constriction analysis (IEEE CEC 2003).
const C1: f64 = 1.49445;
const C2: f64 = 1.49445;
const OMEGA: f64 = 0.5;

/// Which submit half runs on the next `create_inputs` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SubmitStep {
    Initialize,
    NewIter,
}

/// Which update half runs on the next `update` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum UpdateStep {
    General,
    Finalize,
}

/// Particle-swarm optimization engine.
///
/// Minimizes the result value starting from an explicit initial set of
/// particle positions (M points of dimension N; M is free).
///
/// # Examples
///
/// ```
/// use optiloop::engine::{OptimizationEngine, ParticleSwarm};
///
/// let particles = vec![vec![1.0, 2.0], vec![-1.5, 0.5], vec![2.0, -1.0]];
/// let mut engine = ParticleSwarm::builder(particles)
///     .max_iter(5)
///     .seed(42)
///     .build()
///     .unwrap();
///
/// // The whole swarm is evaluated per batch.
/// let batch = engine.create_inputs().unwrap();
/// assert_eq!(batch.len(), 3);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleSwarm {
    particles: Vec<Vec<f64>>,
    /// Per-particle velocities; `None` until the bootstrap draws them.
    velocities: Option<Vec<Vec<f64>>>,
    /// Per-particle best positions; empty until the bootstrap.
    local_best: Vec<Vec<f64>>,
    /// Per-particle best values; `None` entries have not been evaluated.
    fun_local_best: Vec<Option<f64>>,
    global_best: Option<Vec<f64>>,
    fun_global_best: Option<f64>,
    max_iter: u32,
    num_iter: u32,
    input_key: String,
    result_key: NestedKey,
    next_submit: Option<SubmitStep>,
    next_update: Option<UpdateStep>,
    finished: bool,
    exceeded_max_iters: bool,
    /// Persisted pseudo-random generator state, threaded seed-in/seed-out
    /// around every draw so trajectories replay exactly after a resume.
    rng_state: u64,
    ledger: EvaluationLedger,
}

impl ParticleSwarm {
    /// Creates a builder from the initial particle positions.
    ///
    /// Defaults: `max_iter = 20`, `input_key = "x"`,
    /// `result_key = "result"`, entropy-seeded generator.
    #[must_use]
    pub fn builder(particles: Vec<Vec<f64>>) -> ParticleSwarmBuilder {
        ParticleSwarmBuilder {
            particles,
            max_iter: 20,
            input_key: "x".to_string(),
            result_key: "result".to_string(),
            seed: None,
        }
    }

    fn point_input(&self, x: &[f64]) -> ValueMap {
        let mut map = ValueMap::new();
        map.insert(self.input_key.clone(), Value::point(x));
        map
    }

    fn with_rng<T>(&mut self, draw: impl FnOnce(&mut fastrand::Rng) -> T) -> T {
        let mut rng = fastrand::Rng::with_seed(self.rng_state);
        let result = draw(&mut rng);
        self.rng_state = rng.get_seed();
        result
    }

    fn submit_initialize(&mut self) -> Vec<ValueMap> {
        trace_info!("submitting first step");
        let n_parts = self.particles.len();
        let n_vars = self.particles[0].len();
        self.local_best = self.particles.clone();
        self.fun_local_best = vec![None; n_parts];
        self.velocities = Some(self.with_rng(|rng| {
            (0..n_parts)
                .map(|_| {
                    (0..n_vars)
                        .map(|_| rng_util::f64_range(rng, -1.0, 1.0))
                        .collect()
                })
                .collect()
        }));
        self.next_update = Some(UpdateStep::General);
        self.particles.iter().map(|x| self.point_input(x)).collect()
    }

    fn new_iter(&mut self) -> Result<Vec<ValueMap>> {
        self.check_finished();
        if self.finished {
            self.next_update = Some(UpdateStep::Finalize);
            return Ok(vec![]);
        }
        self.num_iter += 1;
        trace_info!(num_iter = self.num_iter, max_iter = self.max_iter, "starting iteration");
        let (particles, velocities) = self.advance_swarm()?;
        self.particles = particles;
        self.velocities = Some(velocities);
        self.next_update = Some(UpdateStep::General);
        Ok(self.particles.iter().map(|x| self.point_input(x)).collect())
    }

    /// Draws new velocities and positions for every particle.
    ///
    /// Two `U(0,1)` draws per dimension per particle, cognitive term
    /// first; the draw order is fixed so that resumed runs replay the
    /// same stream.
    fn advance_swarm(&mut self) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>)> {
        let velocities = self
            .velocities
            .clone()
            .ok_or(Error::Internal("swarm not yet initialized"))?;
        let global_best = self
            .global_best
            .clone()
            .ok_or(Error::Internal("no global best recorded"))?;
        let particles = self.particles.clone();
        let local_best = self.local_best.clone();

        let new_velocities: Vec<Vec<f64>> = self.with_rng(|rng| {
            particles
                .iter()
                .zip(&velocities)
                .zip(&local_best)
                .map(|((x, v), best)| {
                    (0..x.len())
                        .map(|i| {
                            OMEGA * v[i]
                                + C1 * rng_util::f64_range(rng, 0.0, 1.0) * (best[i] - x[i])
                                + C2 * rng_util::f64_range(rng, 0.0, 1.0) * (global_best[i] - x[i])
                        })
                        .collect()
                })
                .collect()
        });

        let new_particles = particles
            .iter()
            .zip(&new_velocities)
            .map(|(x, v)| x.iter().zip(v).map(|(xi, vi)| xi + vi).collect())
            .collect();
        Ok((new_particles, new_velocities))
    }

    fn update_general(&mut self, outputs: &BTreeMap<u64, ValueMap>) -> Result<()> {
        if outputs.len() != self.particles.len() {
            return Err(Error::BatchSizeMismatch {
                expected: self.particles.len(),
                got: outputs.len(),
            });
        }
        let fun_particles = super::sorted_result_values(outputs, &self.result_key)?;

        for (index, &value) in fun_particles.iter().enumerate() {
            if self.fun_local_best[index].is_none_or(|best| value < best) {
                self.fun_local_best[index] = Some(value);
                self.local_best[index] = self.particles[index].clone();
            }
        }
        for (index, best) in self.fun_local_best.iter().enumerate() {
            if let Some(value) = *best {
                if self.fun_global_best.is_none_or(|global| value < global) {
                    self.fun_global_best = Some(value);
                    self.global_best = Some(self.local_best[index].clone());
                }
            }
        }
        self.next_submit = Some(SubmitStep::NewIter);
        Ok(())
    }

    fn check_finished(&mut self) {
        trace_debug!(fun_global_best = ?self.fun_global_best, "end of iteration");
        if !self.finished && self.num_iter >= self.max_iter {
            trace_info!(num_iter = self.num_iter, "iteration budget exhausted, stopping");
            self.exceeded_max_iters = true;
            self.finished = true;
        }
    }
}

impl OptimizationEngine for ParticleSwarm {
    fn is_finished(&self) -> bool {
        self.finished
    }

    // Running out of iterations is the regular way for a swarm to stop,
    // so the budget flag does not mark the run as failed.

    fn create_inputs(&mut self) -> Result<BTreeMap<u64, ValueMap>> {
        if self.finished {
            return Err(Error::AlreadyFinished);
        }
        let step = self
            .next_submit
            .take()
            .ok_or(Error::Internal("no submit step pending"))?;
        let batch = match step {
            SubmitStep::Initialize => self.submit_initialize(),
            SubmitStep::NewIter => self.new_iter()?,
        };
        Ok(self.ledger.add_inputs(batch))
    }

    fn update(&mut self, outputs: BTreeMap<u64, ValueMap>) -> Result<()> {
        self.ledger.add_outputs(&outputs)?;
        let step = self
            .next_update
            .take()
            .ok_or(Error::Internal("no update step pending"))?;
        match step {
            UpdateStep::General => self.update_general(&outputs),
            UpdateStep::Finalize => Ok(()),
        }
    }

    fn optimal_result(&self) -> Result<OptimalResult> {
        let (index, value) = min_scored_output(&self.ledger, &self.result_key, |v| v)?;
        let input = self
            .ledger
            .get(index)
            .and_then(|eval| eval.input().get(&self.input_key))
            .cloned()
            .ok_or(Error::Internal("optimal evaluation lost its input"))?;
        Ok(OptimalResult {
            index,
            input,
            output: Value::Float(value),
        })
    }

    fn engine_outputs(&self) -> ValueMap {
        let mut outputs = ValueMap::new();
        outputs.insert(
            "last_particles".to_string(),
            Value::List(self.local_best.iter().map(|x| Value::point(x)).collect()),
        );
        outputs
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::ParticleSwarm(self.clone())
    }
}

/// Builder for a [`ParticleSwarm`] engine.
#[derive(Clone, Debug)]
pub struct ParticleSwarmBuilder {
    particles: Vec<Vec<f64>>,
    max_iter: u32,
    input_key: String,
    result_key: String,
    seed: Option<u64>,
}

impl ParticleSwarmBuilder {
    /// Sets the number of swarm iterations. Default: 20.
    #[must_use]
    pub fn max_iter(mut self, max_iter: u32) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the name of the input argument. Default: `"x"`.
    #[must_use]
    pub fn input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = key.into();
        self
    }

    /// Sets the name of the output argument. Default: `"result"`.
    #[must_use]
    pub fn result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = key.into();
        self
    }

    /// Sets the random seed for reproducible trajectories.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the configured [`ParticleSwarm`] engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSwarm`] if the particle set is empty, has
    /// zero-dimensional points, or mixes dimensions, and
    /// [`Error::InvalidKey`] for malformed keys.
    pub fn build(self) -> Result<ParticleSwarm> {
        let n_vars = self.particles.first().map_or(0, Vec::len);
        if self.particles.is_empty() {
            return Err(Error::InvalidSwarm("at least one particle is required"));
        }
        if n_vars == 0 {
            return Err(Error::InvalidSwarm("particles must have at least one dimension"));
        }
        if self.particles.iter().any(|p| p.len() != n_vars) {
            return Err(Error::InvalidSwarm("all particles must have the same dimension"));
        }
        NestedKey::parse(&self.input_key)?;
        Ok(ParticleSwarm {
            particles: self.particles,
            velocities: None,
            local_best: Vec::new(),
            fun_local_best: Vec::new(),
            global_best: None,
            fun_global_best: None,
            max_iter: self.max_iter,
            num_iter: 0,
            input_key: self.input_key,
            result_key: NestedKey::parse(&self.result_key)?,
            next_submit: Some(SubmitStep::Initialize),
            next_update: None,
            finished: false,
            exceeded_max_iters: false,
            rng_state: self.seed.unwrap_or_else(|| fastrand::Rng::new().get_seed()),
            ledger: EvaluationLedger::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate_batch(
        batch: &BTreeMap<u64, ValueMap>,
        f: impl Fn(&[f64]) -> f64,
    ) -> BTreeMap<u64, ValueMap> {
        batch
            .iter()
            .map(|(&idx, input)| {
                let x = input["x"].as_point().unwrap();
                let mut out = ValueMap::new();
                out.insert("result".to_string(), Value::Float(f(&x)));
                (idx, out)
            })
            .collect()
    }

    fn drive(engine: &mut ParticleSwarm, f: impl Fn(&[f64]) -> f64) {
        while !engine.is_finished() {
            let batch = engine.create_inputs().unwrap();
            let outputs = evaluate_batch(&batch, &f);
            engine.update(outputs).unwrap();
        }
    }

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|v| v * v).sum()
    }

    fn swarm() -> Vec<Vec<f64>> {
        vec![vec![1.0, 2.0], vec![-1.5, 0.5], vec![2.0, -1.0], vec![0.5, 1.5]]
    }

    #[test]
    fn test_swarm_improves_on_sphere() {
        let mut engine = ParticleSwarm::builder(swarm())
            .max_iter(15)
            .seed(42)
            .build()
            .unwrap();
        drive(&mut engine, sphere);

        let initial_best = swarm().iter().map(|x| sphere(x)).fold(f64::INFINITY, f64::min);
        let optimal = engine.optimal_result().unwrap();
        assert!(optimal.output.as_float().unwrap() <= initial_best);
        // Budget exhaustion is the normal way to stop.
        assert!(engine.is_finished_ok());
    }

    #[test]
    fn test_same_seed_reproduces_run() {
        let run = || {
            let mut engine = ParticleSwarm::builder(swarm())
                .max_iter(8)
                .seed(7)
                .build()
                .unwrap();
            drive(&mut engine, sphere);
            engine
        };
        let a = run();
        let b = run();
        assert_eq!(a, b);
    }

    #[test]
    fn test_restart_every_step_is_bit_identical() {
        let build = || {
            ParticleSwarm::builder(swarm())
                .max_iter(8)
                .seed(123)
                .build()
                .unwrap()
        };
        let mut straight = build();
        drive(&mut straight, sphere);

        let mut engine = build();
        while !engine.is_finished() {
            let json = serde_json::to_string(&engine.snapshot()).unwrap();
            engine = match serde_json::from_str(&json).unwrap() {
                EngineSnapshot::ParticleSwarm(restored) => restored,
                _ => unreachable!(),
            };
            let batch = engine.create_inputs().unwrap();
            let outputs = evaluate_batch(&batch, sphere);
            engine.update(outputs).unwrap();
        }

        assert_eq!(engine, straight);
    }

    #[test]
    fn test_batch_size_mismatch_rejected() {
        let mut engine = ParticleSwarm::builder(swarm())
            .max_iter(5)
            .seed(1)
            .build()
            .unwrap();
        let batch = engine.create_inputs().unwrap();
        let mut outputs = evaluate_batch(&batch, sphere);
        let (&last, _) = outputs.iter().next_back().unwrap();
        outputs.remove(&last);
        assert!(matches!(
            engine.update(outputs),
            Err(Error::BatchSizeMismatch { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn test_engine_outputs_contain_last_particles() {
        let mut engine = ParticleSwarm::builder(swarm())
            .max_iter(3)
            .seed(9)
            .build()
            .unwrap();
        drive(&mut engine, sphere);

        let outputs = engine.engine_outputs();
        let particles = outputs["last_particles"].as_list().unwrap();
        assert_eq!(particles.len(), 4);
    }

    #[test]
    fn test_invalid_swarms_rejected() {
        for particles in [vec![], vec![vec![]], vec![vec![1.0], vec![1.0, 2.0]]] {
            assert!(matches!(
                ParticleSwarm::builder(particles).build(),
                Err(Error::InvalidSwarm(_))
            ));
        }
    }
}
