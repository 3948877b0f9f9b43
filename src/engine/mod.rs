//! Optimization engines and their shared contract.
//!
//! An engine owns an [`EvaluationLedger`](crate::ledger::EvaluationLedger)
//! and its algorithm-specific search state, and advances through the same
//! protocol regardless of algorithm: while not finished, it creates a
//! batch of indexed inputs, suspends while an external executor evaluates
//! them, and folds the indexed outputs back in. Every engine is fully
//! serializable, so the protocol can stop between any two calls — across
//! process restarts — and resume without losing a step.
//!
//! # Available engines
//!
//! | Engine | Algorithm | Batch shape |
//! |--------|-----------|-------------|
//! | [`Bisection`] | 1-D interval halving toward a target value | 2 bootstrap points, then 1 midpoint per step |
//! | [`NelderMead`] | Downhill simplex (reflect/expand/contract/shrink) | 1 trial point per sub-step, N for init/shrink |
//! | [`ParticleSwarm`] | Population-based stochastic search | whole swarm per iteration |
//! | [`Convergence`] | Sliding-window convergence sweep over ordered candidates | window fill, then as needed |
//! | [`ParameterSweep`] | Exhaustive sweep over fixed parameter sets | everything at once |

mod bisection;
mod convergence;
mod nelder_mead;
mod parameter_sweep;
mod particle_swarm;

use std::collections::BTreeMap;

pub use bisection::{Bisection, BisectionBuilder};
pub use convergence::{Convergence, ConvergenceBuilder};
pub use nelder_mead::{NelderMead, NelderMeadBuilder};
pub use parameter_sweep::{ParameterSweep, ParameterSweepBuilder};
pub use particle_swarm::{ParticleSwarm, ParticleSwarmBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::{NestedKey, extract_output};
use crate::ledger::EvaluationLedger;
use crate::value::{Value, ValueMap};

/// The best evaluation observed so far: its ledger index, the input the
/// engine created for it, and the result value it produced.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimalResult {
    /// Ledger index of the best evaluation.
    pub index: u64,
    /// Input value of the best evaluation (shape depends on the engine).
    pub input: Value,
    /// Result value of the best evaluation.
    pub output: Value,
}

/// The iteration contract every optimization engine satisfies.
///
/// The driving control loop only ever talks to this trait; which
/// algorithm runs behind it is fixed by the [`EngineSnapshot`] the loop
/// was started from.
pub trait OptimizationEngine {
    /// Returns `true` exactly when no more evaluations should be requested.
    fn is_finished(&self) -> bool;

    /// Returns `true` when the engine finished without an error condition
    /// (e.g. an exceeded iteration budget counts as finished-but-not-ok).
    fn is_finished_ok(&self) -> bool {
        self.is_finished()
    }

    /// Computes the next batch of candidate points and registers them in
    /// the ledger. Returns the fresh indices mapped to their inputs.
    ///
    /// Must not be called once [`is_finished`](Self::is_finished) is true.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyFinished`] when called on a finished engine.
    fn create_inputs(&mut self) -> Result<BTreeMap<u64, ValueMap>>;

    /// Records the outputs for the most recent batch and advances the
    /// algorithm state.
    ///
    /// `outputs` must contain exactly the indices produced by the last
    /// [`create_inputs`](Self::create_inputs) call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BatchSizeMismatch`] if the output count does not
    /// match what the current step expects, [`Error::UnknownIndex`] /
    /// [`Error::OutputAlreadyRecorded`] on ledger violations, and
    /// extraction errors if a result value is missing or malformed.
    fn update(&mut self, outputs: BTreeMap<u64, ValueMap>) -> Result<()>;

    /// Returns the best evaluation observed so far.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCompletedEvaluations`] before any evaluation has
    /// completed.
    fn optimal_result(&self) -> Result<OptimalResult>;

    /// Auxiliary diagnostic outputs emitted once at termination
    /// (e.g. the final simplex). Empty by default.
    fn engine_outputs(&self) -> ValueMap {
        ValueMap::new()
    }

    /// Returns the complete serializable state of the engine.
    fn snapshot(&self) -> EngineSnapshot;
}

/// The serializable state of one engine, tagged by engine name.
///
/// This is the persistence format for engines: the serde tag doubles as a
/// string identifier that resolves back to the concrete algorithm on
/// resume, and the payload is the engine's entire state — hyperparameters,
/// search state, and evaluation ledger.
///
/// # Examples
///
/// ```
/// use optiloop::engine::{Bisection, EngineSnapshot, OptimizationEngine};
///
/// let engine = Bisection::builder(-1.0, 1.0).tol(0.1).build().unwrap();
/// let json = serde_json::to_string(&engine.snapshot()).unwrap();
///
/// let restored: EngineSnapshot = serde_json::from_str(&json).unwrap();
/// assert_eq!(restored, engine.snapshot());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "engine", content = "state", rename_all = "snake_case")]
pub enum EngineSnapshot {
    /// State of a [`Bisection`] engine.
    Bisection(Bisection),
    /// State of a [`NelderMead`] engine.
    NelderMead(NelderMead),
    /// State of a [`ParticleSwarm`] engine.
    ParticleSwarm(ParticleSwarm),
    /// State of a [`Convergence`] engine.
    Convergence(Convergence),
    /// State of a [`ParameterSweep`] engine.
    ParameterSweep(ParameterSweep),
}

impl EngineSnapshot {
    /// Restores the live engine behind this snapshot.
    #[must_use]
    pub fn into_engine(self) -> Box<dyn OptimizationEngine> {
        match self {
            Self::Bisection(engine) => Box::new(engine),
            Self::NelderMead(engine) => Box::new(engine),
            Self::ParticleSwarm(engine) => Box::new(engine),
            Self::Convergence(engine) => Box::new(engine),
            Self::ParameterSweep(engine) => Box::new(engine),
        }
    }

    /// Returns the engine's string identifier (the serde tag).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bisection(_) => "bisection",
            Self::NelderMead(_) => "nelder_mead",
            Self::ParticleSwarm(_) => "particle_swarm",
            Self::Convergence(_) => "convergence",
            Self::ParameterSweep(_) => "parameter_sweep",
        }
    }
}

/// Scans all completed evaluations and returns the index and result value
/// minimizing `score(result)`. Ties keep the lowest index.
pub(crate) fn min_scored_output(
    ledger: &EvaluationLedger,
    result_key: &NestedKey,
    score: impl Fn(f64) -> f64,
) -> Result<(u64, f64)> {
    let key_label = result_key.to_string();
    let mut best: Option<(u64, f64, f64)> = None;
    for (index, _, output) in ledger.completed() {
        let value = extract_output(output, result_key)?.expect_float(&key_label)?;
        let scored = score(value);
        if best.is_none_or(|(_, _, best_score)| scored < best_score) {
            best = Some((index, value, scored));
        }
    }
    best.map(|(index, value, _)| (index, value))
        .ok_or(Error::NoCompletedEvaluations)
}

/// Extracts result values from an output batch in ascending index order.
pub(crate) fn sorted_result_values(
    outputs: &BTreeMap<u64, ValueMap>,
    result_key: &NestedKey,
) -> Result<Vec<f64>> {
    let key_label = result_key.to_string();
    outputs
        .values()
        .map(|out| extract_output(out, result_key)?.expect_float(&key_label))
        .collect()
}
