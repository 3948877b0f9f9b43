#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]

//! Resumable black-box optimization with externally executed evaluations.
//!
//! This crate drives iterative optimization where evaluating a candidate
//! point is expensive, asynchronous, and possibly remote: the engine
//! proposes a batch of inputs, an external [`Executor`](executor::Executor)
//! evaluates them on its own schedule — seconds or days later, possibly
//! across process restarts — and the results are folded back in to
//! compute the next batch. Everything the loop needs to continue is plain
//! serializable state, so a run can be suspended between any two protocol
//! calls and resumed exactly where it left off: same indices, same
//! numerical state, same random draws.
//!
//! # Getting started
//!
//! Bisect `f(x) = x` to its zero with an in-process executor:
//!
//! ```
//! use optiloop::prelude::*;
//!
//! let executor = FnExecutor::new(|inputs: &ValueMap| {
//!     let mut out = ValueMap::new();
//!     out.insert("result".to_string(), inputs["x"].clone());
//!     Ok(out)
//! });
//!
//! let engine = Bisection::builder(-1.1, 1.0).tol(0.1).build().unwrap();
//! let outcome = run_optimization(&executor, engine.snapshot(), ValueMap::new()).unwrap();
//! assert!(outcome.output.as_float().unwrap().abs() < 0.1);
//! ```
//!
//! # Core concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`engine::OptimizationEngine`] | The iteration contract: create a batch, receive outputs, report the best. |
//! | [`engine::EngineSnapshot`] | An engine's complete serializable state, tagged by engine name. |
//! | [`ledger::EvaluationLedger`] | Append-only record of every evaluation ever requested. |
//! | [`executor::Executor`] | The external task executor: submit / poll / fetch outputs. |
//! | [`runner::ControlLoop`] | The outer loop: launch batches, suspend, collect, finalize. |
//! | [`key::NestedKey`] | Addressing into structured input/output namespaces (`"a.b:c.d"`). |
//!
//! # Engine guide
//!
//! | Engine | Algorithm | Stops when |
//! |--------|-----------|------------|
//! | [`engine::Bisection`] | 1-D interval halving toward a target value | interval narrower than `tol` |
//! | [`engine::NelderMead`] | Downhill simplex | simplex spread below `xtol`/`ftol`, or budget |
//! | [`engine::ParticleSwarm`] | Population-based stochastic search | iteration budget |
//! | [`engine::Convergence`] | Sliding-window sweep over ordered candidates | window pairwise-close, or candidates exhausted |
//! | [`engine::ParameterSweep`] | Exhaustive sweep | every point evaluated |
//!
//! # Feature flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `checkpoint` | [`checkpoint::CheckpointFile`] — atomic on-disk state persistence with file locking | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at key optimization points | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "checkpoint")]
pub mod checkpoint;
pub mod engine;
mod error;
pub mod executor;
pub mod key;
pub mod ledger;
mod rng_util;
pub mod runner;
mod value;

pub use error::{Error, Result};
pub use value::{Value, ValueMap, distance};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use optiloop::prelude::*;
/// ```
pub mod prelude {
    #[cfg(feature = "checkpoint")]
    pub use crate::checkpoint::CheckpointFile;
    pub use crate::engine::{
        Bisection, Convergence, EngineSnapshot, NelderMead, OptimalResult, OptimizationEngine,
        ParameterSweep, ParticleSwarm,
    };
    pub use crate::error::{Error, Result};
    pub use crate::executor::{Executor, FnExecutor, TaskHandle};
    pub use crate::key::{NestedKey, extract_output, merge_inputs};
    pub use crate::ledger::{Evaluation, EvaluationLedger};
    pub use crate::runner::{
        ControlLoop, ControlLoopState, OptimizationOutcome, run_optimization,
    };
    pub use crate::value::{Value, ValueMap};
}
