//! The driving control loop.
//!
//! [`ControlLoop`] owns one engine and walks the protocol the engine and
//! executor share: while the engine is not finished, create a batch of
//! inputs, dispatch one external task per index, wait, fold the outputs
//! back in, repeat; then surface the optimal evaluation. The loop itself
//! holds no hidden state — [`ControlLoop::state`] captures its entire
//! continuation (engine snapshot, dispatched-task table, pending indices,
//! broadcast constants) and [`ControlLoop::resume`] rebuilds the loop
//! from it, in the same process or a later one.
//!
//! The two suspension points per iteration are after the finished check
//! and after a batch has been dispatched; both are just "take the state,
//! come back later".

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{EngineSnapshot, OptimizationEngine};
use crate::error::{Error, Result};
use crate::executor::{Executor, TaskHandle};
use crate::key::merge_inputs;
use crate::value::{Value, ValueMap};

/// How long [`ControlLoop::run`] sleeps between poll sweeps.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The final product of a successful optimization run.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationOutcome {
    /// Ledger index of the optimal evaluation.
    pub index: u64,
    /// Input value of the optimal evaluation.
    pub input: Value,
    /// Result value of the optimal evaluation.
    pub output: Value,
    /// External task handle of the optimal evaluation.
    pub task: TaskHandle,
    /// Diagnostic outputs the engine emitted at termination.
    pub engine_outputs: ValueMap,
}

/// The serializable continuation of a [`ControlLoop`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlLoopState {
    engine: EngineSnapshot,
    /// Constant inputs merged into every evaluation.
    constants: ValueMap,
    /// Every dispatched task, keyed by ledger index. Kept for the whole
    /// run so the optimal evaluation's task can be reported at finalize.
    tasks: BTreeMap<u64, TaskHandle>,
    /// Indices dispatched but not yet folded back, in dispatch order.
    pending: Vec<u64>,
}

/// Drives one optimization engine against one executor.
///
/// # Examples
///
/// ```
/// use optiloop::engine::{Bisection, OptimizationEngine};
/// use optiloop::executor::FnExecutor;
/// use optiloop::runner::ControlLoop;
/// use optiloop::{Value, ValueMap};
///
/// let executor = FnExecutor::new(|inputs: &ValueMap| {
///     let mut out = ValueMap::new();
///     out.insert("result".to_string(), inputs["x"].clone());
///     Ok(out)
/// });
///
/// let engine = Bisection::builder(-1.1, 1.0).tol(0.1).build().unwrap();
/// let mut control = ControlLoop::new(&executor, engine.snapshot());
/// let outcome = control.run().unwrap();
/// assert!(outcome.output.as_float().unwrap().abs() < 0.1);
/// ```
pub struct ControlLoop<'x, X: Executor + ?Sized> {
    executor: &'x X,
    engine: Box<dyn OptimizationEngine>,
    constants: ValueMap,
    tasks: BTreeMap<u64, TaskHandle>,
    pending: Vec<u64>,
}

impl<'x, X: Executor + ?Sized> ControlLoop<'x, X> {
    /// Creates a control loop from a freshly configured engine.
    #[must_use]
    pub fn new(executor: &'x X, engine: EngineSnapshot) -> Self {
        Self::with_constants(executor, engine, ValueMap::new())
    }

    /// Creates a control loop that merges `constants` into the inputs of
    /// every evaluation (nested-key syntax applies).
    #[must_use]
    pub fn with_constants(executor: &'x X, engine: EngineSnapshot, constants: ValueMap) -> Self {
        trace_info!(engine = engine.name(), "creating optimizer instance");
        Self {
            executor,
            engine: engine.into_engine(),
            constants,
            tasks: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    /// Rebuilds a control loop from a previously captured state.
    #[must_use]
    pub fn resume(executor: &'x X, state: ControlLoopState) -> Self {
        trace_info!(engine = state.engine.name(), "resuming optimizer instance");
        Self {
            executor,
            engine: state.engine.into_engine(),
            constants: state.constants,
            tasks: state.tasks,
            pending: state.pending,
        }
    }

    /// Captures the loop's complete continuation for suspension.
    #[must_use]
    pub fn state(&self) -> ControlLoopState {
        ControlLoopState {
            engine: self.engine.snapshot(),
            constants: self.constants.clone(),
            tasks: self.tasks.clone(),
            pending: self.pending.clone(),
        }
    }

    /// Returns `true` when the engine requests no further evaluations.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.engine.is_finished()
    }

    /// Returns the engine's diagnostic outputs collected so far.
    ///
    /// Also available on the failure path, where the outcome of
    /// [`finalize`](Self::finalize) is an error.
    #[must_use]
    pub fn engine_outputs(&self) -> ValueMap {
        self.engine.engine_outputs()
    }

    /// Creates the engine's next batch and dispatches one task per index.
    ///
    /// Returns the number of dispatched evaluations. After this call the
    /// loop can be suspended via [`state`](Self::state) until the tasks
    /// have finished.
    ///
    /// # Errors
    ///
    /// Propagates engine, key-merging, and submission errors.
    pub fn launch_evaluations(&mut self) -> Result<usize> {
        trace_info!("launching pending evaluations");
        let batch = self.engine.create_inputs()?;
        let count = batch.len();
        for (index, inputs) in batch {
            trace_debug!(index, "launching evaluation");
            let merged = merge_inputs(&inputs, &self.constants)?;
            let task = self.executor.submit(&merged)?;
            self.tasks.insert(index, task);
            self.pending.push(index);
        }
        Ok(count)
    }

    /// Returns `true` once every pending task has finished.
    ///
    /// # Errors
    ///
    /// Propagates polling errors.
    pub fn all_tasks_finished(&self) -> Result<bool> {
        for &index in &self.pending {
            let task = self.task_for(index)?;
            if !self.executor.poll(task)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Fetches the outputs of every pending task, in dispatch order, and
    /// folds them into the engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskStillRunning`] (leaving the loop untouched,
    /// so the call can be retried) if a pending task has not finished,
    /// and [`Error::EvaluationFailed`] if one did not finish ok — a
    /// single failed evaluation aborts the whole run.
    pub fn collect_results(&mut self) -> Result<()> {
        trace_info!("checking finished evaluations");
        for &index in &self.pending {
            let task = self.task_for(index)?;
            if !self.executor.poll(task)? {
                return Err(Error::TaskStillRunning { index });
            }
        }

        let mut outputs = BTreeMap::new();
        for &index in &self.pending {
            let task = self.task_for(index)?;
            if !self.executor.is_finished_ok(task)? {
                return Err(Error::EvaluationFailed {
                    index,
                    task: task.to_string(),
                });
            }
            trace_debug!(index, "retrieving evaluation output");
            outputs.insert(index, self.executor.outputs(task)?);
        }

        self.pending.clear();
        self.engine.update(outputs)
    }

    /// Concludes the run: checks the engine finished ok and packages the
    /// optimal evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineFailed`] when the engine finished with an
    /// error condition; diagnostic outputs remain available through
    /// [`engine_outputs`](Self::engine_outputs).
    pub fn finalize(&self) -> Result<OptimizationOutcome> {
        trace_info!("finalizing optimization procedure");
        if !self.engine.is_finished_ok() {
            return Err(Error::EngineFailed);
        }
        let optimal = self.engine.optimal_result()?;
        let task = self
            .tasks
            .get(&optimal.index)
            .cloned()
            .ok_or(Error::Internal("no task recorded for optimal evaluation"))?;
        Ok(OptimizationOutcome {
            index: optimal.index,
            input: optimal.input,
            output: optimal.output,
            task,
            engine_outputs: self.engine.engine_outputs(),
        })
    }

    /// Drives the loop to completion in this process.
    ///
    /// Requires an executor whose tasks complete on their own; between
    /// poll sweeps the loop sleeps briefly. For suspendable operation use
    /// the step methods and [`state`](Self::state) instead.
    ///
    /// # Errors
    ///
    /// Propagates any step error, [`Error::EvaluationFailed`], and
    /// [`Error::EngineFailed`].
    pub fn run(&mut self) -> Result<OptimizationOutcome> {
        while !self.is_finished() {
            self.launch_evaluations()?;
            while !self.all_tasks_finished()? {
                std::thread::sleep(POLL_INTERVAL);
            }
            self.collect_results()?;
        }
        self.finalize()
    }

    fn task_for(&self, index: u64) -> Result<&TaskHandle> {
        self.tasks
            .get(&index)
            .ok_or(Error::Internal("pending evaluation has no task handle"))
    }
}

/// Runs one optimization to completion.
///
/// Convenience wrapper over [`ControlLoop`] for the common case of an
/// in-process executor and no suspension.
///
/// # Errors
///
/// See [`ControlLoop::run`].
pub fn run_optimization<X: Executor + ?Sized>(
    executor: &X,
    engine: EngineSnapshot,
    constants: ValueMap,
) -> Result<OptimizationOutcome> {
    ControlLoop::with_constants(executor, engine, constants).run()
}
