//! The external-executor boundary.
//!
//! The control loop never evaluates anything itself: it hands each input
//! to an [`Executor`] and gets back an opaque [`TaskHandle`] it can poll
//! and, once finished, fetch outputs from. Handles are plain strings so
//! they serialize alongside the rest of the loop state — a resumed
//! process can keep polling tasks submitted before it restarted, provided
//! the executor on the other side is durable.
//!
//! [`FnExecutor`] is the in-process implementation used by tests and
//! demos: it wraps a plain function and either evaluates at submit time
//! or, in deferred mode, parks submissions until
//! [`run_pending`](FnExecutor::run_pending) is called — which is how the
//! test suite exercises real suspend/resume sequences.

use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::ValueMap;

/// Opaque identifier of one submitted evaluation task.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    /// Wraps an executor-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asynchronous task execution as seen by the control loop.
///
/// Implementations must tolerate polling the same handle repeatedly and
/// fetching outputs more than once.
pub trait Executor {
    /// Submits one evaluation and returns immediately with its handle.
    ///
    /// # Errors
    ///
    /// Implementation-defined submission failures.
    fn submit(&self, inputs: &ValueMap) -> Result<TaskHandle>;

    /// Returns `true` once the task has finished (ok or not).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for an unknown handle.
    fn poll(&self, task: &TaskHandle) -> Result<bool>;

    /// Returns `true` if the task finished without error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for an unknown handle.
    fn is_finished_ok(&self, task: &TaskHandle) -> Result<bool>;

    /// Returns the named outputs of a finished task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for an unknown handle and
    /// [`Error::TaskFailed`] if the task did not finish ok.
    fn outputs(&self, task: &TaskHandle) -> Result<ValueMap>;

    /// Submits one evaluation and blocks until its outputs are available.
    ///
    /// The default implementation polls in a tight loop; executors backed
    /// by genuinely asynchronous work should override it with a blocking
    /// wait.
    ///
    /// # Errors
    ///
    /// Propagates submission and polling errors, and [`Error::TaskFailed`]
    /// if the evaluation does not finish ok.
    fn run_sync(&self, inputs: &ValueMap) -> Result<(ValueMap, TaskHandle)> {
        let task = self.submit(inputs)?;
        while !self.poll(&task)? {}
        Ok((self.outputs(&task)?, task))
    }
}

/// The outcome one function evaluation reports back: named outputs on
/// success, a message on failure.
pub type EvalOutcome = core::result::Result<ValueMap, String>;

enum TaskState {
    Pending(ValueMap),
    Done(EvalOutcome),
}

/// An in-process executor wrapping a plain evaluation function.
///
/// # Examples
///
/// ```
/// use optiloop::executor::{Executor, FnExecutor};
/// use optiloop::{Value, ValueMap};
///
/// let executor = FnExecutor::new(|inputs: &ValueMap| {
///     let x = inputs["x"].as_float().expect("x must be numeric");
///     let mut out = ValueMap::new();
///     out.insert("result".to_string(), Value::Float(x * x));
///     Ok(out)
/// });
///
/// let mut inputs = ValueMap::new();
/// inputs.insert("x".to_string(), Value::Float(3.0));
/// let (outputs, _task) = executor.run_sync(&inputs).unwrap();
/// assert_eq!(outputs["result"], Value::Float(9.0));
/// ```
pub struct FnExecutor<F> {
    function: F,
    deferred: bool,
    tasks: Mutex<HashMap<TaskHandle, TaskState>>,
    counter: AtomicU64,
}

impl<F> FnExecutor<F>
where
    F: Fn(&ValueMap) -> EvalOutcome,
{
    /// Creates an executor that evaluates each submission immediately.
    #[must_use]
    pub fn new(function: F) -> Self {
        Self {
            function,
            deferred: false,
            tasks: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Creates an executor that parks submissions as pending until
    /// [`run_pending`](Self::run_pending) is called.
    #[must_use]
    pub fn deferred(function: F) -> Self {
        Self {
            function,
            deferred: true,
            tasks: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Evaluates all pending submissions. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut tasks = self.tasks.lock();
        let mut ran = 0;
        for state in tasks.values_mut() {
            if let TaskState::Pending(inputs) = state {
                let outcome = (self.function)(inputs);
                *state = TaskState::Done(outcome);
                ran += 1;
            }
        }
        ran
    }

    /// Returns the number of submissions made so far.
    #[must_use]
    pub fn n_submitted(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl<F> Executor for FnExecutor<F>
where
    F: Fn(&ValueMap) -> EvalOutcome,
{
    fn submit(&self, inputs: &ValueMap) -> Result<TaskHandle> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let task = TaskHandle::new(format!("task-{id}"));
        let state = if self.deferred {
            TaskState::Pending(inputs.clone())
        } else {
            TaskState::Done((self.function)(inputs))
        };
        self.tasks.lock().insert(task.clone(), state);
        Ok(task)
    }

    fn poll(&self, task: &TaskHandle) -> Result<bool> {
        match self.tasks.lock().get(task) {
            Some(TaskState::Pending(_)) => Ok(false),
            Some(TaskState::Done(_)) => Ok(true),
            None => Err(Error::TaskNotFound {
                task: task.to_string(),
            }),
        }
    }

    fn is_finished_ok(&self, task: &TaskHandle) -> Result<bool> {
        match self.tasks.lock().get(task) {
            Some(TaskState::Done(outcome)) => Ok(outcome.is_ok()),
            Some(TaskState::Pending(_)) => Ok(false),
            None => Err(Error::TaskNotFound {
                task: task.to_string(),
            }),
        }
    }

    fn outputs(&self, task: &TaskHandle) -> Result<ValueMap> {
        match self.tasks.lock().get(task) {
            Some(TaskState::Done(Ok(outputs))) => Ok(outputs.clone()),
            Some(TaskState::Done(Err(_)) | TaskState::Pending(_)) => Err(Error::TaskFailed {
                task: task.to_string(),
            }),
            None => Err(Error::TaskNotFound {
                task: task.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn square(inputs: &ValueMap) -> EvalOutcome {
        let x = inputs["x"].as_float().ok_or("x must be numeric")?;
        let mut out = ValueMap::new();
        out.insert("result".to_string(), Value::Float(x * x));
        Ok(out)
    }

    fn input(x: f64) -> ValueMap {
        let mut map = ValueMap::new();
        map.insert("x".to_string(), Value::Float(x));
        map
    }

    #[test]
    fn test_immediate_executor_completes_at_submit() {
        let executor = FnExecutor::new(square);
        let task = executor.submit(&input(2.0)).unwrap();
        assert!(executor.poll(&task).unwrap());
        assert!(executor.is_finished_ok(&task).unwrap());
        assert_eq!(
            executor.outputs(&task).unwrap()["result"],
            Value::Float(4.0)
        );
    }

    #[test]
    fn test_deferred_executor_parks_until_released() {
        let executor = FnExecutor::deferred(square);
        let task = executor.submit(&input(3.0)).unwrap();
        assert!(!executor.poll(&task).unwrap());

        assert_eq!(executor.run_pending(), 1);
        assert!(executor.poll(&task).unwrap());
        assert_eq!(
            executor.outputs(&task).unwrap()["result"],
            Value::Float(9.0)
        );
    }

    #[test]
    fn test_failing_function_marks_task_failed() {
        let executor = FnExecutor::new(|_: &ValueMap| Err("boom".to_string()));
        let task = executor.submit(&ValueMap::new()).unwrap();
        assert!(executor.poll(&task).unwrap());
        assert!(!executor.is_finished_ok(&task).unwrap());
        assert!(matches!(
            executor.outputs(&task),
            Err(Error::TaskFailed { .. })
        ));
    }

    #[test]
    fn test_unknown_handle() {
        let executor = FnExecutor::new(square);
        let stranger = TaskHandle::new("task-99");
        assert!(matches!(
            executor.poll(&stranger),
            Err(Error::TaskNotFound { .. })
        ));
    }

    #[test]
    fn test_run_sync_round_trip() {
        let executor = FnExecutor::new(square);
        let (outputs, task) = executor.run_sync(&input(5.0)).unwrap();
        assert_eq!(outputs["result"], Value::Float(25.0));
        assert!(executor.is_finished_ok(&task).unwrap());
    }

    #[test]
    fn test_handles_are_unique() {
        let executor = FnExecutor::new(square);
        let a = executor.submit(&input(1.0)).unwrap();
        let b = executor.submit(&input(1.0)).unwrap();
        assert_ne!(a, b);
        assert_eq!(executor.n_submitted(), 2);
    }
}
