#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a tolerance is not strictly positive.
    #[error("invalid tolerance: {tol} must be positive")]
    InvalidTolerance {
        /// The offending tolerance value.
        tol: f64,
    },

    /// Returned when a simplex does not have N+1 points of dimension N.
    #[error("invalid simplex: {rows} points of dimension {cols} (need dimension + 1 points)")]
    InvalidSimplex {
        /// Number of simplex points provided.
        rows: usize,
        /// Dimension of the first point.
        cols: usize,
    },

    /// Returned when the particle set is empty or has inconsistent dimensions.
    #[error("invalid swarm: {0}")]
    InvalidSwarm(&'static str),

    /// Returned when the convergence window is smaller than two entries.
    #[error("invalid convergence window: {window} must be at least 2")]
    InvalidWindow {
        /// The offending window size.
        window: usize,
    },

    /// Returned when a parameter sweep is constructed without any points.
    #[error("parameter sweep requires at least one parameter set")]
    EmptySweep,

    /// Returned when a nested key does not match the `a.b` / `a.b:c.d` grammar.
    #[error("invalid nested key '{key}': {reason}")]
    InvalidKey {
        /// The offending key string.
        key: String,
        /// Why the key failed to parse.
        reason: &'static str,
    },

    /// Returned when a nested key addresses a label that does not exist.
    #[error("no value found under nested key '{key}'")]
    MissingKey {
        /// The key that failed to resolve.
        key: String,
    },

    /// Returned when a value has the wrong shape for the requested access.
    #[error("type mismatch at '{key}': expected {expected}")]
    TypeMismatch {
        /// The key or location of the mismatch.
        key: String,
        /// The expected value shape.
        expected: &'static str,
    },

    /// Returned when outputs reference an evaluation index that was never created.
    #[error("unknown evaluation index {index}")]
    UnknownIndex {
        /// The index that does not exist in the ledger.
        index: u64,
    },

    /// Returned when an output is recorded twice for the same evaluation.
    #[error("output already recorded for evaluation index {index}")]
    OutputAlreadyRecorded {
        /// The index whose output was already set.
        index: u64,
    },

    /// Returned when an update receives a different number of outputs than
    /// the engine's current step requires.
    #[error("batch size mismatch: expected {expected} outputs, got {got}")]
    BatchSizeMismatch {
        /// The number of outputs the engine expected.
        expected: usize,
        /// The number of outputs received.
        got: usize,
    },

    /// Returned by bisection when the target value cannot be reached
    /// between the two boundary function values.
    #[error("target value {target} is outside the achievable range [{low}, {high}]")]
    TargetOutOfRange {
        /// The requested target value.
        target: f64,
        /// Smaller of the two boundary function values.
        low: f64,
        /// Larger of the two boundary function values.
        high: f64,
    },

    /// Returned when new inputs are requested from a finished engine.
    #[error("engine is finished; no further inputs can be created")]
    AlreadyFinished,

    /// Returned when the optimal result is requested before any evaluation
    /// has completed.
    #[error("no completed evaluations available")]
    NoCompletedEvaluations,

    /// Returned when results are collected while a dispatched task is
    /// still running.
    #[error("evaluation {index} is still running")]
    TaskStillRunning {
        /// The ledger index of the running evaluation.
        index: u64,
    },

    /// Returned when an external evaluation task did not finish ok.
    /// This aborts the whole optimization run; no retry is attempted.
    #[error("evaluation {index} (task {task}) failed")]
    EvaluationFailed {
        /// The ledger index of the failed evaluation.
        index: u64,
        /// The external task handle of the failed evaluation.
        task: String,
    },

    /// Returned at finalize when the engine finished with an error
    /// condition (iteration budget exceeded, convergence impossible).
    #[error("engine finished with an error condition")]
    EngineFailed,

    /// Returned when a task handle is not known to the executor.
    #[error("unknown task handle '{task}'")]
    TaskNotFound {
        /// The handle that failed to resolve.
        task: String,
    },

    /// Returned when a task's outputs are requested but the task did not
    /// finish ok.
    #[error("task {task} did not finish ok")]
    TaskFailed {
        /// The handle of the failed task.
        task: String,
    },

    /// Returned when an internal invariant is violated.
    #[error("internal error: {0}")]
    Internal(&'static str),

    /// Returned when a checkpoint operation fails.
    #[cfg(feature = "checkpoint")]
    #[error("checkpoint error: {0}")]
    Storage(String),
}

pub type Result<T> = core::result::Result<T, Error>;
