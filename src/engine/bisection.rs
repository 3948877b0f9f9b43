//! 1-D bisection toward a target function value.
//!
//! The engine keeps an interval `[lower, upper]` and halves it each
//! iteration. A one-time bootstrap evaluates *both* ends so the search
//! direction does not have to be known up front: after the bootstrap,
//! `upper` is always the side with the higher function value, whichever
//! bound the caller passed it as. The function is assumed monotonic
//! between the bounds; this is not verified.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EngineSnapshot, OptimalResult, OptimizationEngine, min_scored_output};
use crate::error::{Error, Result};
use crate::key::NestedKey;
use crate::ledger::EvaluationLedger;
use crate::value::{Value, ValueMap};

/// Bisection optimization engine.
///
/// Searches the 1-D input value at which the evaluated function reaches
/// `target_value`, to within `tol` on the input.
///
/// # Examples
///
/// ```
/// use optiloop::engine::{Bisection, OptimizationEngine};
///
/// let mut engine = Bisection::builder(-1.1, 1.0).tol(0.1).build().unwrap();
/// assert!(!engine.is_finished());
///
/// // The bootstrap batch evaluates both interval ends.
/// let batch = engine.create_inputs().unwrap();
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bisection {
    lower: f64,
    upper: f64,
    tol: f64,
    input_keys: Vec<String>,
    result_key: NestedKey,
    target_value: f64,
    initialized: bool,
    ledger: EvaluationLedger,
}

impl Bisection {
    /// Creates a builder with the interval to bisect.
    ///
    /// Defaults: `tol = 1e-6`, `input_key = "x"`, `result_key = "result"`,
    /// `target_value = 0.0`.
    #[must_use]
    pub fn builder(lower: f64, upper: f64) -> BisectionBuilder {
        BisectionBuilder {
            lower,
            upper,
            tol: 1e-6,
            input_keys: vec!["x".to_string()],
            result_key: "result".to_string(),
            target_value: 0.0,
        }
    }

    fn midpoint(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }

    /// The same value is broadcast to every configured input key.
    fn point_input(&self, value: f64) -> ValueMap {
        self.input_keys
            .iter()
            .map(|key| (key.clone(), Value::Float(value)))
            .collect()
    }
}

impl OptimizationEngine for Bisection {
    fn is_finished(&self) -> bool {
        (self.upper - self.lower).abs() < self.tol
    }

    fn create_inputs(&mut self) -> Result<BTreeMap<u64, ValueMap>> {
        if self.is_finished() {
            return Err(Error::AlreadyFinished);
        }
        let batch = if self.initialized {
            vec![self.point_input(self.midpoint())]
        } else {
            vec![self.point_input(self.lower), self.point_input(self.upper)]
        };
        Ok(self.ledger.add_inputs(batch))
    }

    fn update(&mut self, outputs: BTreeMap<u64, ValueMap>) -> Result<()> {
        self.ledger.add_outputs(&outputs)?;
        let values = super::sorted_result_values(&outputs, &self.result_key)?;

        if self.initialized {
            if values.len() != 1 {
                return Err(Error::BatchSizeMismatch {
                    expected: 1,
                    got: values.len(),
                });
            }
            if values[0] - self.target_value > 0.0 {
                self.upper = self.midpoint();
            } else {
                self.lower = self.midpoint();
            }
        } else {
            self.initialized = true;
            if values.len() != 2 {
                return Err(Error::BatchSizeMismatch {
                    expected: 2,
                    got: values.len(),
                });
            }
            // Ascending index order: the lower end was created first.
            let (f_lower, f_upper) = (values[0], values[1]);
            if f_lower > f_upper {
                core::mem::swap(&mut self.lower, &mut self.upper);
            }
            let (low, high) = (f_lower.min(f_upper), f_lower.max(f_upper));
            if self.target_value < low || self.target_value > high {
                return Err(Error::TargetOutOfRange {
                    target: self.target_value,
                    low,
                    high,
                });
            }
        }
        Ok(())
    }

    fn optimal_result(&self) -> Result<OptimalResult> {
        // The whole ledger is scanned: the final halving step may land
        // farther from the target than an earlier evaluation.
        let (index, value) = min_scored_output(&self.ledger, &self.result_key, |v| {
            (v - self.target_value).abs()
        })?;
        let input = self
            .ledger
            .get(index)
            .and_then(|eval| eval.input().get(&self.input_keys[0]))
            .cloned()
            .ok_or(Error::Internal("optimal evaluation lost its input"))?;
        Ok(OptimalResult {
            index,
            input,
            output: Value::Float(value),
        })
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::Bisection(self.clone())
    }
}

/// Builder for a [`Bisection`] engine.
///
/// # Examples
///
/// ```
/// use optiloop::engine::Bisection;
///
/// let engine = Bisection::builder(-2.0, 1.0)
///     .tol(1e-1)
///     .target_value(-0.2)
///     .input_key("y")
///     .result_key("the_result")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct BisectionBuilder {
    lower: f64,
    upper: f64,
    tol: f64,
    input_keys: Vec<String>,
    result_key: String,
    target_value: f64,
}

impl BisectionBuilder {
    /// Sets the tolerance on the input value. Default: `1e-6`.
    #[must_use]
    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Sets the name of the input to vary. Default: `"x"`.
    ///
    /// The key may use nested-key syntax (e.g. `"a:b.c"`).
    #[must_use]
    pub fn input_key(mut self, key: impl Into<String>) -> Self {
        self.input_keys = vec![key.into()];
        self
    }

    /// Sets several input keys; the bisected value is broadcast to all of
    /// them.
    #[must_use]
    pub fn input_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the name of the output containing the evaluated function
    /// value. Default: `"result"`.
    #[must_use]
    pub fn result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = key.into();
        self
    }

    /// Sets the function value the bisection converges toward.
    /// Default: `0.0`.
    #[must_use]
    pub fn target_value(mut self, target: f64) -> Self {
        self.target_value = target;
        self
    }

    /// Builds the configured [`Bisection`] engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTolerance`] for a non-positive tolerance
    /// and [`Error::InvalidKey`] for malformed input or result keys.
    pub fn build(self) -> Result<Bisection> {
        if !(self.tol > 0.0 && self.tol.is_finite()) {
            return Err(Error::InvalidTolerance { tol: self.tol });
        }
        if self.input_keys.is_empty() {
            return Err(Error::InvalidKey {
                key: String::new(),
                reason: "at least one input key is required",
            });
        }
        for key in &self.input_keys {
            NestedKey::parse(key)?;
        }
        Ok(Bisection {
            lower: self.lower,
            upper: self.upper,
            tol: self.tol,
            input_keys: self.input_keys,
            result_key: NestedKey::parse(&self.result_key)?,
            target_value: self.target_value,
            initialized: false,
            ledger: EvaluationLedger::new(),
        })
    }
}
