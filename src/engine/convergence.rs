//! Sliding-window convergence sweep over an ordered candidate list.
//!
//! Walks a user-supplied list of input values in order and stops as soon
//! as the most recent `convergence_window` results are pairwise closer
//! than the tolerance. Each round evaluates just enough additional
//! candidates to push the last out-of-tolerance result out of the window;
//! when that provably cannot happen within the remaining candidates, the
//! engine finishes with an error condition instead of burning through the
//! rest of the list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EngineSnapshot, OptimalResult, OptimizationEngine};
use crate::error::{Error, Result};
use crate::key::{NestedKey, extract_output};
use crate::ledger::EvaluationLedger;
use crate::value::{Value, ValueMap, distance};

/// Convergence optimization engine.
///
/// Finds the first window of consecutive results (scalar or vector) whose
/// pairwise distances all drop below `tol`.
///
/// # Examples
///
/// ```
/// use optiloop::engine::{Convergence, OptimizationEngine};
///
/// let candidates = [0.0, 1.0, 2.0, 2.01, 2.02, 2.03];
/// let mut engine = Convergence::builder(candidates, 0.1)
///     .convergence_window(3)
///     .build()
///     .unwrap();
///
/// // The first batch fills the convergence window.
/// let batch = engine.create_inputs().unwrap();
/// assert_eq!(batch.len(), 3);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Convergence {
    input_values: Vec<Value>,
    tol: f64,
    input_key: String,
    result_key: NestedKey,
    convergence_window: usize,
    /// Number of candidate inputs consumed so far.
    current_index: usize,
    /// Result values in evaluation order.
    result_values: Vec<Value>,
    initialized: bool,
    ledger: EvaluationLedger,
}

impl Convergence {
    /// Creates a builder from the ordered candidate inputs and the
    /// roughness tolerance.
    ///
    /// Defaults: `input_key = "x"`, `result_key = "result"`,
    /// `convergence_window = 2`.
    #[must_use]
    pub fn builder<I, V>(input_values: I, tol: f64) -> ConvergenceBuilder
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ConvergenceBuilder {
            input_values: input_values.into_iter().map(Into::into).collect(),
            tol,
            input_key: "x".to_string(),
            result_key: "result".to_string(),
            convergence_window: 2,
        }
    }

    /// The most recent window of results, once it is full.
    fn window(&self) -> Option<&[Value]> {
        self.result_values
            .len()
            .checked_sub(self.convergence_window)
            .map(|start| &self.result_values[start..])
    }

    /// Pairwise distances of the current window as a jagged triangle:
    /// row `i` holds the distances from entry `i` to every later entry.
    fn distance_triangle(&self) -> Option<Vec<Vec<f64>>> {
        let window = self.window()?;
        Some(
            (0..window.len() - 1)
                .map(|i| {
                    (i + 1..window.len())
                        .map(|j| distance(&window[i], &window[j]).unwrap_or(f64::INFINITY))
                        .collect()
                })
                .collect(),
        )
    }

    /// Minimum number of additional evaluations needed before the next
    /// window could possibly converge: enough to push the last result
    /// that still causes out-of-tolerance roughness out of the window.
    /// `None` means the remaining candidates cannot get there.
    fn num_new_iters(&self) -> Option<usize> {
        let triangle = self.distance_triangle()?;
        let mut num_new = 0;
        for (i, row) in triangle.iter().enumerate() {
            if row.iter().any(|&d| d > self.tol) {
                num_new = i + 1;
            }
        }
        if self.current_index + num_new > self.input_values.len() {
            return None;
        }
        Some(num_new)
    }

    fn is_converged(&self) -> bool {
        if !self.initialized {
            return false;
        }
        self.distance_triangle().is_some_and(|triangle| {
            triangle
                .iter()
                .flatten()
                .fold(0.0_f64, |acc, &d| acc.max(d))
                < self.tol
        })
    }
}

impl OptimizationEngine for Convergence {
    fn is_finished(&self) -> bool {
        if !self.initialized {
            return false;
        }
        // Dispatched but not yet evaluated: the first window is still
        // being filled, so there is nothing to decide on.
        if self.result_values.len() < self.convergence_window {
            return false;
        }
        if self.result_values.len() >= self.input_values.len() {
            return true;
        }
        if self.num_new_iters().is_none() {
            return true;
        }
        self.is_converged()
    }

    fn is_finished_ok(&self) -> bool {
        self.is_finished() && self.is_converged()
    }

    fn create_inputs(&mut self) -> Result<BTreeMap<u64, ValueMap>> {
        if self.is_finished() {
            return Err(Error::AlreadyFinished);
        }
        let num_new = if self.initialized {
            match self.num_new_iters() {
                Some(num) if num > 0 => num,
                _ => return Err(Error::Internal("no further evaluations required")),
            }
        } else {
            self.initialized = true;
            self.convergence_window
        };

        self.current_index += num_new;
        let inputs = self.input_values[self.current_index - num_new..self.current_index]
            .iter()
            .map(|value| {
                let mut map = ValueMap::new();
                map.insert(self.input_key.clone(), value.clone());
                map
            })
            .collect();
        Ok(self.ledger.add_inputs(inputs))
    }

    fn update(&mut self, outputs: BTreeMap<u64, ValueMap>) -> Result<()> {
        self.ledger.add_outputs(&outputs)?;
        // Ascending index order preserves evaluation order.
        for output in outputs.values() {
            let value = extract_output(output, &self.result_key)?;
            if let Some(previous) = self.result_values.last() {
                // Shapes must stay comparable for the window distances.
                distance(previous, &value)?;
            } else if value.as_float().is_none() && value.as_point().is_none() {
                return Err(Error::TypeMismatch {
                    key: self.result_key.to_string(),
                    expected: "a numeric scalar or numeric list",
                });
            }
            self.result_values.push(value);
        }
        Ok(())
    }

    fn optimal_result(&self) -> Result<OptimalResult> {
        // The first entry of the final window: the coarsest input whose
        // result already agrees with everything after it.
        let start = self
            .result_values
            .len()
            .checked_sub(self.convergence_window)
            .ok_or(Error::NoCompletedEvaluations)?;
        let index = start as u64;
        let evaluation = self
            .ledger
            .get(index)
            .ok_or(Error::UnknownIndex { index })?;
        let input = evaluation
            .input()
            .get(&self.input_key)
            .cloned()
            .ok_or(Error::Internal("optimal evaluation lost its input"))?;
        let output = evaluation
            .output()
            .ok_or(Error::NoCompletedEvaluations)
            .and_then(|out| extract_output(out, &self.result_key))?;
        Ok(OptimalResult {
            index,
            input,
            output,
        })
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::Convergence(self.clone())
    }
}

/// Builder for a [`Convergence`] engine.
#[derive(Clone, Debug)]
pub struct ConvergenceBuilder {
    input_values: Vec<Value>,
    tol: f64,
    input_key: String,
    result_key: String,
    convergence_window: usize,
}

impl ConvergenceBuilder {
    /// Sets the name of the input to vary. Default: `"x"`.
    #[must_use]
    pub fn input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = key.into();
        self
    }

    /// Sets the name of the output to converge. Default: `"result"`.
    #[must_use]
    pub fn result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = key.into();
        self
    }

    /// Sets the number of consecutive results examined for pairwise
    /// closeness. Default: 2.
    #[must_use]
    pub fn convergence_window(mut self, window: usize) -> Self {
        self.convergence_window = window;
        self
    }

    /// Builds the configured [`Convergence`] engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTolerance`] for a non-positive tolerance,
    /// [`Error::InvalidWindow`] when the window is smaller than 2 or
    /// larger than the candidate list, and [`Error::InvalidKey`] for
    /// malformed keys.
    pub fn build(self) -> Result<Convergence> {
        if !(self.tol > 0.0 && self.tol.is_finite()) {
            return Err(Error::InvalidTolerance { tol: self.tol });
        }
        if self.convergence_window < 2 || self.convergence_window > self.input_values.len() {
            return Err(Error::InvalidWindow {
                window: self.convergence_window,
            });
        }
        NestedKey::parse(&self.input_key)?;
        Ok(Convergence {
            input_values: self.input_values,
            tol: self.tol,
            input_key: self.input_key,
            result_key: NestedKey::parse(&self.result_key)?,
            convergence_window: self.convergence_window,
            current_index: 0,
            result_values: Vec::new(),
            initialized: false,
            ledger: EvaluationLedger::new(),
        })
    }
}
