//! Exhaustive sweep over a fixed list of parameter sets.
//!
//! The simplest engine: every parameter set is dispatched in a single
//! batch, and the sweep is finished once every evaluation has reported
//! back. There is no iteration state beyond the ledger itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EngineSnapshot, OptimalResult, OptimizationEngine, min_scored_output};
use crate::error::{Error, Result};
use crate::key::NestedKey;
use crate::ledger::EvaluationLedger;
use crate::value::{Value, ValueMap};

/// Parameter-sweep optimization engine.
///
/// Evaluates each supplied parameter set once and reports the one with
/// the minimal result value.
///
/// # Examples
///
/// ```
/// use optiloop::engine::{OptimizationEngine, ParameterSweep};
/// use optiloop::{Value, ValueMap};
///
/// let parameters: Vec<ValueMap> = (0..4)
///     .map(|i| {
///         let mut map = ValueMap::new();
///         map.insert("x".to_string(), Value::Float(f64::from(i)));
///         map
///     })
///     .collect();
///
/// let mut engine = ParameterSweep::builder(parameters).build().unwrap();
/// assert_eq!(engine.create_inputs().unwrap().len(), 4);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSweep {
    parameters: Vec<ValueMap>,
    result_key: NestedKey,
    ledger: EvaluationLedger,
}

impl ParameterSweep {
    /// Creates a builder from the parameter sets to evaluate.
    ///
    /// Defaults: `result_key = "result"`.
    #[must_use]
    pub fn builder(parameters: Vec<ValueMap>) -> ParameterSweepBuilder {
        ParameterSweepBuilder {
            parameters,
            result_key: "result".to_string(),
        }
    }
}

impl OptimizationEngine for ParameterSweep {
    fn is_finished(&self) -> bool {
        self.ledger.len() >= self.parameters.len() && self.ledger.all_completed()
    }

    fn create_inputs(&mut self) -> Result<BTreeMap<u64, ValueMap>> {
        if self.is_finished() {
            return Err(Error::AlreadyFinished);
        }
        Ok(self.ledger.add_inputs(self.parameters.clone()))
    }

    fn update(&mut self, outputs: BTreeMap<u64, ValueMap>) -> Result<()> {
        // Pure bookkeeping; completion order is irrelevant to the sweep.
        self.ledger.add_outputs(&outputs)
    }

    fn optimal_result(&self) -> Result<OptimalResult> {
        let (index, value) = min_scored_output(&self.ledger, &self.result_key, |v| v)?;
        let input = self
            .ledger
            .get(index)
            .map(|eval| Value::Map(eval.input().clone()))
            .ok_or(Error::Internal("optimal evaluation lost its input"))?;
        Ok(OptimalResult {
            index,
            input,
            output: Value::Float(value),
        })
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::ParameterSweep(self.clone())
    }
}

/// Builder for a [`ParameterSweep`] engine.
#[derive(Clone, Debug)]
pub struct ParameterSweepBuilder {
    parameters: Vec<ValueMap>,
    result_key: String,
}

impl ParameterSweepBuilder {
    /// Sets the name of the output argument. Default: `"result"`.
    #[must_use]
    pub fn result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = key.into();
        self
    }

    /// Builds the configured [`ParameterSweep`] engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptySweep`] if no parameter set was supplied and
    /// [`Error::InvalidKey`] if a parameter name or the result key does
    /// not parse as a nested key.
    pub fn build(self) -> Result<ParameterSweep> {
        if self.parameters.is_empty() {
            return Err(Error::EmptySweep);
        }
        for key in self.parameters.iter().flat_map(ValueMap::keys) {
            NestedKey::parse(key)?;
        }
        Ok(ParameterSweep {
            parameters: self.parameters,
            result_key: NestedKey::parse(&self.result_key)?,
            ledger: EvaluationLedger::new(),
        })
    }
}
