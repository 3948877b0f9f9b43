//! Append-only record of every evaluation ever requested.
//!
//! The [`EvaluationLedger`] is the single source of truth for an engine's
//! evaluation history: each entry pairs the input an engine created with
//! the output the external executor eventually produced. Indices are
//! assigned in creation order, starting at 0, and are never reused — an
//! index therefore identifies one evaluation for the lifetime of a run,
//! across any number of suspensions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::ValueMap;

/// One evaluation record: the input it was created with, and its output
/// once the evaluation has completed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    input: ValueMap,
    output: Option<ValueMap>,
}

impl Evaluation {
    fn new(input: ValueMap) -> Self {
        Self {
            input,
            output: None,
        }
    }

    /// Returns the input this evaluation was created with.
    #[must_use]
    pub fn input(&self) -> &ValueMap {
        &self.input
    }

    /// Returns the recorded output, or `None` while the evaluation is
    /// still pending.
    #[must_use]
    pub fn output(&self) -> Option<&ValueMap> {
        self.output.as_ref()
    }
}

/// Maps evaluation indices to their inputs and outputs.
///
/// Indices grow monotonically: each [`add_inputs`](Self::add_inputs) call
/// assigns `max(existing) + 1` onward (0 on an empty ledger), so indices
/// stay stable even if entries were ever pruned externally. Iteration is
/// in ascending index order, which is the deterministic tie-break order
/// for best-result selection.
///
/// # Examples
///
/// ```
/// use optiloop::ledger::EvaluationLedger;
/// use optiloop::{Value, ValueMap};
///
/// let mut ledger = EvaluationLedger::new();
/// let mut input = ValueMap::new();
/// input.insert("x".to_string(), Value::Float(1.0));
///
/// let created = ledger.add_inputs(vec![input]);
/// assert_eq!(created.keys().copied().collect::<Vec<_>>(), vec![0]);
/// assert_eq!(ledger.len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationLedger {
    results: BTreeMap<u64, Evaluation>,
}

impl EvaluationLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a batch of inputs, assigning one fresh index per input in
    /// order. Returns the new indices mapped to the stored inputs.
    pub fn add_inputs(&mut self, inputs: Vec<ValueMap>) -> BTreeMap<u64, ValueMap> {
        let mut created = BTreeMap::new();
        let mut next = self.next_index();
        for input in inputs {
            created.insert(next, input.clone());
            self.results.insert(next, Evaluation::new(input));
            next += 1;
        }
        created
    }

    /// Records outputs for existing evaluations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownIndex`] if an index was never created and
    /// [`Error::OutputAlreadyRecorded`] if an output is set twice. Entries
    /// preceding the failing one are recorded; the engine treats either
    /// error as fatal, so partial application is never observed.
    pub fn add_outputs(&mut self, outputs: &BTreeMap<u64, ValueMap>) -> Result<()> {
        for (&index, output) in outputs {
            let entry = self
                .results
                .get_mut(&index)
                .ok_or(Error::UnknownIndex { index })?;
            if entry.output.is_some() {
                return Err(Error::OutputAlreadyRecorded { index });
            }
            entry.output = Some(output.clone());
        }
        Ok(())
    }

    /// Returns the evaluation at `index`.
    #[must_use]
    pub fn get(&self, index: u64) -> Option<&Evaluation> {
        self.results.get(&index)
    }

    /// Returns the number of evaluations ever created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` if no evaluation has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterates over `(index, evaluation)` pairs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Evaluation)> {
        self.results.iter().map(|(&k, v)| (k, v))
    }

    /// Iterates over completed evaluations in ascending index order.
    pub fn completed(&self) -> impl Iterator<Item = (u64, &ValueMap, &ValueMap)> {
        self.results
            .iter()
            .filter_map(|(&k, v)| v.output().map(|out| (k, v.input(), out)))
    }

    /// Returns `true` if every created evaluation has an output.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.results.values().all(|r| r.output.is_some())
    }

    /// The index the next created input will receive.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.results.keys().next_back().map_or(0, |last| last + 1)
    }
}
