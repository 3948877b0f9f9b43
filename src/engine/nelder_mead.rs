//! Nelder–Mead downhill-simplex descent.
//!
//! The classic algorithm evaluates one trial point at a time (reflect,
//! then possibly expand, contract, or shrink), but here every evaluation
//! goes through an external executor that may take arbitrarily long.
//! Each simplex operation is therefore split into a *submit* half that
//! computes trial points and an *update* half that consumes their
//! results, with a pair of serializable program-counter fields
//! (`next_submit` / `next_update`) naming which half runs next. Restoring
//! a snapshot restores the exact sub-step, so the descent can be
//! suspended between any two protocol calls.
//!
//! Step graph:
//!
//! ```text
//! initialize → new_iter → choose_step → { expansion | contraction |
//!     inside_contraction | shrink | (accept reflection) } → new_iter
//!     → … → finalize
//! ```

use core::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EngineSnapshot, OptimalResult, OptimizationEngine, min_scored_output};
use crate::error::{Error, Result};
use crate::key::{NestedKey, extract_output};
use crate::ledger::EvaluationLedger;
use crate::value::{Value, ValueMap};

const RHO: f64 = 1.0;
const CHI: f64 = 2.0;
const PSI: f64 = 0.5;
const SIGMA: f64 = 0.5;

/// Which submit half runs on the next `create_inputs` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SubmitStep {
    Initialize,
    NewIter,
    Expansion,
    Contraction,
    InsideContraction,
    Shrink,
}

/// Which update half runs on the next `update` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum UpdateStep {
    Initialize,
    ChooseStep,
    Expansion,
    Contraction,
    InsideContraction,
    Shrink,
    Finalize,
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Component-wise `ca * a + cb * b`.
fn affine(ca: f64, a: &[f64], cb: f64, b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| ca * x + cb * y).collect()
}

/// Nelder–Mead optimization engine.
///
/// Minimizes the result value starting from an explicit initial simplex
/// of N+1 points in N dimensions.
///
/// # Examples
///
/// ```
/// use optiloop::engine::{NelderMead, OptimizationEngine};
///
/// let mut engine = NelderMead::builder(vec![vec![0.0], vec![1.0]])
///     .xtol(1e-1)
///     .ftol(1e-1)
///     .build()
///     .unwrap();
///
/// // The first batch evaluates every simplex vertex.
/// let batch = engine.create_inputs().unwrap();
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NelderMead {
    simplex: Vec<Vec<f64>>,
    /// Function values at the simplex vertices; `None` until the
    /// initialization batch has been evaluated.
    fun_simplex: Option<Vec<f64>>,
    /// Input-distance tolerance; `None` means unbounded.
    xtol: Option<f64>,
    /// Function-value tolerance; `None` means unbounded.
    ftol: Option<f64>,
    max_iter: u32,
    num_iter: u32,
    /// The reflection point and its value, carried from `choose_step`
    /// into the expansion/contraction updates.
    reflection: Option<(Vec<f64>, f64)>,
    input_key: String,
    result_key: NestedKey,
    next_submit: Option<SubmitStep>,
    next_update: Option<UpdateStep>,
    finished: bool,
    exceeded_max_iters: bool,
    ledger: EvaluationLedger,
}

impl NelderMead {
    /// Creates a builder from the initial simplex (N+1 points of
    /// dimension N).
    ///
    /// Defaults: `xtol = 1e-4`, `ftol = 1e-4`, `max_iter = 1000`,
    /// `input_key = "x"`, `result_key = "result"`.
    #[must_use]
    pub fn builder(simplex: Vec<Vec<f64>>) -> NelderMeadBuilder {
        NelderMeadBuilder {
            simplex,
            xtol: Some(1e-4),
            ftol: Some(1e-4),
            max_iter: 1000,
            input_key: "x".to_string(),
            result_key: "result".to_string(),
        }
    }

    fn point_input(&self, x: &[f64]) -> ValueMap {
        let mut map = ValueMap::new();
        map.insert(self.input_key.clone(), Value::point(x));
        map
    }

    fn fun_simplex(&self) -> Result<&[f64]> {
        self.fun_simplex
            .as_deref()
            .ok_or(Error::Internal("simplex values not yet evaluated"))
    }

    /// Centroid of all vertices except the worst (last) one.
    fn xbar(&self) -> Vec<f64> {
        let points = &self.simplex[..self.simplex.len() - 1];
        #[allow(clippy::cast_precision_loss)]
        let count = points.len() as f64;
        let dim = points[0].len();
        (0..dim)
            .map(|i| points.iter().map(|p| p[i]).sum::<f64>() / count)
            .collect()
    }

    fn worst(&self) -> &[f64] {
        &self.simplex[self.simplex.len() - 1]
    }

    fn replace_worst(&mut self, x: Vec<f64>, f: f64) -> Result<()> {
        let last = self.simplex.len() - 1;
        self.simplex[last] = x;
        self.fun_simplex
            .as_mut()
            .ok_or(Error::Internal("simplex values not yet evaluated"))?[last] = f;
        Ok(())
    }

    /// Sorts vertices by ascending function value.
    fn sort_simplex(&mut self) -> Result<()> {
        let fun = self
            .fun_simplex
            .take()
            .ok_or(Error::Internal("simplex values not yet evaluated"))?;
        let mut order: Vec<usize> = (0..fun.len()).collect();
        order.sort_by(|&a, &b| fun[a].partial_cmp(&fun[b]).unwrap_or(Ordering::Equal));
        self.simplex = order.iter().map(|&i| self.simplex[i].clone()).collect();
        self.fun_simplex = Some(order.iter().map(|&i| fun[i]).collect());
        Ok(())
    }

    /// Updates the `finished` flag from the convergence criteria and the
    /// iteration budget. Assumes the simplex is sorted.
    fn check_finished(&mut self) -> Result<()> {
        let fun = self.fun_simplex()?;
        let best = &self.simplex[0];
        let x_dist_max = self.simplex[1..]
            .iter()
            .map(|x| norm(&affine(1.0, x, -1.0, best)))
            .fold(0.0_f64, f64::max);
        let f_diff_max = fun[1..]
            .iter()
            .map(|f| (f - fun[0]).abs())
            .fold(0.0_f64, f64::max);
        trace_debug!(x_dist_max, f_diff_max, "simplex spread");

        self.finished = x_dist_max < self.xtol.unwrap_or(f64::INFINITY)
            && f_diff_max < self.ftol.unwrap_or(f64::INFINITY);
        if !self.finished && self.num_iter >= self.max_iter {
            trace_info!(num_iter = self.num_iter, "iteration budget exceeded, stopping");
            self.exceeded_max_iters = true;
            self.finished = true;
        }
        Ok(())
    }

    fn submit_initialize(&mut self) -> Vec<ValueMap> {
        trace_info!("submitting initialization step");
        self.next_update = Some(UpdateStep::Initialize);
        self.simplex.iter().map(|x| self.point_input(x)).collect()
    }

    fn new_iter(&mut self) -> Result<Vec<ValueMap>> {
        self.sort_simplex()?;
        self.check_finished()?;
        if self.finished {
            self.next_update = Some(UpdateStep::Finalize);
            return Ok(vec![]);
        }
        self.num_iter += 1;
        trace_info!(num_iter = self.num_iter, max_iter = self.max_iter, "starting iteration");
        let xr = affine(1.0 + RHO, &self.xbar(), -RHO, self.worst());
        self.next_update = Some(UpdateStep::ChooseStep);
        Ok(vec![self.point_input(&xr)])
    }

    fn submit_expansion(&mut self) -> Vec<ValueMap> {
        trace_info!("submitting expansion step");
        let xe = affine(1.0 + RHO * CHI, &self.xbar(), -RHO * CHI, self.worst());
        self.next_update = Some(UpdateStep::Expansion);
        vec![self.point_input(&xe)]
    }

    fn submit_contraction(&mut self) -> Vec<ValueMap> {
        trace_info!("submitting contraction step");
        let xc = affine(1.0 + PSI * RHO, &self.xbar(), -PSI * RHO, self.worst());
        self.next_update = Some(UpdateStep::Contraction);
        vec![self.point_input(&xc)]
    }

    fn submit_inside_contraction(&mut self) -> Vec<ValueMap> {
        trace_info!("submitting inside contraction step");
        let xcc = affine(1.0 - PSI, &self.xbar(), PSI, self.worst());
        self.next_update = Some(UpdateStep::InsideContraction);
        vec![self.point_input(&xcc)]
    }

    fn submit_shrink(&mut self) -> Vec<ValueMap> {
        trace_info!("submitting shrink step");
        let best = self.simplex[0].clone();
        for point in &mut self.simplex[1..] {
            let shrunk = affine(1.0 - SIGMA, &best, SIGMA, point);
            *point = shrunk;
        }
        // The shrunk vertices' stale function values are overwritten
        // wholesale in the shrink update before anything reads them.
        self.next_update = Some(UpdateStep::Shrink);
        self.simplex[1..]
            .iter()
            .map(|x| self.point_input(x))
            .collect()
    }

    /// Reads back the single trial point of this step: the input from the
    /// ledger, the function value from the outputs.
    fn single_result(&self, outputs: &BTreeMap<u64, ValueMap>) -> Result<(Vec<f64>, f64)> {
        if outputs.len() != 1 {
            return Err(Error::BatchSizeMismatch {
                expected: 1,
                got: outputs.len(),
            });
        }
        let (&index, output) = outputs.iter().next().ok_or(Error::Internal("empty batch"))?;
        let x = self
            .ledger
            .get(index)
            .ok_or(Error::UnknownIndex { index })?
            .input()
            .get(&self.input_key)
            .ok_or(Error::Internal("trial point lost its input"))?
            .expect_point(&self.input_key)?;
        let f = extract_output(output, &self.result_key)?
            .expect_float(&self.result_key.to_string())?;
        Ok((x, f))
    }

    fn batch_values(&self, outputs: &BTreeMap<u64, ValueMap>, expected: usize) -> Result<Vec<f64>> {
        if outputs.len() != expected {
            return Err(Error::BatchSizeMismatch {
                expected,
                got: outputs.len(),
            });
        }
        super::sorted_result_values(outputs, &self.result_key)
    }

    fn update_initialize(&mut self, outputs: &BTreeMap<u64, ValueMap>) -> Result<()> {
        self.fun_simplex = Some(self.batch_values(outputs, self.simplex.len())?);
        self.next_submit = Some(SubmitStep::NewIter);
        Ok(())
    }

    fn choose_step(&mut self, outputs: &BTreeMap<u64, ValueMap>) -> Result<()> {
        let (xr, fxr) = self.single_result(outputs)?;
        let fun = self.fun_simplex()?;
        let (f_best, f_second_worst, f_worst) =
            (fun[0], fun[fun.len() - 2], fun[fun.len() - 1]);
        self.reflection = Some((xr.clone(), fxr));

        if fxr < f_best {
            self.next_submit = Some(SubmitStep::Expansion);
        } else if fxr < f_second_worst {
            self.replace_worst(xr, fxr)?;
            self.next_submit = Some(SubmitStep::NewIter);
        } else if fxr < f_worst {
            self.next_submit = Some(SubmitStep::Contraction);
        } else {
            self.next_submit = Some(SubmitStep::InsideContraction);
        }
        Ok(())
    }

    fn reflection_point(&self) -> Result<(Vec<f64>, f64)> {
        self.reflection
            .clone()
            .ok_or(Error::Internal("no reflection point recorded"))
    }

    fn update_expansion(&mut self, outputs: &BTreeMap<u64, ValueMap>) -> Result<()> {
        let (xe, fxe) = self.single_result(outputs)?;
        let (xr, fxr) = self.reflection_point()?;
        if fxe < fxr {
            self.replace_worst(xe, fxe)?;
        } else {
            self.replace_worst(xr, fxr)?;
        }
        self.next_submit = Some(SubmitStep::NewIter);
        Ok(())
    }

    fn update_contraction(&mut self, outputs: &BTreeMap<u64, ValueMap>) -> Result<()> {
        let (xc, fxc) = self.single_result(outputs)?;
        let (_, fxr) = self.reflection_point()?;
        if fxc < fxr {
            self.replace_worst(xc, fxc)?;
            self.next_submit = Some(SubmitStep::NewIter);
        } else {
            self.next_submit = Some(SubmitStep::Shrink);
        }
        Ok(())
    }

    fn update_inside_contraction(&mut self, outputs: &BTreeMap<u64, ValueMap>) -> Result<()> {
        let (xcc, fxcc) = self.single_result(outputs)?;
        let f_worst = *self
            .fun_simplex()?
            .last()
            .ok_or(Error::Internal("empty simplex"))?;
        if fxcc < f_worst {
            self.replace_worst(xcc, fxcc)?;
            self.next_submit = Some(SubmitStep::NewIter);
        } else {
            self.next_submit = Some(SubmitStep::Shrink);
        }
        Ok(())
    }

    fn update_shrink(&mut self, outputs: &BTreeMap<u64, ValueMap>) -> Result<()> {
        let values = self.batch_values(outputs, self.simplex.len() - 1)?;
        let fun = self
            .fun_simplex
            .as_mut()
            .ok_or(Error::Internal("simplex values not yet evaluated"))?;
        fun[1..].copy_from_slice(&values);
        self.next_submit = Some(SubmitStep::NewIter);
        Ok(())
    }
}

impl OptimizationEngine for NelderMead {
    fn is_finished(&self) -> bool {
        self.finished
    }

    fn is_finished_ok(&self) -> bool {
        self.finished && !self.exceeded_max_iters
    }

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
            SubmitStep::Expansion => self.submit_expansion(),
            SubmitStep::Contraction => self.submit_contraction(),
            SubmitStep::InsideContraction => self.submit_inside_contraction(),
            SubmitStep::Shrink => self.submit_shrink(),
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
            UpdateStep::Initialize => self.update_initialize(&outputs),
            UpdateStep::ChooseStep => self.choose_step(&outputs),
            UpdateStep::Expansion => self.update_expansion(&outputs),
            UpdateStep::Contraction => self.update_contraction(&outputs),
            UpdateStep::InsideContraction => self.update_inside_contraction(&outputs),
            UpdateStep::Shrink => self.update_shrink(&outputs),
            UpdateStep::Finalize => Ok(()),
        }
    }

    fn optimal_result(&self) -> Result<OptimalResult> {
        // Best-ever over the whole ledger: shrink steps discard vertices
        // whose evaluations may still be the global best.
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
            "last_simplex".to_string(),
            Value::List(self.simplex.iter().map(|x| Value::point(x)).collect()),
        );
        outputs
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot::NelderMead(self.clone())
    }
}

/// Builder for a [`NelderMead`] engine.
#[derive(Clone, Debug)]
pub struct NelderMeadBuilder {
    simplex: Vec<Vec<f64>>,
    xtol: Option<f64>,
    ftol: Option<f64>,
    max_iter: u32,
    input_key: String,
    result_key: String,
}

impl NelderMeadBuilder {
    /// Sets the tolerance on the simplex spread in input space.
    /// Pass `None` for unbounded. Default: `1e-4`.
    #[must_use]
    pub fn xtol(mut self, tol: impl Into<Option<f64>>) -> Self {
        self.xtol = tol.into();
        self
    }

    /// Sets the tolerance on the function-value spread.
    /// Pass `None` for unbounded. Default: `1e-4`.
    #[must_use]
    pub fn ftol(mut self, tol: impl Into<Option<f64>>) -> Self {
        self.ftol = tol.into();
        self
    }

    /// Sets the maximum number of iterations. Default: 1000.
    ///
    /// Exceeding the budget finishes the engine with an error condition.
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

    /// Builds the configured [`NelderMead`] engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSimplex`] unless the simplex has N+1 points
    /// of equal dimension N, [`Error::InvalidTolerance`] for non-positive
    /// tolerances, and [`Error::InvalidKey`] for malformed keys.
    pub fn build(self) -> Result<NelderMead> {
        let rows = self.simplex.len();
        let cols = self.simplex.first().map_or(0, Vec::len);
        if cols == 0 || rows != cols + 1 || self.simplex.iter().any(|p| p.len() != cols) {
            return Err(Error::InvalidSimplex { rows, cols });
        }
        for tol in [self.xtol, self.ftol].into_iter().flatten() {
            if !(tol > 0.0) {
                return Err(Error::InvalidTolerance { tol });
            }
        }
        NestedKey::parse(&self.input_key)?;
        Ok(NelderMead {
            simplex: self.simplex,
            fun_simplex: None,
            xtol: self.xtol,
            ftol: self.ftol,
            max_iter: self.max_iter,
            num_iter: 0,
            reflection: None,
            input_key: self.input_key,
            result_key: NestedKey::parse(&self.result_key)?,
            next_submit: Some(SubmitStep::Initialize),
            next_update: None,
            finished: false,
            exceeded_max_iters: false,
            ledger: EvaluationLedger::new(),
        })
    }
}
