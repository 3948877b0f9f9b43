//! Structured values exchanged with evaluation tasks.
//!
//! Engines produce named inputs and consume named outputs. Both sides are
//! trees of [`Value`]: scalars at the leaves, lists for vector-valued
//! points, and string-keyed maps for namespaces. The tree shape is what
//! allows nested-key addressing (see [`key`](crate::key)) to merge
//! engine-generated inputs into a larger input namespace, and to pull a
//! single result out of a structured output namespace.
//!
//! All variants serialize exactly and compare exactly, so a `Value` can be
//! embedded in persisted engine state without loss.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A map from labels to values, used for both task inputs and outputs.
///
/// `BTreeMap` keeps iteration in label order, which makes serialized
/// snapshots and debug output deterministic.
pub type ValueMap = BTreeMap<String, Value>;

/// A structured input or output value.
///
/// # Examples
///
/// ```
/// use optiloop::Value;
///
/// let x = Value::from(1.5);
/// assert_eq!(x.as_float(), Some(1.5));
///
/// let point = Value::point(&[1.0, 2.0]);
/// assert_eq!(point.as_point().unwrap(), vec![1.0, 2.0]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A floating-point scalar.
    Float(f64),
    /// An integer scalar.
    Int(i64),
    /// A boolean flag.
    Bool(bool),
    /// A string.
    Str(String),
    /// An ordered list of values (e.g. a point in N dimensions).
    List(Vec<Value>),
    /// A named mapping of values (a namespace or dictionary).
    Map(ValueMap),
}

impl Value {
    /// Builds a [`Value::List`] of floats from a coordinate slice.
    #[must_use]
    pub fn point(coords: &[f64]) -> Self {
        Value::List(coords.iter().copied().map(Value::Float).collect())
    }

    /// Returns the value as a float.
    ///
    /// Integers are widened to floats so that an evaluation returning
    /// `Int(3)` can feed an engine that works on floats.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the value as an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as a list slice.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as a map reference.
    #[must_use]
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a list of numeric values as a coordinate vector.
    ///
    /// Fails (returns `None`) if the value is not a list or any entry is
    /// not numeric.
    #[must_use]
    pub fn as_point(&self) -> Option<Vec<f64>> {
        match self {
            Value::List(items) => items.iter().map(Value::as_float).collect(),
            _ => None,
        }
    }

    /// Returns the value as a float, with a labelled error on mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the value is not numeric.
    pub fn expect_float(&self, key: &str) -> Result<f64> {
        self.as_float().ok_or_else(|| Error::TypeMismatch {
            key: key.to_string(),
            expected: "a numeric value",
        })
    }

    /// Returns the value as a coordinate vector, with a labelled error on
    /// mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the value is not a numeric list.
    pub fn expect_point(&self, key: &str) -> Result<Vec<f64>> {
        self.as_point().ok_or_else(|| Error::TypeMismatch {
            key: key.to_string(),
            expected: "a list of numeric values",
        })
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::point(&v)
    }
}

/// Euclidean distance between two values of the same shape.
///
/// Scalars use `|a - b|`; numeric lists use the 2-norm of the
/// component-wise difference.
///
/// # Errors
///
/// Returns [`Error::TypeMismatch`] if the values are not both numeric
/// scalars or both numeric lists, or [`Error::BatchSizeMismatch`] if two
/// lists have different lengths.
pub fn distance(a: &Value, b: &Value) -> Result<f64> {
    if let (Some(fa), Some(fb)) = (a.as_float(), b.as_float()) {
        return Ok((fa - fb).abs());
    }
    if let (Some(pa), Some(pb)) = (a.as_point(), b.as_point()) {
        if pa.len() != pb.len() {
            return Err(Error::BatchSizeMismatch {
                expected: pa.len(),
                got: pb.len(),
            });
        }
        let sq_sum: f64 = pa.iter().zip(&pb).map(|(x, y)| (x - y).powi(2)).sum();
        return Ok(sq_sum.sqrt());
    }
    Err(Error::TypeMismatch {
        key: String::new(),
        expected: "two numeric scalars or two numeric lists",
    })
}
