//! Nested-key addressing for structured inputs and outputs.
//!
//! Engines work with flat maps whose keys may address locations inside a
//! larger structured namespace:
//!
//! - Namespace levels are separated by a period: `"a.b"` is leaf `b`
//!   inside namespace `a`.
//! - A single colon marks that the addressed leaf is itself a dictionary:
//!   in `"a.b:c.d"` the leaf `a.b` is a map, and `c.d` addresses a nested
//!   entry inside it.
//!
//! Keys are parsed into [`NestedKey`] once, up front, so malformed keys
//! fail before any evaluation is dispatched. [`merge_inputs`] writes
//! engine-generated values into a target namespace; [`extract_output`]
//! reads a single result back out of a structured output namespace.

use core::fmt;
use core::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::value::{Value, ValueMap};

/// A parsed and validated nested key.
///
/// # Examples
///
/// ```
/// use optiloop::key::NestedKey;
///
/// let key: NestedKey = "a.b:c.d".parse().unwrap();
/// assert_eq!(key.to_string(), "a.b:c.d");
///
/// assert!("a:b:c".parse::<NestedKey>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NestedKey {
    /// Namespace path down to the addressed leaf.
    port_path: Vec<String>,
    /// Path inside the leaf dictionary, when the key contains a colon.
    attr_path: Option<Vec<String>>,
}

impl NestedKey {
    /// Parses a key string against the nested-key grammar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if the string contains more than one
    /// colon, an empty path segment, or an empty half.
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidKey {
            key: key.to_string(),
            reason,
        };

        let mut halves = key.split(':');
        let port_part = halves.next().unwrap_or_default();
        let attr_part = halves.next();
        if halves.next().is_some() {
            return Err(invalid("at most one ':' is allowed"));
        }

        let split_path = |part: &str, reason| -> Result<Vec<String>> {
            let segments: Vec<String> = part.split('.').map(str::to_string).collect();
            if segments.iter().any(String::is_empty) {
                return Err(invalid(reason));
            }
            Ok(segments)
        };

        let port_path = split_path(port_part, "empty namespace segment")?;
        let attr_path = attr_part
            .map(|part| split_path(part, "empty dictionary segment"))
            .transpose()?;

        Ok(Self {
            port_path,
            attr_path,
        })
    }

    /// Returns the namespace path down to the addressed leaf.
    #[must_use]
    pub fn port_path(&self) -> &[String] {
        &self.port_path
    }

    /// Returns the path inside the leaf dictionary, if any.
    #[must_use]
    pub fn attr_path(&self) -> Option<&[String]> {
        self.attr_path.as_deref()
    }
}

impl FromStr for NestedKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for NestedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.port_path.join("."))?;
        if let Some(attr) = &self.attr_path {
            write!(f, ":{}", attr.join("."))?;
        }
        Ok(())
    }
}

// Serialized as the plain key string so persisted state stays readable;
// deserialization re-validates against the grammar.
impl Serialize for NestedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NestedKey {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> core::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

/// Walks (and creates) nested maps along `path`, returning the innermost map.
fn descend_mut<'a>(
    root: &'a mut ValueMap,
    path: &[String],
    full_key: &str,
) -> Result<&'a mut ValueMap> {
    let mut current = root;
    for segment in path {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Map(ValueMap::new()));
        current = match entry {
            Value::Map(map) => map,
            _ => {
                return Err(Error::TypeMismatch {
                    key: full_key.to_string(),
                    expected: "a namespace (map) along the key path",
                });
            }
        };
    }
    Ok(current)
}

/// Merges flat, nested-key-addressed inputs into a target namespace.
///
/// The target is not modified; a merged copy is returned. Keys without a
/// colon set the addressed leaf directly. Keys with a colon treat the leaf
/// as a dictionary: an existing dictionary at that location is extended,
/// a missing one is created, and anything else is a type error.
///
/// # Errors
///
/// Returns [`Error::InvalidKey`] for malformed keys and
/// [`Error::TypeMismatch`] when the key path runs into a non-map value.
///
/// # Examples
///
/// ```
/// use optiloop::key::merge_inputs;
/// use optiloop::{Value, ValueMap};
///
/// let mut flat = ValueMap::new();
/// flat.insert("a.b:c.d".to_string(), Value::Float(1.0));
///
/// let merged = merge_inputs(&flat, &ValueMap::new()).unwrap();
/// let a = merged["a"].as_map().unwrap();
/// let b = a["b"].as_map().unwrap();
/// let c = b["c"].as_map().unwrap();
/// assert_eq!(c["d"], Value::Float(1.0));
/// ```
pub fn merge_inputs(flat: &ValueMap, target: &ValueMap) -> Result<ValueMap> {
    let mut destination = target.clone();

    for (raw_key, value) in flat {
        let key = NestedKey::parse(raw_key)?;
        let (leaf, namespace_path) = key
            .port_path
            .split_last()
            .ok_or(Error::Internal("nested key with empty port path"))?;
        let namespace = descend_mut(&mut destination, namespace_path, raw_key)?;

        match key.attr_path() {
            None => {
                namespace.insert(leaf.clone(), value.clone());
            }
            Some(attr_path) => {
                let mut dict = match namespace.get(leaf) {
                    Some(Value::Map(existing)) => existing.clone(),
                    None => ValueMap::new(),
                    Some(_) => {
                        return Err(Error::TypeMismatch {
                            key: raw_key.clone(),
                            expected: "a dictionary at the ':' leaf",
                        });
                    }
                };
                let (attr_leaf, attr_dirs) = attr_path
                    .split_last()
                    .ok_or(Error::Internal("nested key with empty attribute path"))?;
                let sub_dict = descend_mut(&mut dict, attr_dirs, raw_key)?;
                sub_dict.insert(attr_leaf.clone(), value.clone());
                namespace.insert(leaf.clone(), Value::Map(dict));
            }
        }
    }

    Ok(destination)
}

/// Extracts a single value from a structured output namespace.
///
/// # Errors
///
/// Returns [`Error::MissingKey`] if any path segment is absent and
/// [`Error::TypeMismatch`] if an intermediate value is not a map.
pub fn extract_output(outputs: &ValueMap, key: &NestedKey) -> Result<Value> {
    let full_key = key.to_string();
    let missing = || Error::MissingKey {
        key: full_key.clone(),
    };
    let not_a_map = || Error::TypeMismatch {
        key: full_key.clone(),
        expected: "a namespace (map) along the key path",
    };

    let mut current = outputs;
    let (leaf, namespace_path) = key
        .port_path
        .split_last()
        .ok_or(Error::Internal("nested key with empty port path"))?;
    for segment in namespace_path {
        current = current
            .get(segment)
            .ok_or_else(missing)?
            .as_map()
            .ok_or_else(not_a_map)?;
    }
    let mut value = current.get(leaf).ok_or_else(missing)?;

    if let Some(attr_path) = key.attr_path() {
        for segment in attr_path {
            value = value
                .as_map()
                .ok_or_else(not_a_map)?
                .get(segment)
                .ok_or_else(missing)?;
        }
    }

    Ok(value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Value)]) -> ValueMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_parse_plain_key() {
        let key = NestedKey::parse("x").unwrap();
        assert_eq!(key.port_path(), ["x".to_string()]);
        assert!(key.attr_path().is_none());
    }

    #[test]
    fn test_parse_namespaced_key() {
        let key = NestedKey::parse("a.b.c").unwrap();
        assert_eq!(key.port_path().len(), 3);
        assert!(key.attr_path().is_none());
    }

    #[test]
    fn test_parse_dict_key() {
        let key = NestedKey::parse("a.b:c.d").unwrap();
        assert_eq!(key.port_path(), ["a".to_string(), "b".to_string()]);
        assert_eq!(
            key.attr_path().unwrap(),
            ["c".to_string(), "d".to_string()]
        );
    }

    #[test]
    fn test_parse_rejects_double_colon() {
        assert!(matches!(
            NestedKey::parse("a:b:c"),
            Err(Error::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        for bad in ["", ".", "a..b", "a:", "a:b..c", ":b"] {
            assert!(
                matches!(NestedKey::parse(bad), Err(Error::InvalidKey { .. })),
                "'{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn test_display_round_trip() {
        for key in ["x", "a.b", "a.b:c", "a.b:c.d"] {
            assert_eq!(NestedKey::parse(key).unwrap().to_string(), key);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let key = NestedKey::parse("a.b:c").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"a.b:c\"");
        let back: NestedKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);

        assert!(serde_json::from_str::<NestedKey>("\"a:b:c\"").is_err());
    }

    #[test]
    fn test_merge_plain_key() {
        let flat = map(&[("x", Value::Float(1.0))]);
        let merged = merge_inputs(&flat, &ValueMap::new()).unwrap();
        assert_eq!(merged["x"], Value::Float(1.0));
    }

    #[test]
    fn test_merge_creates_namespaces() {
        let flat = map(&[("a.b.c", Value::Float(2.0))]);
        let merged = merge_inputs(&flat, &ValueMap::new()).unwrap();
        let a = merged["a"].as_map().unwrap();
        let b = a["b"].as_map().unwrap();
        assert_eq!(b["c"], Value::Float(2.0));
    }

    #[test]
    fn test_merge_keeps_target_entries() {
        let flat = map(&[("a.b", Value::Float(1.0))]);
        let target = map(&[("other", Value::Int(7))]);
        let merged = merge_inputs(&flat, &target).unwrap();
        assert_eq!(merged["other"], Value::Int(7));
        assert!(merged.contains_key("a"));
    }

    #[test]
    fn test_merge_extends_existing_dict() {
        let flat = map(&[("a:b", Value::Float(1.0))]);
        let target = map(&[("a", Value::Map(map(&[("keep", Value::Int(1))])))]);
        let merged = merge_inputs(&flat, &target).unwrap();
        let a = merged["a"].as_map().unwrap();
        assert_eq!(a["keep"], Value::Int(1));
        assert_eq!(a["b"], Value::Float(1.0));
    }

    #[test]
    fn test_merge_rejects_non_map_on_path() {
        let flat = map(&[("a.b", Value::Float(1.0))]);
        let target = map(&[("a", Value::Float(0.0))]);
        assert!(matches!(
            merge_inputs(&flat, &target),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_merge_rejects_non_dict_colon_leaf() {
        let flat = map(&[("a:b", Value::Float(1.0))]);
        let target = map(&[("a", Value::Float(0.0))]);
        assert!(matches!(
            merge_inputs(&flat, &target),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_extract_plain_and_namespaced() {
        let outputs = map(&[(
            "a",
            Value::Map(map(&[("b", Value::Float(3.0))])),
        )]);
        let key = NestedKey::parse("a.b").unwrap();
        assert_eq!(extract_output(&outputs, &key).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_extract_through_dict() {
        let dict = Value::Map(map(&[("c", Value::Map(map(&[("d", Value::Float(4.0))])))]));
        let outputs = map(&[("a", Value::Map(map(&[("b", dict)])))]);
        let key = NestedKey::parse("a.b:c.d").unwrap();
        assert_eq!(extract_output(&outputs, &key).unwrap(), Value::Float(4.0));
    }

    #[test]
    fn test_extract_missing_key() {
        let outputs = map(&[("a", Value::Float(1.0))]);
        let key = NestedKey::parse("b").unwrap();
        assert!(matches!(
            extract_output(&outputs, &key),
            Err(Error::MissingKey { .. })
        ));
    }

    #[test]
    fn test_extract_type_mismatch() {
        let outputs = map(&[("a", Value::Float(1.0))]);
        let key = NestedKey::parse("a:b").unwrap();
        assert!(matches!(
            extract_output(&outputs, &key),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_merge_then_extract_round_trip() {
        let flat = map(&[("x.y:a.b", Value::Float(9.0))]);
        let merged = merge_inputs(&flat, &ValueMap::new()).unwrap();
        let key = NestedKey::parse("x.y:a.b").unwrap();
        assert_eq!(extract_output(&merged, &key).unwrap(), Value::Float(9.0));
    }
}
