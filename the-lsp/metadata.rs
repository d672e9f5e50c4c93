//! Editor-side metadata values attached to notebooks and cells.
//!
//! Values mirror what an editor keeps in memory: plain JSON-like data, nodes
//! shared by reference (which may alias or even form cycles) and pattern
//! objects. Only the JSON-like subset can be transferred to a server.

use std::{
  collections::BTreeMap,
  sync::Arc,
};

use parking_lot::RwLock;
use regex::Regex;
use serde_json::{
  Map,
  Number,
  Value,
};
use thiserror::Error;

pub type Metadata = BTreeMap<String, MetadataValue>;

#[derive(Debug, Clone)]
pub enum MetadataValue {
  Null,
  Bool(bool),
  Number(Number),
  String(String),
  Array(Vec<MetadataValue>),
  Object(Metadata),
  /// A node held by reference. Cloning the value clones the reference.
  Shared(Arc<RwLock<MetadataValue>>),
  Pattern(Regex),
}

impl MetadataValue {
  pub fn shared(value: MetadataValue) -> Self {
    Self::Shared(Arc::new(RwLock::new(value)))
  }
}

impl From<Value> for MetadataValue {
  fn from(value: Value) -> Self {
    match value {
      Value::Null => Self::Null,
      Value::Bool(value) => Self::Bool(value),
      Value::Number(value) => Self::Number(value),
      Value::String(value) => Self::String(value),
      Value::Array(values) => Self::Array(values.into_iter().map(Self::from).collect()),
      Value::Object(map) => {
        Self::Object(
          map
            .into_iter()
            .map(|(key, value)| (key, Self::from(value)))
            .collect(),
        )
      },
    }
  }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
  #[error("can't deep copy cyclic structures")]
  Cyclic,
  #[error("can't transfer {kind} values to the server")]
  UnsupportedValue { kind: &'static str },
}

/// Deep-copies `metadata` into a wire-safe JSON object.
pub fn to_lsp_object(metadata: &Metadata) -> Result<Map<String, Value>, MetadataError> {
  let mut path = Vec::new();
  copy_object(metadata, &mut path)
}

fn copy_object(
  metadata: &Metadata,
  path: &mut Vec<*const RwLock<MetadataValue>>,
) -> Result<Map<String, Value>, MetadataError> {
  let mut result = Map::new();
  for (key, value) in metadata {
    result.insert(key.clone(), copy_value(value, path)?);
  }
  Ok(result)
}

fn copy_value(
  value: &MetadataValue,
  path: &mut Vec<*const RwLock<MetadataValue>>,
) -> Result<Value, MetadataError> {
  match value {
    MetadataValue::Null => Ok(Value::Null),
    MetadataValue::Bool(value) => Ok(Value::Bool(*value)),
    MetadataValue::Number(value) => Ok(Value::Number(value.clone())),
    MetadataValue::String(value) => Ok(Value::String(value.clone())),
    MetadataValue::Array(values) => {
      values
        .iter()
        .map(|value| copy_value(value, path))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
    },
    MetadataValue::Object(map) => copy_object(map, path).map(Value::Object),
    MetadataValue::Shared(node) => {
      let ptr = Arc::as_ptr(node);
      // Only the current descent path counts: a node reachable twice through
      // siblings is aliasing, not a cycle.
      if path.contains(&ptr) {
        return Err(MetadataError::Cyclic);
      }
      path.push(ptr);
      let copied = copy_value(&node.read(), path);
      path.pop();
      copied
    },
    MetadataValue::Pattern(_) => {
      Err(MetadataError::UnsupportedValue {
        kind: "regular expression",
      })
    },
  }
}

/// Deep structural equality of two metadata mappings. Key order is irrelevant.
pub fn equals_metadata(one: &Metadata, other: &Metadata) -> bool {
  equals_object(one, other)
}

fn equals_object(one: &Metadata, other: &Metadata) -> bool {
  // BTreeMap keys iterate sorted, so pairwise comparison is order independent.
  one.len() == other.len()
    && one
      .iter()
      .zip(other.iter())
      .all(|((one_key, one_value), (other_key, other_value))| {
        one_key == other_key && equals_value(one_value, other_value)
      })
}

pub fn equals_value(one: &MetadataValue, other: &MetadataValue) -> bool {
  match (one, other) {
    (MetadataValue::Shared(one), MetadataValue::Shared(other)) if Arc::ptr_eq(one, other) => true,
    (MetadataValue::Shared(one), other) => equals_value(&one.read_recursive(), other),
    (one, MetadataValue::Shared(other)) => equals_value(one, &other.read_recursive()),
    (MetadataValue::Null, MetadataValue::Null) => true,
    (MetadataValue::Bool(one), MetadataValue::Bool(other)) => one == other,
    (MetadataValue::Number(one), MetadataValue::Number(other)) => one == other,
    (MetadataValue::String(one), MetadataValue::String(other)) => one == other,
    (MetadataValue::Array(one), MetadataValue::Array(other)) => {
      one.len() == other.len()
        && one
          .iter()
          .zip(other.iter())
          .all(|(one, other)| equals_value(one, other))
    },
    (MetadataValue::Object(one), MetadataValue::Object(other)) => equals_object(one, other),
    (MetadataValue::Pattern(one), MetadataValue::Pattern(other)) => one.as_str() == other.as_str(),
    _ => false,
  }
}
