//! Dotted-path access over nested JSON containers.
//!
//! Paths are dot-separated (`"tx.0"`, `"details.*.amount"`). Object members
//! are addressed by key and array elements by index. A `*` segment expands
//! into every child of the current node; the leaves reached by the rest of
//! the path are collected in traversal order. One collected leaf is returned
//! as-is, several are returned as an array.
//!
//! `None` as a path selects the whole container.

use rand::seq::index;
use rand::Rng;
use serde_json::{Map, Value};

/// Contract violations of the path accessor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("{method}() must be called on an array or object")]
    NotAContainer { method: &'static str },

    #[error("cannot modify a read-only response")]
    ReadOnly,
}

// ==============================================================================
// Traversal
// ==============================================================================

enum Resolved<'a> {
    Missing,
    Leaf(&'a Value),
    Expanded(Vec<&'a Value>),
}

fn segments(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('.');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('.').collect()
    }
}

fn child<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn children(node: &Value) -> Option<Vec<&Value>> {
    match node {
        Value::Object(map) => Some(map.values().collect()),
        Value::Array(items) => Some(items.iter().collect()),
        _ => None,
    }
}

fn resolve<'a>(node: &'a Value, segments: &[&str]) -> Resolved<'a> {
    let Some((head, rest)) = segments.split_first() else {
        return Resolved::Leaf(node);
    };

    if *head == "*" {
        let Some(items) = children(node) else {
            return Resolved::Missing;
        };
        let mut leaves = Vec::new();
        for item in items {
            match resolve(item, rest) {
                Resolved::Missing => {}
                Resolved::Leaf(value) => leaves.push(value),
                Resolved::Expanded(values) => leaves.extend(values),
            }
        }
        return Resolved::Expanded(leaves);
    }

    match child(node, head) {
        Some(next) => resolve(next, rest),
        None => Resolved::Missing,
    }
}

// Every branch opened by a wildcard must satisfy the check, and a wildcard
// over an empty container does not.
fn probe(node: &Value, segments: &[&str], require_non_null: bool) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return !require_non_null || !node.is_null();
    };

    if *head == "*" {
        return match children(node) {
            Some(items) if !items.is_empty() => items
                .into_iter()
                .all(|item| probe(item, rest, require_non_null)),
            _ => false,
        };
    }

    child(node, head).is_some_and(|next| probe(next, rest, require_non_null))
}

/// Borrow the node at a plain path. `*` is treated as a literal key here.
pub fn lookup<'a>(container: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path)
        .into_iter()
        .try_fold(container, |node, segment| child(node, segment))
}

/// Value at `path`, or `Value::Null` when any segment is missing.
pub fn get(container: &Value, path: Option<&str>) -> Value {
    let Some(path) = path else {
        return container.clone();
    };

    match resolve(container, &segments(path)) {
        Resolved::Missing => Value::Null,
        Resolved::Leaf(value) => value.clone(),
        Resolved::Expanded(mut leaves) if leaves.len() == 1 => {
            leaves.pop().cloned().unwrap_or(Value::Null)
        }
        Resolved::Expanded(leaves) => Value::Array(leaves.into_iter().cloned().collect()),
    }
}

/// True if the terminal value exists and is not null.
pub fn has(container: &Value, path: Option<&str>) -> bool {
    match path {
        None => !container.is_null(),
        Some(path) => probe(container, &segments(path), true),
    }
}

/// True if the terminal key exists, even when its value is null.
pub fn exists(container: &Value, path: Option<&str>) -> bool {
    match path {
        None => true,
        Some(path) => probe(container, &segments(path), false),
    }
}

// ==============================================================================
// Container Queries
// ==============================================================================

/// Number of children at `path`.
///
/// Without a path the root is counted leniently: null counts as zero and a
/// scalar as one. With a path the selected node must be a container.
pub fn count(container: &Value, path: Option<&str>) -> Result<usize, PathError> {
    if path.is_none() {
        return Ok(match container {
            Value::Object(map) => map.len(),
            Value::Array(items) => items.len(),
            Value::Null => 0,
            _ => 1,
        });
    }

    match get(container, path) {
        Value::Object(map) => Ok(map.len()),
        Value::Array(items) => Ok(items.len()),
        _ => Err(PathError::NotAContainer { method: "count" }),
    }
}

pub fn keys(container: &Value, path: Option<&str>) -> Result<Vec<Value>, PathError> {
    match get(container, path) {
        Value::Object(map) => Ok(map.keys().cloned().map(Value::String).collect()),
        Value::Array(items) => Ok((0..items.len()).map(Value::from).collect()),
        _ => Err(PathError::NotAContainer { method: "keys" }),
    }
}

pub fn values(container: &Value, path: Option<&str>) -> Result<Vec<Value>, PathError> {
    match get(container, path) {
        Value::Object(map) => Ok(map.into_iter().map(|(_, value)| value).collect()),
        Value::Array(items) => Ok(items),
        _ => Err(PathError::NotAContainer { method: "values" }),
    }
}

/// Whether the container at `path` holds `needle` as a direct child.
/// Numbers compare by value, so `1` matches `1.0`.
pub fn contains(container: &Value, needle: &Value, path: Option<&str>) -> Result<bool, PathError> {
    let items = match get(container, path) {
        Value::Object(map) => map.into_iter().map(|(_, value)| value).collect(),
        Value::Array(items) => items,
        _ => return Err(PathError::NotAContainer { method: "contains" }),
    };
    Ok(items.iter().any(|item| loosely_equal(item, needle)))
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// First child of the selected container, or the selected value itself.
pub fn first(container: &Value, path: Option<&str>) -> Value {
    match get(container, path) {
        Value::Object(map) => map.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null),
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        other => other,
    }
}

/// Last child of the selected container, or the selected value itself.
pub fn last(container: &Value, path: Option<&str>) -> Value {
    match get(container, path) {
        Value::Object(map) => map.into_iter().last().map(|(_, v)| v).unwrap_or(Value::Null),
        Value::Array(items) => items.into_iter().last().unwrap_or(Value::Null),
        other => other,
    }
}

/// All leaves below `path`, depth first. Null selects nothing.
pub fn flatten(container: &Value, path: Option<&str>) -> Vec<Value> {
    let mut leaves = Vec::new();
    match get(container, path) {
        Value::Null => {}
        selected => collect_leaves(selected, &mut leaves),
    }
    leaves
}

fn collect_leaves(node: Value, out: &mut Vec<Value>) {
    match node {
        Value::Object(map) => {
            for (_, value) in map {
                collect_leaves(value, out);
            }
        }
        Value::Array(items) => {
            for value in items {
                collect_leaves(value, out);
            }
        }
        leaf => out.push(leaf),
    }
}

/// Sum of the numeric leaves below `path`. Numeric strings are included,
/// everything else counts as zero.
pub fn sum(container: &Value, path: Option<&str>) -> f64 {
    flatten(container, path).iter().filter_map(numeric).sum()
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(true) => Some(1.0),
        _ => None,
    }
}

/// Up to `number` distinct children of the selected container, sampled
/// without replacement and kept in container order. A single pick is returned unwrapped and an empty
/// pick as null; scalars are returned as they are.
pub fn random(container: &Value, number: usize, path: Option<&str>) -> Value {
    random_with(&mut rand::thread_rng(), container, number, path)
}

pub fn random_with<R: Rng + ?Sized>(
    rng: &mut R,
    container: &Value,
    number: usize,
    path: Option<&str>,
) -> Value {
    match get(container, path) {
        Value::Array(items) => {
            let mut picked: Vec<Value> = sample_sorted(rng, items.len(), number)
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            match picked.len() {
                0 => Value::Null,
                1 => picked.pop().unwrap_or(Value::Null),
                _ => Value::Array(picked),
            }
        }
        Value::Object(map) => {
            let entries: Vec<(String, Value)> = map.into_iter().collect();
            let mut picked: Map<String, Value> = sample_sorted(rng, entries.len(), number)
                .into_iter()
                .map(|i| entries[i].clone())
                .collect();
            match picked.len() {
                0 => Value::Null,
                1 => {
                    let key = picked.keys().next().cloned().unwrap_or_default();
                    picked.remove(&key).unwrap_or(Value::Null)
                }
                _ => Value::Object(picked),
            }
        }
        other => other,
    }
}

// Picked positions are returned in container order.
fn sample_sorted<R: Rng + ?Sized>(rng: &mut R, len: usize, number: usize) -> Vec<usize> {
    let mut picked = index::sample(rng, len, number.min(len)).into_vec();
    picked.sort_unstable();
    picked
}

// ==============================================================================
// Writer
// ==============================================================================

fn array_index(node: &Value, segment: &str) -> Option<usize> {
    match node {
        Value::Array(items) => segment.parse::<usize>().ok().filter(|i| *i < items.len()),
        _ => None,
    }
}

// Non-container nodes on the way are replaced by objects.
fn descend<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = array_index(node, segment);
    if index.is_none() && !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match (node, index) {
        (Value::Array(items), Some(i)) => &mut items[i],
        (Value::Object(map), _) => map.entry(segment.to_owned()).or_insert(Value::Null),
        (other, _) => other,
    }
}

/// Write `value` at `path`, creating intermediate objects as needed.
pub fn set(container: &mut Value, path: &str, value: Value) {
    let mut node = container;
    for segment in segments(path) {
        node = descend(node, segment);
    }
    *node = value;
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

/// Remove and return the value at `path`.
pub fn remove(container: &mut Value, path: &str) -> Option<Value> {
    let segments = segments(path);
    let (last, parents) = segments.split_last()?;

    let mut node = container;
    for segment in parents {
        node = child_mut(node, segment)?;
    }

    match node {
        Value::Object(map) => map.shift_remove(*last),
        Value::Array(items) => {
            let i = last.parse::<usize>().ok().filter(|i| *i < items.len())?;
            Some(items.remove(i))
        }
        _ => None,
    }
}
