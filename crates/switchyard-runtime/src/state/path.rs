//! Dot-path access into JSON trees.
//!
//! Paths are dot-delimited object keys: `"user.profile.name"` reads
//! `root["user"]["profile"]["name"]`. Segments address object keys
//! only; arrays are treated as leaf values and replaced wholesale by
//! writes and merges.
//!
//! Watcher patterns reuse the same segmentation with two extras:
//!
//! - `*` matches exactly one segment: `"user.*.name"`.
//! - A pattern that is a prefix of the path matches: a watcher on
//!   `"user"` sees writes to `"user.profile.name"`.

use serde_json::{Map, Value};

use super::error::StateError;

pub(super) fn validate(path: &str) -> Result<(), StateError> {
    if path.is_empty() {
        return Err(StateError::InvalidPath {
            path: path.to_string(),
            reason: "empty path".into(),
        });
    }
    if path.split('.').any(str::is_empty) {
        return Err(StateError::InvalidPath {
            path: path.to_string(),
            reason: "empty segment".into(),
        });
    }
    Ok(())
}

/// Reads the value at `path`, or `None` when any segment is missing
/// or crosses a non-object.
#[must_use]
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects and
/// replacing non-object intermediates. Returns the previous value at
/// the path, if any.
///
/// # Errors
///
/// Returns [`StateError::InvalidPath`] for an empty path or segment.
pub fn set(root: &mut Value, path: &str, value: Value) -> Result<Option<Value>, StateError> {
    validate(path)?;

    let mut current = root;
    let segments: Vec<&str> = path.split('.').collect();
    for segment in &segments[..segments.len() - 1] {
        current = object_mut(current)
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let leaf = segments[segments.len() - 1];
    Ok(object_mut(current).insert(leaf.to_string(), value))
}

/// Views `value` as an object, replacing any non-object in place.
fn object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

/// Removes and returns the value at `path`, leaving intermediate
/// objects in place. `None` when the path does not resolve.
pub fn remove(root: &mut Value, path: &str) -> Option<Value> {
    let (parent_path, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    };
    let parent = match parent_path {
        Some(p) => get_mut(root, p)?,
        None => root,
    };
    parent.as_object_mut()?.remove(leaf)
}

fn get_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

/// Returns `true` when `pattern` matches `path`.
///
/// Matching is per segment: every pattern segment must equal the
/// corresponding path segment or be `*`. A pattern shorter than the
/// path matches as a parent prefix; a pattern longer than the path
/// never matches.
#[must_use]
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern.is_empty() || path.is_empty() {
        return false;
    }
    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let path_segments: Vec<&str> = path.split('.').collect();
    if pattern_segments.len() > path_segments.len() {
        return false;
    }
    pattern_segments
        .iter()
        .zip(&path_segments)
        .all(|(pat, seg)| *pat == "*" || pat == seg)
}
