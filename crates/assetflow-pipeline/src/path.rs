//! Dot/bracket path access over JSON values.
//!
//! # Path Syntax
//!
//! - `model_urls.glb`: nested field access
//! - `texture_urls[0].base_color`: array index access
//! - `texture_urls.0.base_color`: numeric segments also index arrays
//!
//! Empty segments are ignored, so `a..b` reads like `a.b`.

use serde_json::{Map, Value};

/// A segment of a dot-separated path, with any trailing array indices.
#[derive(Debug, PartialEq)]
struct PathSegment {
    name: String,
    indices: Vec<usize>,
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        for i in &self.indices {
            write!(f, "[{}]", i)?;
        }
        Ok(())
    }
}

/// Parse a path into segments.
///
/// `"a.items[0][1].name"` → `[("a", []), ("items", [0, 1]), ("name", [])]`
fn parse_path_segments(path: &str) -> Vec<PathSegment> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            if let Some(bracket_start) = part.find('[')
                && part.ends_with(']')
            {
                let name = part[..bracket_start].to_string();
                let indices = part[bracket_start + 1..part.len() - 1]
                    .split("][")
                    .filter_map(|idx| idx.trim().parse::<usize>().ok())
                    .collect();
                return PathSegment { name, indices };
            }
            PathSegment {
                name: part.to_string(),
                indices: Vec::new(),
            }
        })
        .collect()
}

/// Navigate one named field, treating numeric names as array indices.
fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    if name.is_empty() {
        return Some(value);
    }
    match value {
        Value::Object(map) => map.get(name),
        Value::Array(items) => name.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Navigate one segment of a path through a JSON value.
fn navigate_segment<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    let mut current = field(value, &segment.name)?;
    for &i in &segment.indices {
        current = current.get(i)?;
    }
    Some(current)
}

/// Read the value at `path`. An empty path yields `None`.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path_segments(path);
    if segments.is_empty() {
        return None;
    }
    segments
        .iter()
        .try_fold(value, |current, segment| navigate_segment(current, segment))
}

/// Read the value at `path`, treating JSON `null` as absent.
pub fn get_present<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    get_path(value, path).filter(|v| !v.is_null())
}

/// Write `new_value` at `path`, creating intermediate objects as needed.
///
/// Intermediate values that are not objects are replaced by empty objects.
/// Bracket indices only descend into existing array elements. Returns
/// `false` when nothing was written.
pub fn set_path(root: &mut Value, path: &str, new_value: Value) -> bool {
    let segments = parse_path_segments(path);
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut current = root;
    for segment in parents {
        let Some(next) = descend_or_create(current, segment) else {
            return false;
        };
        current = next;
    }

    if last.indices.is_empty() {
        ensure_object(current).insert(last.name.clone(), new_value);
        return true;
    }

    let (final_index, leading) = match last.indices.split_last() {
        Some((final_index, leading)) => (*final_index, leading),
        None => return false,
    };
    let Some(mut target) = ensure_object(current).get_mut(&last.name) else {
        return false;
    };
    for &i in leading {
        let Some(next) = target.get_mut(i) else {
            return false;
        };
        target = next;
    }
    match target.get_mut(final_index) {
        Some(slot) => {
            *slot = new_value;
            true
        }
        None => false,
    }
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}

fn descend_or_create<'a>(value: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    let map = ensure_object(value);
    if segment.indices.is_empty() {
        let next = map
            .entry(segment.name.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !next.is_object() {
            *next = Value::Object(Map::new());
        }
        return Some(next);
    }
    let mut current = map.get_mut(&segment.name)?;
    for &i in &segment.indices {
        current = current.get_mut(i)?;
    }
    Some(current)
}
