//! Minimal JSONPath resolver for step interpolation: `$`, `.field`, `[i]`, `[*]`.
//!
//! Multiple matches collapse to an array; zero matches is an error (the step fails).

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonPathError {
    #[error("invalid json path {path:?}: {reason}")]
    Parse { path: String, reason: String },

    #[error("json path {0:?} matched nothing")]
    NoMatch(String),
}

#[derive(Debug, PartialEq)]
enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
}

fn parse(path: &str) -> Result<Vec<Segment>, JsonPathError> {
    let err = |reason: &str| JsonPathError::Parse {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let mut rest = path
        .trim()
        .strip_prefix('$')
        .ok_or_else(|| err("must start with $"))?;
    let mut segments = Vec::new();

    while !rest.is_empty() {
        if let Some(r) = rest.strip_prefix('.') {
            let end = r.find(['.', '[']).unwrap_or(r.len());
            if end == 0 {
                return Err(err("empty field segment"));
            }
            segments.push(Segment::Field(r[..end].to_string()));
            rest = &r[end..];
        } else if let Some(r) = rest.strip_prefix('[') {
            let close = r.find(']').ok_or_else(|| err("unclosed bracket"))?;
            let token = &r[..close];
            if token == "*" {
                segments.push(Segment::Wildcard);
            } else {
                let index = token
                    .parse()
                    .map_err(|_| err("bracket must hold an index or *"))?;
                segments.push(Segment::Index(index));
            }
            rest = &r[close + 1..];
        } else {
            return Err(err("expected . or ["));
        }
    }
    Ok(segments)
}

/// Resolves `path` against `root`. One match returns the value itself; several
/// collapse to an array; none is [`JsonPathError::NoMatch`].
pub fn resolve(path: &str, root: &Value) -> Result<Value, JsonPathError> {
    let segments = parse(path)?;
    let mut nodes: Vec<&Value> = vec![root];

    for segment in &segments {
        let mut next = Vec::new();
        for node in nodes {
            match segment {
                Segment::Field(name) => {
                    if let Some(v) = node.get(name.as_str()) {
                        next.push(v);
                    }
                }
                Segment::Index(i) => {
                    if let Some(v) = node.get(i) {
                        next.push(v);
                    }
                }
                Segment::Wildcard => {
                    if let Some(items) = node.as_array() {
                        next.extend(items.iter());
                    }
                }
            }
        }
        nodes = next;
        if nodes.is_empty() {
            break;
        }
    }

    match nodes.len() {
        0 => Err(JsonPathError::NoMatch(path.to_string())),
        1 => Ok(nodes[0].clone()),
        _ => Ok(Value::Array(nodes.into_iter().cloned().collect())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_returns_value_itself() {
        let v = json!({"a": 1});
        assert_eq!(resolve("$", &v).unwrap(), v);
    }

    #[test]
    fn nested_field_access() {
        let v = json!({"a": {"b": 42}});
        assert_eq!(resolve("$.a.b", &v).unwrap(), json!(42));
    }

    #[test]
    fn array_index_and_chained_field() {
        let v = json!({"steps": [{"response": {"id": 123}}]});
        assert_eq!(resolve("$.steps[0].response.id", &v).unwrap(), json!(123));
    }

    #[test]
    fn wildcard_collapses_to_array() {
        let v = json!({"items": [{"id": 1}, {"id": 2}]});
        assert_eq!(resolve("$.items[*].id", &v).unwrap(), json!([1, 2]));
    }

    #[test]
    fn single_wildcard_match_is_unwrapped() {
        let v = json!({"items": [{"id": 7}]});
        assert_eq!(resolve("$.items[*].id", &v).unwrap(), json!(7));
    }

    #[test]
    fn missing_field_is_no_match() {
        let v = json!({"a": 1});
        assert!(matches!(resolve("$.b", &v), Err(JsonPathError::NoMatch(_))));
        assert!(matches!(
            resolve("$.a.b.c", &v),
            Err(JsonPathError::NoMatch(_))
        ));
    }

    #[test]
    fn wildcard_on_non_array_is_no_match() {
        let v = json!({"a": {"b": 1}});
        assert!(matches!(resolve("$.a[*]", &v), Err(JsonPathError::NoMatch(_))));
    }

    #[test]
    fn malformed_paths_are_parse_errors() {
        let v = json!({});
        assert!(matches!(resolve("steps[0]", &v), Err(JsonPathError::Parse { .. })));
        assert!(matches!(resolve("$.", &v), Err(JsonPathError::Parse { .. })));
        assert!(matches!(resolve("$[x]", &v), Err(JsonPathError::Parse { .. })));
        assert!(matches!(resolve("$[0", &v), Err(JsonPathError::Parse { .. })));
    }
}
