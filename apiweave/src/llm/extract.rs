//! Balanced-brace JSON extraction from free-form LLM replies.

/// Returns the largest balanced `{...}` region of `raw`, or `None` when there is none.
///
/// Brace depth is tracked outside string literals only, so `{` and `}` inside quoted
/// values do not break the balance; `\"` escapes are honored.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let bytes = raw.as_bytes();
    let mut best: Option<(usize, usize)> = None;
    let mut start: Option<usize> = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        let s = start.take().unwrap_or(i);
                        let candidate = (s, i + 1);
                        if best.map_or(true, |(bs, be)| candidate.1 - candidate.0 > be - bs) {
                            best = Some(candidate);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    best.map(|(s, e)| &raw[s..e])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object_returned_whole() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn picks_largest_region_among_several() {
        let raw = r#"small {"a":1} then {"steps":[{"endpoint":"GET /x","params":{}}]} end"#;
        let got = extract_json_object(raw).unwrap();
        assert!(got.starts_with(r#"{"steps""#));
        assert!(serde_json::from_str::<serde_json::Value>(got).is_ok());
    }

    #[test]
    fn braces_inside_strings_do_not_unbalance() {
        let raw = r#"{"message": "use {curly} braces", "n": 1}"#;
        assert_eq!(extract_json_object(raw), Some(raw));
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let raw = r#"{"say": "\"hi\" {ok}"}"#;
        assert_eq!(extract_json_object(raw), Some(raw));
    }

    #[test]
    fn none_when_no_object() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("unbalanced { still open"), None);
    }

    #[test]
    fn markdown_fenced_reply() {
        let raw = "```json\n{\"steps\": []}\n```";
        assert_eq!(extract_json_object(raw), Some("{\"steps\": []}"));
    }
}
