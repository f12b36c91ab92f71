//! Best-effort parsing with an explicit fallback.

use tracing::warn;

/// Outcome of parsing input that may not be well formed.
///
/// `Fallback` carries a value derived from the original input instead of
/// an error, so callers can keep going while still knowing parsing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovered<T> {
    Parsed(T),
    Fallback(T),
}

impl<T> Recovered<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Parsed(value) | Self::Fallback(value) => value,
        }
    }
}

/// Read `raw` as a JSON array of query strings, such as the output of a
/// query expansion step. Anything else, including an array with no
/// non-blank strings, falls back to the single query `original`.
///
/// # Examples
///
/// ```
/// use papersift::recovered::{parse_query_list, Recovered};
///
/// let parsed = parse_query_list(r#"["attention", "transformers"]"#, "q");
/// assert_eq!(
///     parsed,
///     Recovered::Parsed(vec!["attention".to_string(), "transformers".to_string()])
/// );
///
/// let fallback = parse_query_list("not json", "not json");
/// assert_eq!(fallback, Recovered::Fallback(vec!["not json".to_string()]));
/// ```
pub fn parse_query_list(raw: &str, original: &str) -> Recovered<Vec<String>> {
    match serde_json::from_str::<Vec<String>>(strip_code_fence(raw)) {
        Ok(queries) => {
            let queries: Vec<String> = queries
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect();
            if queries.is_empty() {
                warn!("query list is empty, using the original query");
                Recovered::Fallback(vec![original.to_string()])
            } else {
                Recovered::Parsed(queries)
            }
        }
        Err(e) => {
            warn!("could not parse query list, using the original query: {e}");
            Recovered::Fallback(vec![original.to_string()])
        }
    }
}

/// Drop a surrounding markdown code fence (```` ```json ... ``` ````).
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_fenced_array() {
        let raw = "```json\n[\"graph neural networks\", \"message passing\"]\n```";
        assert_eq!(
            parse_query_list(raw, "gnn"),
            Recovered::Parsed(strings(&["graph neural networks", "message passing"]))
        );
    }

    #[test]
    fn blank_entries_are_dropped() {
        assert_eq!(
            parse_query_list(r#"["  a  ", "", "   "]"#, "orig"),
            Recovered::Parsed(strings(&["a"]))
        );
    }

    #[test]
    fn empty_array_falls_back() {
        let result = parse_query_list("[]", "orig");
        assert!(result.is_fallback());
        assert_eq!(result.into_inner(), strings(&["orig"]));
    }

    #[test]
    fn wrong_shape_falls_back() {
        assert_eq!(
            parse_query_list(r#"{"queries": ["a"]}"#, "orig"),
            Recovered::Fallback(strings(&["orig"]))
        );
        assert_eq!(
            parse_query_list("[1, 2]", "orig"),
            Recovered::Fallback(strings(&["orig"]))
        );
    }
}
