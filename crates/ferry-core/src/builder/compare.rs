//! Structural comparison of record payloads.
//!
//! Two payloads match when they hold the same values under the same keys,
//! in any key order. [`first_difference`] names the first location where
//! they disagree so a lossy field can be pointed at in the ledger.

use serde_json::Value;

/// Path of the first disagreement between `before` and `after`, as a
/// slash-separated pointer (`""` is the root). `None` when they match.
///
/// ```
/// use serde_json::json;
/// use ferry_core::builder::compare::first_difference;
///
/// let sent = json!({"result_data": {"vote_count": 3}, "title": "Poll"});
/// let back = json!({"title": "Poll", "result_data": {"vote_count": 2}});
/// assert_eq!(first_difference(&sent, &back).as_deref(), Some("/result_data/vote_count"));
/// ```
#[must_use]
pub fn first_difference(before: &Value, after: &Value) -> Option<String> {
    diff_at(before, after, String::new())
}

fn diff_at(before: &Value, after: &Value, at: String) -> Option<String> {
    match (before, after) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            keys.into_iter().find_map(|key| match (a.get(key), b.get(key)) {
                (Some(x), Some(y)) => diff_at(x, y, format!("{at}/{key}")),
                _ => Some(format!("{at}/{key}")),
            })
        }
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return Some(at);
            }
            a.iter()
                .zip(b)
                .enumerate()
                .find_map(|(i, (x, y))| diff_at(x, y, format!("{at}/{i}")))
        }
        (a, b) if a == b => None,
        _ => Some(at),
    }
}
