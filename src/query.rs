//! Query descriptor and the projection evaluator applied to both snapshot
//! reads and listener deliveries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Whether `limit` keeps the first N or last N entries after sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitOrder {
    /// `limitToFirst` / wire value `"l"`.
    First,
    /// `limitToLast` / wire value `"r"`.
    Last,
}

impl LimitOrder {
    pub fn from_wire(s: &str) -> Self {
        if s == "r" { LimitOrder::Last } else { LimitOrder::First }
    }

    pub fn to_wire(self) -> &'static str {
        match self {
            LimitOrder::First => "l",
            LimitOrder::Last => "r",
        }
    }
}

impl Default for LimitOrder {
    fn default() -> Self {
        LimitOrder::First
    }
}

/// The query descriptor carried on listen/query requests and REST reads.
///
/// Field names are descriptive rather than the wire tags (`sp`, `sn`, ...);
/// `crate::codec` maps between the two.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryDescriptor {
    #[serde(default)]
    pub order_by: String,
    #[serde(default)]
    pub start_at: Option<Value>,
    #[serde(default)]
    pub start_key: Option<String>,
    #[serde(default)]
    pub end_at: Option<Value>,
    #[serde(default)]
    pub end_key: Option<String>,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub limit_order: LimitOrder,
    #[serde(default)]
    pub shallow: bool,
    /// Opaque client-assigned id, echoed back on every delivery for this
    /// listener so the client can demultiplex pushes to the right query.
    #[serde(default)]
    pub id: i64,
}

impl QueryDescriptor {
    pub fn is_default(&self) -> bool {
        self.order_by.is_empty()
            && self.start_at.is_none()
            && self.start_key.is_none()
            && self.end_at.is_none()
            && self.end_key.is_none()
            && self.limit == 0
            && !self.shallow
    }

    /// Canonical key distinguishing this query from another so two
    /// listeners on the same path with different queries are tracked as
    /// distinct. `serde_json::Value` has no `Hash` impl, so the registry
    /// keys listeners by this string instead of the struct itself.
    pub fn dedupe_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Formats a JSON value the way the reference implementation's `fmt.Sprint`
/// does for the purposes of heterogeneous `start_at`/`end_at` comparison.
///
/// This is a deliberate wart, preserved rather than replaced with typed
/// comparison: mixed-type ordering on `start_at`/`end_at` falls back to
/// comparing the formatted string representation, same as upstream.
fn sort_string(value: &Value) -> String {
    match value {
        Value::Null => "<nil>".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", f as i64)
                } else {
                    f.to_string()
                }
            } else {
                n.to_string()
            }
        }
        Value::String(s) => s.clone(),
        // Composite values never appear as an index in practice (the index
        // is a scalar field), but format stably rather than panic.
        other => other.to_string(),
    }
}

struct Entry<'a> {
    key: &'a str,
    value: &'a Value,
    index: Value,
}

/// Computes the ordering index for an entry: `.key`/`$key` orders by the
/// map key, `.value`/`$value` orders by the whole child value, a dotted
/// path descends into the child, and an empty `order_by` applies no
/// ordering.
fn index_for(order_by: &str, key: &str, value: &Value) -> Value {
    match order_by {
        ".key" | "$key" => Value::String(key.to_string()),
        ".value" | "$value" => value.clone(),
        "" => Value::Null,
        path => {
            let mut cur = value;
            for segment in path.split('.') {
                if segment.is_empty() {
                    continue;
                }
                cur = match cur.get(segment) {
                    Some(v) => v,
                    None => return Value::Null,
                };
            }
            cur.clone()
        }
    }
}

/// Applies a query descriptor to a JSON value, producing the filtered,
/// ordered, limited, and possibly shallow-projected result.
///
/// Non-mapping values pass through untouched (`shallow` on a scalar is a
/// no-op).
pub fn evaluate(value: &Value, query: &QueryDescriptor) -> Value {
    let Some(map) = value.as_object() else {
        return value.clone();
    };

    let mut entries: Vec<Entry<'_>> = map
        .iter()
        .map(|(k, v)| Entry { key: k.as_str(), value: v, index: index_for(&query.order_by, k, v) })
        .filter(|e| passes_bounds(e, query))
        .collect();

    if query.limit > 0 {
        entries.sort_by(|a, b| {
            let a_key = sort_string(&a.index);
            let b_key = sort_string(&b.index);
            a_key.cmp(&b_key).then_with(|| a.key.cmp(b.key))
        });
        let limit = query.limit as usize;
        if entries.len() > limit {
            match query.limit_order {
                LimitOrder::First => entries.truncate(limit),
                LimitOrder::Last => {
                    let drop = entries.len() - limit;
                    entries.drain(..drop);
                }
            }
        }
    }

    let mut result = Map::new();
    let mut has_scalar = false;
    for e in &entries {
        if !e.value.is_object() {
            has_scalar = true;
        }
        result.insert(e.key.to_string(), e.value.clone());
    }

    if query.shallow {
        if has_scalar {
            return Value::Object(result);
        }
        let mut shallow = Map::new();
        for key in result.keys() {
            shallow.insert(key.clone(), Value::Bool(true));
        }
        return Value::Object(shallow);
    }

    Value::Object(result)
}

fn passes_bounds(entry: &Entry<'_>, query: &QueryDescriptor) -> bool {
    if let Some(start) = &query.start_at {
        if sort_string(&entry.index) < sort_string(start) {
            return false;
        }
    }
    if let Some(end) = &query.end_at {
        if sort_string(&entry.index) > sort_string(end) {
            return false;
        }
    }
    if let Some(start_key) = &query.start_key {
        if entry.key < start_key.as_str() {
            return false;
        }
    }
    if let Some(end_key) = &query.end_key {
        if entry.key > end_key.as_str() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query() -> QueryDescriptor {
        QueryDescriptor::default()
    }

    #[test]
    fn passthrough_on_scalar() {
        let v = json!("hello");
        assert_eq!(evaluate(&v, &query()), v);
    }

    #[test]
    fn order_by_key_range() {
        let tree = json!({"id1": 1, "id2": 2, "id3": 3, "id4": 4});
        let q = QueryDescriptor {
            order_by: ".key".into(),
            start_at: Some(json!("id2")),
            end_at: Some(json!("id3")),
            ..query()
        };
        let result = evaluate(&tree, &q);
        assert_eq!(result, json!({"id2": 2, "id3": 3}));
    }

    #[test]
    fn order_by_child_limit_to_last() {
        let tree = json!({
            "a": {"number": 1},
            "b": {"number": 2},
            "c": {"number": 3},
            "d": {"number": 4},
        });
        let q = QueryDescriptor {
            order_by: "number".into(),
            limit: 2,
            limit_order: LimitOrder::Last,
            ..query()
        };
        let result = evaluate(&tree, &q);
        assert_eq!(result, json!({"c": {"number": 3}, "d": {"number": 4}}));
    }

    #[test]
    fn order_by_child_limit_to_first() {
        let tree = json!({
            "a": {"number": 1},
            "b": {"number": 2},
            "c": {"number": 3},
        });
        let q = QueryDescriptor {
            order_by: "number".into(),
            limit: 2,
            limit_order: LimitOrder::First,
            ..query()
        };
        let result = evaluate(&tree, &q);
        assert_eq!(result, json!({"a": {"number": 1}, "b": {"number": 2}}));
    }

    #[test]
    fn shallow_all_mappings_becomes_true() {
        let tree = json!({"id1": {"a": 1}, "id2": {"b": 2}});
        let q = QueryDescriptor { shallow: true, ..query() };
        let result = evaluate(&tree, &q);
        assert_eq!(result, json!({"id1": true, "id2": true}));
    }

    #[test]
    fn shallow_with_scalar_is_noop() {
        let tree = json!({"id1": "text", "id2": {"b": 2}});
        let q = QueryDescriptor { shallow: true, ..query() };
        let result = evaluate(&tree, &q);
        assert_eq!(result, tree);
    }

    #[test]
    fn shallow_on_scalar_returns_scalar() {
        let v = json!(42);
        let q = QueryDescriptor { shallow: true, ..query() };
        assert_eq!(evaluate(&v, &q), v);
    }

    #[test]
    fn start_key_end_key_bounds() {
        let tree = json!({"a": 1, "b": 2, "c": 3});
        let q = QueryDescriptor {
            start_key: Some("b".into()),
            end_key: Some("b".into()),
            ..query()
        };
        assert_eq!(evaluate(&tree, &q), json!({"b": 2}));
    }
}
