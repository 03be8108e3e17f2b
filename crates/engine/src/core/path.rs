//! Element path navigation over JSON resource bodies.

use serde_json::Value;

/// Returns every value reached by a dotted element path.
///
/// Arrays are flattened at each step, so `name.given` yields every given name
/// of every name. The empty path yields the value itself. Nulls are dropped.
pub fn values_at<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = flatten(vec![value]);
    if !path.is_empty() {
        for segment in path.split('.') {
            current = flatten(current.into_iter().filter_map(|v| v.get(segment)).collect());
        }
    }
    current.retain(|v| !v.is_null());
    current
}

fn flatten(values: Vec<&Value>) -> Vec<&Value> {
    values
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_at_flattens_arrays() {
        let patient = json!({
            "name": [
                {"family": "Chalmers", "given": ["Peter", "James"]},
                {"family": "Windsor", "given": ["Jim"]}
            ]
        });
        let given: Vec<&str> = values_at(&patient, "name.given")
            .into_iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(given, vec!["Peter", "James", "Jim"]);
        assert_eq!(values_at(&patient, "name.family").len(), 2);
    }

    #[test]
    fn test_values_at_missing_and_root() {
        let doc = json!({"status": "final", "note": null});
        assert!(values_at(&doc, "code.coding").is_empty());
        assert!(values_at(&doc, "note").is_empty());
        assert_eq!(values_at(&doc, ""), vec![&doc]);
    }
}
