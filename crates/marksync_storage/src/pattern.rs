//! Where-pattern matching.

use crate::Object;
use serde_json::Value;

/// A field-equality match pattern.
///
/// A row matches when every field named in the pattern is present on the
/// row with an equal value. An empty pattern matches every row.
pub type WherePattern = Object;

/// Returns true if `row` matches `pattern`.
pub fn matches_pattern(row: &Object, pattern: &WherePattern) -> bool {
    pattern.iter().all(|(field, expected)| {
        row.get(field)
            .map(|actual| values_equal(actual, expected))
            .unwrap_or(false)
    })
}

/// Value equality with numeric widening so `5` matches `5.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{object, Object};
    use serde_json::json;

    #[test]
    fn empty_pattern_matches_all() {
        let row = object([("url", json!("https://a.com"))]);
        assert!(matches_pattern(&row, &Object::new()));
    }

    #[test]
    fn field_equality() {
        let row = object([("url", json!("https://a.com")), ("title", json!("A"))]);
        assert!(matches_pattern(&row, &object([("url", json!("https://a.com"))])));
        assert!(!matches_pattern(&row, &object([("url", json!("https://b.com"))])));
    }

    #[test]
    fn missing_field_never_matches() {
        let row = object([("url", json!("https://a.com"))]);
        assert!(!matches_pattern(&row, &object([("title", json!("A"))])));
    }

    #[test]
    fn numeric_widening() {
        let row = object([("id", json!(5))]);
        assert!(matches_pattern(&row, &object([("id", json!(5.0))])));
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ]
    }

    fn object_strategy() -> impl Strategy<Value = Object> {
        prop::collection::btree_map("[a-e]", value_strategy(), 0..6)
            .prop_map(|fields| fields.into_iter().collect())
    }

    proptest! {
        // A row always matches the empty pattern and itself.
        #[test]
        fn rows_match_themselves(row in object_strategy()) {
            prop_assert!(matches_pattern(&row, &Object::new()));
            prop_assert!(matches_pattern(&row, &row));
        }

        // A pattern naming a field the row lacks never matches,
        // whatever its other fields say.
        #[test]
        fn absent_fields_never_match(
            row in object_strategy(),
            value in value_strategy(),
        ) {
            let mut pattern = row.clone();
            pattern.insert("zz".into(), value);
            prop_assert!(!matches_pattern(&row, &pattern));
        }

        // Adding a field to a pattern can only narrow the match set.
        #[test]
        fn extra_pattern_fields_only_narrow(
            row in object_strategy(),
            pattern in object_strategy(),
            extra in value_strategy(),
        ) {
            let mut wider = pattern.clone();
            wider.insert("c".into(), extra);
            if matches_pattern(&row, &wider) {
                prop_assert!(matches_pattern(&row, &pattern));
            }
        }
    }
}
