//! Small field-extraction helpers shared by the translators.

use crate::error::{TranslationError, TranslationResult};
use marksync_storage::Object;
use serde_json::Value;

/// Returns the string value of a required field.
pub(crate) fn str_field<'a>(
    object: &'a Object,
    collection: &str,
    field: &str,
) -> TranslationResult<&'a str> {
    object
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| TranslationError::MissingField {
            collection: collection.into(),
            field: field.into(),
        })
}

/// Returns the integer value of a required field.
pub(crate) fn i64_field(
    object: &Object,
    collection: &str,
    field: &str,
) -> TranslationResult<i64> {
    object
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| TranslationError::MissingField {
            collection: collection.into(),
            field: field.into(),
        })
}

/// Copies the named fields from `src` into `dst` when present.
pub(crate) fn copy_fields(dst: &mut Object, src: &Object, fields: &[&str]) {
    for field in fields {
        if let Some(value) = src.get(*field) {
            dst.insert((*field).into(), value.clone());
        }
    }
}

/// Returns the subset of `updates` whose values differ from `current`.
pub(crate) fn changed_fields(current: &Object, updates: &Object) -> Object {
    updates
        .iter()
        .filter(|(k, v)| current.get(*k) != Some(v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
