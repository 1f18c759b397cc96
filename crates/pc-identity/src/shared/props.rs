//! Free-form attributes attached to durable records.

use std::collections::BTreeMap;

/// String-keyed JSON values. Ordered so stored documents are stable.
pub type Props = BTreeMap<String, serde_json::Value>;

/// Build `Props` from a JSON object, dropping nulls. Non-objects yield an empty map.
pub fn props_from_json(value: &serde_json::Value) -> Props {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}
