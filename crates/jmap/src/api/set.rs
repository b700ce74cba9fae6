/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Shared /set plumbing: creation-reference resolution and the patch
//! interpreter applied to SQLite-cached entities.

use ahash::AHashMap;
use jmap_proto::error::set::SetError;
use serde_json::Value;

/// Resolves an id argument that may be a `#creationId` reference into
/// the server id minted earlier in the same batch. A dangling
/// reference yields None and the caller reports notFound.
pub(crate) fn resolve_id<'x>(
    id: &'x str,
    created_ids: &'x AHashMap<String, String>,
) -> Option<&'x str> {
    match id.strip_prefix('#') {
        Some(creation_id) => created_ids.get(creation_id).map(String::as_str),
        None => Some(id),
    }
}

/// Applies a JMAP update map to an object. Flat keys replace whole
/// properties; `a/b` keys patch one entry of a map-valued property,
/// inserting on true/value and removing on false/null. Touching a
/// property in `immutable` fails the whole item.
pub(crate) fn apply_patch(
    object: &mut serde_json::Map<String, Value>,
    updates: &serde_json::Map<String, Value>,
    immutable: &[&str],
) -> Result<(), SetError> {
    for (path, value) in updates {
        if let Some((property, key)) = path.split_once('/') {
            if key.is_empty() || key.contains('/') {
                return Err(SetError::invalid_patch()
                    .with_description(format!("Invalid patch path {path:?}.")));
            }
            if immutable.contains(&property) {
                return Err(SetError::invalid_patch()
                    .with_description("Property may not be changed.")
                    .with_property(property));
            }
            let entry = object
                .entry(property.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            let Value::Object(map) = entry else {
                return Err(SetError::invalid_patch()
                    .with_description(format!("Property {property:?} is not a map."))
                    .with_property(property));
            };
            match value {
                Value::Null | Value::Bool(false) => {
                    map.remove(key);
                }
                value => {
                    map.insert(key.to_string(), value.clone());
                }
            }
        } else {
            if immutable.contains(&path.as_str()) {
                return Err(SetError::invalid_patch()
                    .with_description("Property may not be changed.")
                    .with_property(path));
            }
            match value {
                Value::Null => {
                    object.remove(path);
                }
                value => {
                    object.insert(path.clone(), value.clone());
                }
            }
        }
    }
    Ok(())
}
