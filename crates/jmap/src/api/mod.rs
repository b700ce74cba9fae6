/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod http;
pub mod request;
pub mod session;
pub mod set;

use serde_json::Value;

/// Applies a /get properties selection to a built object. The id is
/// always kept; unknown property names are silently dropped.
pub(crate) fn filter_properties(
    object: serde_json::Map<String, Value>,
    properties: Option<&Vec<String>>,
) -> Value {
    match properties {
        None => Value::Object(object),
        Some(properties) => Value::Object(
            object
                .into_iter()
                .filter(|(key, _)| key == "id" || properties.iter().any(|p| p == key))
                .collect(),
        ),
    }
}
