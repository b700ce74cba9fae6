/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::collections::HashMap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::set::SetError;
use crate::types::state::State;

/// A bulk mutation request. The onSuccess* maps are only meaningful
/// for EmailSubmission/set, where they trigger a follow-on Email/set
/// spliced into the batch after the submission transaction commits.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRequest {
    pub account_id: String,
    #[serde(default)]
    pub if_in_state: Option<String>,
    #[serde(default)]
    pub create: Option<AHashMap<String, serde_json::Map<String, Value>>>,
    #[serde(default)]
    pub update: Option<AHashMap<String, serde_json::Map<String, Value>>>,
    #[serde(default)]
    pub destroy: Option<Vec<String>>,
    #[serde(default)]
    pub on_success_update_email: Option<AHashMap<String, serde_json::Map<String, Value>>>,
    #[serde(default)]
    pub on_success_destroy_email: Option<Vec<String>>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetResponse {
    pub account_id: String,
    pub old_state: State,
    pub new_state: State,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub created: AHashMap<String, Value>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub updated: AHashMap<String, Option<Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub destroyed: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub not_created: AHashMap<String, SetError>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub not_updated: AHashMap<String, SetError>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub not_destroyed: AHashMap<String, SetError>,
}

impl SetRequest {
    pub fn total_operations(&self) -> usize {
        self.create.as_ref().map_or(0, |c| c.len())
            + self.update.as_ref().map_or(0, |u| u.len())
            + self.destroy.as_ref().map_or(0, |d| d.len())
    }
}

impl SetResponse {
    pub fn new(account_id: impl Into<String>, old_state: State) -> Self {
        SetResponse {
            account_id: account_id.into(),
            old_state,
            new_state: old_state,
            ..Default::default()
        }
    }

    /// Registers a successful create, returning the server id stored
    /// under the creation reference for idmap consumption.
    pub fn push_created(&mut self, creation_id: impl Into<String>, object: Value) {
        self.created.insert(creation_id.into(), object);
    }

    pub fn created_id(&self, creation_id: &str) -> Option<&str> {
        self.created
            .get(creation_id)
            .and_then(|object| object.get("id"))
            .and_then(|id| id.as_str())
    }
}
