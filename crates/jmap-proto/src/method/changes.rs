/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use serde::{Deserialize, Serialize};

use crate::types::state::State;

/// The sinceState stays a raw string here; each entity type parses it
/// against its own token shape and maps failure to invalidArguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesRequest {
    pub account_id: String,
    pub since_state: String,
    #[serde(default)]
    pub max_changes: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResponse {
    pub account_id: String,
    pub old_state: State,
    pub new_state: State,
    pub has_more_changes: bool,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub destroyed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_properties: Option<Vec<String>>,
}

impl ChangesResponse {
    pub fn new(account_id: impl Into<String>, old_state: State) -> Self {
        ChangesResponse {
            account_id: account_id.into(),
            old_state,
            new_state: old_state,
            has_more_changes: false,
            created: Vec::new(),
            updated: Vec::new(),
            destroyed: Vec::new(),
            updated_properties: None,
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.created.is_empty() || !self.updated.is_empty() || !self.destroyed.is_empty()
    }
}
