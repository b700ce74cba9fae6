/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The scalar-state change enumeration engine shared by every
//! SQLite-cached entity type. Rows are classified by comparing their
//! stamp columns against sinceState with strict greater-than; a row
//! both created and destroyed inside the window is suppressed
//! entirely.

use jmap_proto::error::method::MethodError;
use jmap_proto::method::changes::{ChangesRequest, ChangesResponse};
use jmap_proto::types::state::{State, StateShape};
use store::EntityType;

use crate::{store_fail, JMAP};

#[derive(Debug)]
pub(crate) struct ScalarChanges {
    pub response: ChangesResponse,
    /// True when every reported update only touched counter
    /// properties. Mailbox/changes uses this to emit
    /// updatedProperties.
    pub counts_only: bool,
}

impl JMAP {
    pub(crate) async fn scalar_changes(
        &self,
        typ: EntityType,
        request: &ChangesRequest,
    ) -> Result<ScalarChanges, MethodError> {
        let account_id = request.account_id.as_str();
        let since = match State::parse(&request.since_state, StateShape::Scalar) {
            Some(State::Scalar(since)) => since,
            _ => {
                return Err(MethodError::InvalidArguments(format!(
                    "Failed to parse state {:?}.",
                    request.since_state
                )))
            }
        };
        let current = self
            .store
            .current_state(account_id, typ)
            .await
            .map_err(store_fail)?;
        let low = self
            .store
            .low_state(account_id, typ)
            .await
            .map_err(store_fail)?;
        if since > current || since + 1 < low {
            return Err(MethodError::CannotCalculateChanges(State::Scalar(current)));
        }

        let max_changes = match request.max_changes {
            Some(0) => {
                return Err(MethodError::InvalidArguments(
                    "maxChanges must be a positive integer.".to_string(),
                ))
            }
            Some(max) => max.min(self.config.changes_max_results),
            None => self.config.changes_max_results,
        };

        let mut rows = self
            .store
            .changes_window(account_id, typ, since, max_changes + 1)
            .await
            .map_err(store_fail)?;

        let mut response = ChangesResponse::new(account_id, State::Scalar(since));
        let new_state = if rows.len() > max_changes {
            response.has_more_changes = true;
            let boundary = rows[max_changes - 1].last_touched();
            let lookahead = rows[max_changes].last_touched();
            rows.truncate(max_changes);
            // Never let a client resuming from newState skip rows
            // that share the page-boundary state.
            if lookahead == boundary {
                boundary - 1
            } else {
                boundary
            }
        } else {
            current
        };
        response.new_state = State::Scalar(new_state);

        let mut counts_only = true;
        for row in rows {
            if row.is_destroyed() {
                if row.created > since {
                    // Created and destroyed inside the window: the
                    // client never saw it, report nothing.
                    continue;
                }
                response.destroyed.push(row.id);
            } else if row.created > since {
                response.created.push(row.id);
            } else {
                if row.updated_non_counts.is_some_and(|stamp| stamp > since) {
                    counts_only = false;
                }
                response.updated.push(row.id);
            }
        }

        Ok(ScalarChanges {
            response,
            counts_only,
        })
    }

    /// Change-tracked query results are not offered for any entity
    /// type; clients are steered to a fresh query instead.
    pub(crate) fn query_changes_unsupported(&self, current: State) -> MethodError {
        MethodError::CannotCalculateChanges(current)
    }
}
