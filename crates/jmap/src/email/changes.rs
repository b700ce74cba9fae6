/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Email/changes over CHANGEDSINCE/VANISHED. New arrivals are told
//! apart from flag updates by comparing the uid against the
//! sinceState uidnext; a message that arrived and vanished inside the
//! window is suppressed. Pages are cut on modseq boundaries, with the
//! same shared-boundary protection the scalar engine applies.

use jmap_proto::error::method::MethodError;
use jmap_proto::method::changes::{ChangesRequest, ChangesResponse};
use jmap_proto::types::id::EmailId;
use jmap_proto::types::state::{MailState, State};

use crate::imap::UidModseq;
use crate::{imap_fail, JMAP};

impl JMAP {
    pub async fn email_changes(
        &self,
        request: Result<ChangesRequest, MethodError>,
    ) -> Result<ChangesResponse, MethodError> {
        let request = request?;
        let account = self.account(&request.account_id)?;
        let Some(since) = MailState::parse(&request.since_state) else {
            return Err(MethodError::InvalidArguments(format!(
                "Failed to parse state {:?}.",
                request.since_state
            )));
        };
        let max_changes = match request.max_changes {
            Some(0) => {
                return Err(MethodError::InvalidArguments(
                    "maxChanges must be a positive integer.".to_string(),
                ))
            }
            Some(max) => max.min(self.config.changes_max_results),
            None => self.config.changes_max_results,
        };

        let mut imap = account.imap.lock().await;
        let current = imap.mail_state().await.map_err(imap_fail)?;
        // A uidvalidity bump invalidates every uid the client knows;
        // a "future" state means the client is talking about a
        // history this server never produced.
        if since.uid_validity != current.uid_validity || since > current {
            return Err(MethodError::CannotCalculateChanges(State::Mail(current)));
        }

        let mut response = ChangesResponse::new(&request.account_id, State::Mail(since));
        if since == current {
            return Ok(response);
        }

        let changes = imap.changed_since(since.modseq).await.map_err(imap_fail)?;
        drop(imap);

        let destroyed: Vec<u32> = changes
            .vanished
            .iter()
            .copied()
            .filter(|uid| *uid < since.uid_next)
            .collect();
        let mut items: Vec<UidModseq> = changes
            .changed
            .into_iter()
            .filter(|item| item.modseq > since.modseq)
            .collect();
        items.sort_by_key(|item| (item.modseq, item.uid));

        // Expunges carry no modseq of their own, so they cannot be
        // paged; a window dominated by them is simply too large.
        if destroyed.len() > max_changes
            || (destroyed.len() == max_changes && !items.is_empty())
        {
            return Err(MethodError::CannotCalculateChanges(State::Mail(current)));
        }
        let remaining = max_changes - destroyed.len();

        let new_state = if items.len() > remaining {
            response.has_more_changes = true;
            let boundary = items[remaining - 1].modseq;
            let lookahead = items[remaining].modseq;
            let new_modseq = if lookahead == boundary {
                boundary - 1
            } else {
                boundary
            };
            let new_uid_next = items[remaining..]
                .iter()
                .map(|item| item.uid)
                .filter(|uid| *uid >= since.uid_next)
                .min()
                .unwrap_or(current.uid_next);
            items.truncate(remaining);
            MailState::new(current.uid_validity, new_uid_next, new_modseq)
        } else {
            current
        };
        response.new_state = State::Mail(new_state);

        for uid in destroyed {
            response
                .destroyed
                .push(EmailId::new(current.uid_validity, uid).to_string());
        }
        for item in items {
            let id = EmailId::new(current.uid_validity, item.uid).to_string();
            if item.uid >= since.uid_next {
                response.created.push(id);
            } else {
                response.updated.push(id);
            }
        }

        Ok(response)
    }
}
