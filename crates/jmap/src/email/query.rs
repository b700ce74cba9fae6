/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::{AHashMap, AHashSet};
use jmap_proto::error::method::MethodError;
use jmap_proto::method::query::{QueryRequest, QueryResponse};
use jmap_proto::types::id::EmailId;
use jmap_proto::types::state::State;

use crate::imap::search::{compile_filter, compile_sort, SearchKey};
use crate::query::window;
use crate::{imap_fail, JMAP};

impl JMAP {
    pub async fn email_query(
        &self,
        request: Result<QueryRequest, MethodError>,
    ) -> Result<QueryResponse, MethodError> {
        let request = request?;
        let account = self.account(&request.account_id)?;
        self.sync_mailboxes(&account).await?;
        let imap_by_id = self.mailbox_imap_by_id(&account.id).await?;

        let mut key = compile_filter(request.filter.as_ref())?;
        resolve_mailboxes(&mut key, &imap_by_id);
        let sort = compile_sort(request.sort.as_deref())?;

        let mut imap = account.imap.lock().await;
        let state = imap.mail_state().await.map_err(imap_fail)?;
        let uids = imap.uid_sort(&sort, &key).await.map_err(imap_fail)?;
        drop(imap);

        let mut ids: Vec<String> = uids
            .into_iter()
            .map(|uid| EmailId::new(state.uid_validity, uid).to_string())
            .collect();

        // collapseThreads keeps the first email of each thread in
        // result order.
        if request.collapse_threads.unwrap_or(false) {
            let mut seen = AHashSet::new();
            ids.retain(|id| {
                EmailId::parse(id)
                    .map(|email_id| seen.insert(self.threads.thread_id(&email_id)))
                    .unwrap_or(true)
            });
        }

        let win = window(ids, &request, self.config.query_max_results)?;
        Ok(QueryResponse {
            account_id: request.account_id,
            query_state: State::Mail(state),
            can_calculate_changes: false,
            position: win.position,
            total: request
                .calculate_total
                .unwrap_or(false)
                .then_some(win.total),
            ids: win.ids,
            limit: win.limit,
        })
    }
}

/// Translates JMAP mailbox ids in the compiled program into backend
/// folder names. An id that no longer exists can match nothing, which
/// `NOT ALL` expresses exactly.
fn resolve_mailboxes(key: &mut SearchKey, imap_by_id: &AHashMap<String, String>) {
    match key {
        SearchKey::InMailbox(id) => {
            *key = match imap_by_id.get(id.as_str()) {
                Some(imap_name) => SearchKey::InMailbox(imap_name.clone()),
                None => SearchKey::Not(Box::new(SearchKey::All)),
            };
        }
        SearchKey::And(keys) => {
            for key in keys {
                resolve_mailboxes(key, imap_by_id);
            }
        }
        SearchKey::Or(a, b) => {
            resolve_mailboxes(a, imap_by_id);
            resolve_mailboxes(b, imap_by_id);
        }
        SearchKey::Not(inner) => resolve_mailboxes(inner, imap_by_id),
        _ => {}
    }
}
