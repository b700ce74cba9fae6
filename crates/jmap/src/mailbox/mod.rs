/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The mailbox cache. Folder structure lives on the IMAP server; an
//! SQLite mirror assigns stable JMAP ids and scalar change states.
//! Every read reconciles the mirror against LIST/STATUS first, so a
//! folder created over plain IMAP surfaces as a tracked change here.

pub mod changes;
pub mod get;
pub mod query;
pub mod set;

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use jmap_proto::error::method::MethodError;
use jmap_proto::types::id::generate_id;
use serde_json::{json, Value};
use store::{EntityRow, EntityType};

use crate::imap::{MailboxCounts, MailboxInfo};
use crate::{imap_fail, store_fail, Account, JMAP};

pub(crate) const COUNT_PROPERTIES: [&str; 4] = [
    "totalEmails",
    "unreadEmails",
    "totalThreads",
    "unreadThreads",
];

pub(crate) fn prop_str<'x>(row: &'x EntityRow, key: &str) -> Option<&'x str> {
    row.properties.get(key).and_then(Value::as_str)
}

pub(crate) fn prop_u64(row: &EntityRow, key: &str) -> u64 {
    row.properties.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Hierarchy delimiter the backend reported for this folder at the
/// last LIST, '/' for rows that predate one.
pub(crate) fn prop_delimiter(row: &EntityRow) -> char {
    prop_str(row, "imapDelimiter")
        .and_then(|delim| delim.chars().next())
        .unwrap_or('/')
}

impl JMAP {
    /// Reconciles the cache with LIST/STATUS. New folders are
    /// inserted, vanished folders tombstoned, renamed or re-counted
    /// folders updated; the scalar state advances at most once per
    /// reconciliation no matter how many rows it touches.
    pub(crate) async fn sync_mailboxes(&self, account: &Arc<Account>) -> Result<(), MethodError> {
        let account_id = account.id.as_str();
        let mut listed: Vec<(MailboxInfo, MailboxCounts)> = {
            let mut imap = account.imap.lock().await;
            let infos = imap.list_mailboxes().await.map_err(imap_fail)?;
            let mut listed = Vec::with_capacity(infos.len());
            for info in infos {
                let counts = imap.mailbox_counts(&info.imap_name).await.map_err(imap_fail)?;
                listed.push((info, counts));
            }
            listed
        };
        // Parents before children, so parentId resolution never
        // chases a row that does not exist yet.
        listed.sort_by_key(|(info, _)| {
            let delim = info.delimiter.unwrap_or('/');
            (info.imap_name.matches(delim).count(), info.imap_name.clone())
        });

        let cached = self
            .store
            .get_entities(account_id, EntityType::Mailbox)
            .await
            .map_err(store_fail)?;
        let mut id_by_imap: AHashMap<String, String> = cached
            .iter()
            .filter_map(|row| {
                prop_str(row, "imapName").map(|name| (name.to_string(), row.id.clone()))
            })
            .collect();
        let mut by_imap: AHashMap<String, EntityRow> = cached
            .into_iter()
            .filter_map(|row| {
                prop_str(&row, "imapName")
                    .map(str::to_string)
                    .map(|name| (name, row))
            })
            .collect();

        let mut batch_state = None;
        let mut seen = AHashSet::new();
        for (info, counts) in listed {
            seen.insert(info.imap_name.clone());
            let delim = info.delimiter.unwrap_or('/');
            let (parent_imap, leaf) = match info.imap_name.rsplit_once(delim) {
                Some((parent, leaf)) => (Some(parent), leaf),
                None => (None, info.imap_name.as_str()),
            };
            let parent_id = parent_imap
                .and_then(|parent| id_by_imap.get(parent))
                .map(|id| Value::String(id.clone()))
                .unwrap_or(Value::Null);
            let role = match &info.role {
                Some(role) => Value::String(role.clone()),
                None if info.imap_name.eq_ignore_ascii_case("INBOX") => {
                    Value::String("inbox".to_string())
                }
                None => Value::Null,
            };

            match by_imap.remove(&info.imap_name) {
                None => {
                    let id = generate_id();
                    let properties = mailbox_properties(
                        leaf, &parent_id, &role, 0, &info, &counts,
                    );
                    let state = self.batch_advance(account_id, EntityType::Mailbox, &mut batch_state).await?;
                    self.store
                        .insert_entity(account_id, EntityType::Mailbox, &id, &properties, state)
                        .await
                        .map_err(store_fail)?;
                    tracing::debug!(
                        account_id,
                        mailbox = info.imap_name.as_str(),
                        id = id.as_str(),
                        "Discovered mailbox"
                    );
                    id_by_imap.insert(info.imap_name.clone(), id);
                }
                Some(row) => {
                    let sort_order = prop_u64(&row, "sortOrder");
                    let properties = mailbox_properties(
                        prop_str(&row, "name").unwrap_or(leaf),
                        &parent_id,
                        &role,
                        sort_order,
                        &info,
                        &counts,
                    );
                    let structural = row.properties.get("parentId") != Some(&parent_id)
                        || row.properties.get("role") != Some(&role)
                        || prop_str(&row, "name").is_none()
                        || prop_delimiter(&row) != delim;
                    let counts_changed = prop_u64(&row, "totalEmails") != counts.total as u64
                        || prop_u64(&row, "unreadEmails") != counts.unseen as u64
                        || row.properties.get("isSubscribed")
                            != Some(&Value::Bool(info.subscribed));
                    if structural || counts_changed {
                        let state = self.batch_advance(account_id, EntityType::Mailbox, &mut batch_state).await?;
                        self.store
                            .update_entity(
                                account_id,
                                EntityType::Mailbox,
                                &row.id,
                                &properties,
                                state,
                                !structural,
                            )
                            .await
                            .map_err(store_fail)?;
                    }
                }
            }
        }

        for (imap_name, row) in by_imap {
            if !seen.contains(&imap_name) {
                let state = self.batch_advance(account_id, EntityType::Mailbox, &mut batch_state).await?;
                self.store
                    .destroy_entity(account_id, EntityType::Mailbox, &row.id, state)
                    .await
                    .map_err(store_fail)?;
                tracing::debug!(
                    account_id,
                    mailbox = imap_name.as_str(),
                    id = row.id.as_str(),
                    "Mailbox vanished from backend"
                );
            }
        }

        Ok(())
    }

    /// Lazy once-per-call state advance: the counter moves on the
    /// first mutation and every later mutation in the same call
    /// reuses the value.
    pub(crate) async fn batch_advance(
        &self,
        account_id: &str,
        typ: EntityType,
        batch_state: &mut Option<u64>,
    ) -> Result<u64, MethodError> {
        match batch_state {
            Some(state) => Ok(*state),
            None => {
                let state = self
                    .store
                    .advance(account_id, typ)
                    .await
                    .map_err(store_fail)?;
                *batch_state = Some(state);
                Ok(state)
            }
        }
    }

    /// imapName -> JMAP id map over the live cache rows.
    pub(crate) async fn mailbox_id_map(
        &self,
        account_id: &str,
    ) -> Result<AHashMap<String, String>, MethodError> {
        Ok(self
            .store
            .get_entities(account_id, EntityType::Mailbox)
            .await
            .map_err(store_fail)?
            .into_iter()
            .filter_map(|row| {
                prop_str(&row, "imapName").map(|name| (name.to_string(), row.id.clone()))
            })
            .collect())
    }

    /// JMAP id -> imapName, the inverse of [`Self::mailbox_id_map`].
    pub(crate) async fn mailbox_imap_by_id(
        &self,
        account_id: &str,
    ) -> Result<AHashMap<String, String>, MethodError> {
        Ok(self
            .store
            .get_entities(account_id, EntityType::Mailbox)
            .await
            .map_err(store_fail)?
            .into_iter()
            .filter_map(|row| {
                prop_str(&row, "imapName").map(|name| (row.id.clone(), name.to_string()))
            })
            .collect())
    }
}

fn mailbox_properties(
    name: &str,
    parent_id: &Value,
    role: &Value,
    sort_order: u64,
    info: &MailboxInfo,
    counts: &MailboxCounts,
) -> serde_json::Map<String, Value> {
    match json!({
        "name": name,
        "parentId": parent_id,
        "role": role,
        "sortOrder": sort_order,
        "imapName": info.imap_name,
        "imapDelimiter": info.delimiter.unwrap_or('/').to_string(),
        "totalEmails": counts.total,
        "unreadEmails": counts.unseen,
        "isSubscribed": info.subscribed,
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}
