/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::AHashMap;
use jmap_proto::error::method::MethodError;
use jmap_proto::method::get::{GetRequest, GetResponse};
use jmap_proto::types::state::State;
use serde_json::{json, Value};
use store::{EntityRow, EntityType};

use crate::api::filter_properties;
use crate::mailbox::{prop_str, prop_u64};
use crate::{store_fail, JMAP};

impl JMAP {
    pub async fn mailbox_get(
        &self,
        request: Result<GetRequest, MethodError>,
    ) -> Result<GetResponse, MethodError> {
        let request = request?;
        self.check_get_limit(&request)?;
        let account = self.account(&request.account_id)?;
        self.sync_mailboxes(&account).await?;

        let state = self
            .store
            .current_state(&account.id, EntityType::Mailbox)
            .await
            .map_err(store_fail)?;
        let rows: AHashMap<String, EntityRow> = self
            .store
            .get_entities(&account.id, EntityType::Mailbox)
            .await
            .map_err(store_fail)?
            .into_iter()
            .map(|row| (row.id.clone(), row))
            .collect();

        let mut list = Vec::new();
        let mut not_found = Vec::new();
        match &request.ids {
            None => {
                for row in rows.values() {
                    list.push(filter_properties(
                        mailbox_object(row),
                        request.properties.as_ref(),
                    ));
                }
            }
            Some(ids) => {
                for id in ids {
                    match rows.get(id) {
                        Some(row) => list.push(filter_properties(
                            mailbox_object(row),
                            request.properties.as_ref(),
                        )),
                        None => not_found.push(id.clone()),
                    }
                }
            }
        }

        Ok(GetResponse {
            account_id: request.account_id,
            state: State::Scalar(state),
            list,
            not_found,
        })
    }
}

fn mailbox_object(row: &EntityRow) -> serde_json::Map<String, Value> {
    let role = row.properties.get("role").cloned().unwrap_or(Value::Null);
    let total = prop_u64(row, "totalEmails");
    let unread = prop_u64(row, "unreadEmails");
    match json!({
        "id": row.id,
        "name": prop_str(row, "name").unwrap_or_default(),
        "parentId": row.properties.get("parentId").cloned().unwrap_or(Value::Null),
        "role": role,
        "sortOrder": prop_u64(row, "sortOrder"),
        "totalEmails": total,
        "unreadEmails": unread,
        "totalThreads": total,
        "unreadThreads": unread,
        "myRights": my_rights(&role),
        "isSubscribed": row
            .properties
            .get("isSubscribed")
            .and_then(Value::as_bool)
            .unwrap_or(true),
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// The rights object for a proxied folder: everything the session
/// user can do over IMAP, except deleting or renaming the inbox.
fn my_rights(role: &Value) -> Value {
    let is_inbox = role.as_str() == Some("inbox");
    json!({
        "mayReadItems": true,
        "mayAddItems": true,
        "mayRemoveItems": true,
        "maySetSeen": true,
        "maySetKeywords": true,
        "mayCreateChild": true,
        "mayRename": !is_inbox,
        "mayDelete": !is_inbox,
        "maySubmit": true,
    })
}
