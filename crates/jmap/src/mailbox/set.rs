/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Mailbox/set: creates, renames and deletes are applied to the IMAP
//! backend first and mirrored into the cache on success. The scalar
//! state advances at most once for the whole call; every mutated row
//! shares the new value.

use ahash::AHashMap;
use jmap_proto::error::method::MethodError;
use jmap_proto::error::set::{SetError, SetErrorType};
use jmap_proto::method::set::{SetRequest, SetResponse};
use jmap_proto::types::id::generate_id;
use jmap_proto::types::state::{State, StateShape};
use serde_json::{json, Value};
use store::{EntityRow, EntityType};

use crate::api::set::{apply_patch, resolve_id};
use crate::mailbox::{prop_delimiter, prop_str, prop_u64};
use crate::{store_fail, Account, JMAP};

const MUTABLE_PROPERTIES: [&str; 4] = ["name", "parentId", "sortOrder", "isSubscribed"];

impl JMAP {
    pub async fn mailbox_set(
        &self,
        request: Result<SetRequest, MethodError>,
        created_ids: &mut AHashMap<String, String>,
    ) -> Result<SetResponse, MethodError> {
        let request = request?;
        self.check_set_limit(&request)?;
        let account = self.account(&request.account_id)?;
        self.sync_mailboxes(&account).await?;

        let old_state = self
            .store
            .current_state(&account.id, EntityType::Mailbox)
            .await
            .map_err(store_fail)?;
        if let Some(if_in_state) = &request.if_in_state {
            if State::parse(if_in_state, StateShape::Scalar) != Some(State::Scalar(old_state)) {
                return Err(MethodError::StateMismatch(State::Scalar(old_state)));
            }
        }

        let mut response = SetResponse::new(&request.account_id, State::Scalar(old_state));
        let mut batch_state = None;
        let mut rows: AHashMap<String, EntityRow> = self
            .store
            .get_entities(&account.id, EntityType::Mailbox)
            .await
            .map_err(store_fail)?
            .into_iter()
            .map(|row| (row.id.clone(), row))
            .collect();

        if let Some(create) = &request.create {
            let mut creation_ids: Vec<&String> = create.keys().collect();
            creation_ids.sort();
            for creation_id in creation_ids {
                match self
                    .create_one(&account, &create[creation_id], created_ids, &mut rows, &mut batch_state)
                    .await?
                {
                    Ok((id, object)) => {
                        created_ids.insert(creation_id.clone(), id);
                        response.push_created(creation_id.clone(), object);
                    }
                    Err(err) => {
                        response.not_created.insert(creation_id.clone(), err);
                    }
                }
            }
        }

        if let Some(update) = &request.update {
            let mut ids: Vec<&String> = update.keys().collect();
            ids.sort();
            for id_ref in ids {
                match self
                    .update_one(&account, id_ref, &update[id_ref], created_ids, &mut rows, &mut batch_state)
                    .await?
                {
                    Ok(id) => {
                        response.updated.insert(id, None);
                    }
                    Err(err) => {
                        response.not_updated.insert(id_ref.clone(), err);
                    }
                }
            }
        }

        if let Some(destroy) = &request.destroy {
            for id_ref in destroy {
                match self
                    .destroy_one(&account, id_ref, created_ids, &mut rows, &mut batch_state)
                    .await?
                {
                    Ok(id) => response.destroyed.push(id),
                    Err(err) => {
                        response.not_destroyed.insert(id_ref.clone(), err);
                    }
                }
            }
        }

        response.new_state = State::Scalar(batch_state.unwrap_or(old_state));
        Ok(response)
    }

    async fn create_one(
        &self,
        account: &Account,
        props: &serde_json::Map<String, Value>,
        created_ids: &AHashMap<String, String>,
        rows: &mut AHashMap<String, EntityRow>,
        batch_state: &mut Option<u64>,
    ) -> Result<Result<(String, Value), SetError>, MethodError> {
        for key in props.keys() {
            if !MUTABLE_PROPERTIES.contains(&key.as_str()) {
                return Ok(Err(SetError::invalid_properties()
                    .with_description(format!("Property {key:?} may not be set."))
                    .with_property(key)));
            }
        }
        let (parent_id, parent_imap, delim) = match props.get("parentId") {
            None | Some(Value::Null) => (Value::Null, None, '/'),
            Some(Value::String(parent_ref)) => {
                let Some(parent_id) = resolve_id(parent_ref, created_ids) else {
                    return Ok(Err(invalid_parent()));
                };
                let Some(parent) = rows.get(parent_id) else {
                    return Ok(Err(invalid_parent()));
                };
                let Some(parent_imap) = prop_str(parent, "imapName") else {
                    return Ok(Err(invalid_parent()));
                };
                (
                    Value::String(parent_id.to_string()),
                    Some(parent_imap.to_string()),
                    prop_delimiter(parent),
                )
            }
            Some(_) => return Ok(Err(invalid_parent())),
        };
        let name = match props.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() && !name.contains(delim) => name,
            _ => {
                return Ok(Err(SetError::invalid_properties()
                    .with_description("A valid mailbox name is required.")
                    .with_property("name")))
            }
        };

        let imap_name = match &parent_imap {
            Some(parent) => format!("{parent}{delim}{name}"),
            None => name.to_string(),
        };
        if let Err(err) = account.imap.lock().await.create_mailbox(&imap_name).await {
            return Ok(Err(SetError::forbidden().with_description(err.to_string())));
        }

        let id = generate_id();
        let sort_order = props.get("sortOrder").and_then(Value::as_u64).unwrap_or(0);
        let properties = match json!({
            "name": name,
            "parentId": parent_id,
            "role": Value::Null,
            "sortOrder": sort_order,
            "imapName": imap_name,
            "imapDelimiter": delim.to_string(),
            "totalEmails": 0,
            "unreadEmails": 0,
            "isSubscribed": props.get("isSubscribed").and_then(Value::as_bool).unwrap_or(true),
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let state = self.batch_advance(&account.id, EntityType::Mailbox, batch_state).await?;
        self.store
            .insert_entity(&account.id, EntityType::Mailbox, &id, &properties, state)
            .await
            .map_err(store_fail)?;
        rows.insert(
            id.clone(),
            EntityRow {
                id: id.clone(),
                properties,
                created: state,
                updated: None,
                updated_non_counts: None,
                destroyed: None,
            },
        );

        let object = json!({
            "id": id,
            "role": Value::Null,
            "sortOrder": sort_order,
            "totalEmails": 0,
            "unreadEmails": 0,
            "totalThreads": 0,
            "unreadThreads": 0,
            "isSubscribed": true,
        });
        Ok(Ok((id, object)))
    }

    async fn update_one(
        &self,
        account: &Account,
        id_ref: &str,
        patch: &serde_json::Map<String, Value>,
        created_ids: &AHashMap<String, String>,
        rows: &mut AHashMap<String, EntityRow>,
        batch_state: &mut Option<u64>,
    ) -> Result<Result<String, SetError>, MethodError> {
        let Some(id) = resolve_id(id_ref, created_ids).map(str::to_string) else {
            return Ok(Err(SetError::not_found()));
        };
        let Some(row) = rows.get(&id) else {
            return Ok(Err(SetError::not_found()));
        };
        for key in patch.keys() {
            let property = key.split('/').next().unwrap_or(key);
            if !MUTABLE_PROPERTIES.contains(&property) {
                return Ok(Err(SetError::invalid_properties()
                    .with_description(format!("Property {property:?} may not be changed."))
                    .with_property(property)));
            }
        }

        let mut properties = row.properties.clone();
        if let Err(err) = apply_patch(&mut properties, patch, &[]) {
            return Ok(Err(err));
        }
        let old_imap = prop_str(row, "imapName").unwrap_or_default().to_string();
        let old_delim = prop_delimiter(row);
        let (parent_imap, delim) = match properties.get("parentId") {
            None | Some(Value::Null) => (None, prop_delimiter(row)),
            Some(Value::String(parent_id)) => {
                if parent_id == &id || is_descendant(rows, parent_id, &id) {
                    return Ok(Err(invalid_parent()));
                }
                let Some(parent) = rows.get(parent_id) else {
                    return Ok(Err(invalid_parent()));
                };
                (
                    Some(prop_str(parent, "imapName").unwrap_or_default().to_string()),
                    prop_delimiter(parent),
                )
            }
            Some(_) => return Ok(Err(invalid_parent())),
        };
        let name = match properties.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() && !name.contains(delim) => name.to_string(),
            _ => {
                return Ok(Err(SetError::invalid_properties()
                    .with_description("A valid mailbox name is required.")
                    .with_property("name")))
            }
        };
        let new_imap = match parent_imap {
            Some(parent) => format!("{parent}{delim}{name}"),
            None => name,
        };

        if new_imap != old_imap {
            if let Err(err) = account
                .imap
                .lock()
                .await
                .rename_mailbox(&old_imap, &new_imap)
                .await
            {
                return Ok(Err(SetError::forbidden().with_description(err.to_string())));
            }
            properties.insert("imapName".to_string(), Value::String(new_imap.clone()));
            properties.insert("imapDelimiter".to_string(), Value::String(delim.to_string()));
            self.rewrite_descendants(account, rows, &old_imap, old_delim, &new_imap, delim)
                .await?;
        }

        let state = self.batch_advance(&account.id, EntityType::Mailbox, batch_state).await?;
        if !self
            .store
            .update_entity(&account.id, EntityType::Mailbox, &id, &properties, state, false)
            .await
            .map_err(store_fail)?
        {
            return Ok(Err(SetError::not_found()));
        }
        if let Some(row) = rows.get_mut(&id) {
            row.properties = properties;
        }
        Ok(Ok(id))
    }

    async fn destroy_one(
        &self,
        account: &Account,
        id_ref: &str,
        created_ids: &AHashMap<String, String>,
        rows: &mut AHashMap<String, EntityRow>,
        batch_state: &mut Option<u64>,
    ) -> Result<Result<String, SetError>, MethodError> {
        let Some(id) = resolve_id(id_ref, created_ids).map(str::to_string) else {
            return Ok(Err(SetError::not_found()));
        };
        let Some(row) = rows.get(&id) else {
            return Ok(Err(SetError::not_found()));
        };
        if rows
            .values()
            .any(|other| other.properties.get("parentId").and_then(Value::as_str) == Some(&id))
        {
            return Ok(Err(SetError::new(SetErrorType::MailboxHasChild)
                .with_description("Mailbox has at least one child.")));
        }
        if prop_u64(row, "totalEmails") > 0 {
            return Ok(Err(SetError::new(SetErrorType::MailboxHasEmail)
                .with_description("Mailbox is not empty.")));
        }
        let imap_name = prop_str(row, "imapName").unwrap_or_default().to_string();
        if let Err(err) = account.imap.lock().await.delete_mailbox(&imap_name).await {
            return Ok(Err(SetError::forbidden().with_description(err.to_string())));
        }

        let state = self.batch_advance(&account.id, EntityType::Mailbox, batch_state).await?;
        if !self
            .store
            .destroy_entity(&account.id, EntityType::Mailbox, &id, state)
            .await
            .map_err(store_fail)?
        {
            return Ok(Err(SetError::not_found()));
        }
        rows.remove(&id);
        Ok(Ok(id))
    }

    /// A backend rename moves the whole subtree; child rows keep their
    /// ids and JMAP properties but need their imapName prefix fixed,
    /// without surfacing as changes.
    async fn rewrite_descendants(
        &self,
        account: &Account,
        rows: &mut AHashMap<String, EntityRow>,
        old_prefix: &str,
        old_delim: char,
        new_prefix: &str,
        new_delim: char,
    ) -> Result<(), MethodError> {
        let old_prefix = format!("{old_prefix}{old_delim}");
        for row in rows.values_mut() {
            let Some(imap_name) = prop_str(row, "imapName") else {
                continue;
            };
            if let Some(suffix) = imap_name.strip_prefix(&old_prefix) {
                let renamed = format!("{new_prefix}{new_delim}{suffix}");
                row.properties
                    .insert("imapName".to_string(), Value::String(renamed));
                self.store
                    .rewrite_entity(&account.id, EntityType::Mailbox, &row.id, &row.properties)
                    .await
                    .map_err(store_fail)?;
            }
        }
        Ok(())
    }
}

fn invalid_parent() -> SetError {
    SetError::invalid_properties()
        .with_description("Parent mailbox not found.")
        .with_property("parentId")
}

fn is_descendant(rows: &AHashMap<String, EntityRow>, candidate: &str, ancestor: &str) -> bool {
    let mut current = Some(candidate.to_string());
    let mut hops = 0;
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        // Parent chains are short; the hop guard only protects
        // against a corrupted cache cycle.
        hops += 1;
        if hops > 100 {
            return true;
        }
        current = rows
            .get(&id)
            .and_then(|row| row.properties.get("parentId"))
            .and_then(Value::as_str)
            .map(str::to_string);
    }
    false
}
