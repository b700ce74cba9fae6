/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Identity/get, /changes and /set. Identities live entirely in the
//! cache store; the IMAP backend is never consulted. The `email`
//! property is immutable after create.

use ahash::AHashMap;
use jmap_proto::error::method::MethodError;
use jmap_proto::error::set::SetError;
use jmap_proto::method::changes::{ChangesRequest, ChangesResponse};
use jmap_proto::method::get::{GetRequest, GetResponse};
use jmap_proto::method::set::{SetRequest, SetResponse};
use jmap_proto::types::id::generate_id;
use jmap_proto::types::state::{State, StateShape};
use serde_json::Value;
use store::{EntityRow, EntityType};

use crate::api::filter_properties;
use crate::api::set::{apply_patch, resolve_id};
use crate::{store_fail, JMAP};

const PROPERTIES: [&str; 6] = [
    "name",
    "email",
    "replyTo",
    "bcc",
    "textSignature",
    "htmlSignature",
];

impl JMAP {
    pub async fn identity_get(
        &self,
        request: Result<GetRequest, MethodError>,
    ) -> Result<GetResponse, MethodError> {
        let request = request?;
        self.check_get_limit(&request)?;
        let account = self.account(&request.account_id)?;

        let state = self
            .store
            .current_state(&account.id, EntityType::Identity)
            .await
            .map_err(store_fail)?;
        let rows = self
            .store
            .get_entities(&account.id, EntityType::Identity)
            .await
            .map_err(store_fail)?;

        let mut list = Vec::new();
        let mut not_found = Vec::new();
        match &request.ids {
            None => {
                for row in &rows {
                    list.push(filter_properties(
                        identity_object(row),
                        request.properties.as_ref(),
                    ));
                }
            }
            Some(ids) => {
                for id in ids {
                    match rows.iter().find(|row| &row.id == id) {
                        Some(row) => list.push(filter_properties(
                            identity_object(row),
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

    pub async fn identity_changes(
        &self,
        request: Result<ChangesRequest, MethodError>,
    ) -> Result<ChangesResponse, MethodError> {
        let request = request?;
        self.account(&request.account_id)?;
        Ok(self
            .scalar_changes(EntityType::Identity, &request)
            .await?
            .response)
    }

    pub async fn identity_set(
        &self,
        request: Result<SetRequest, MethodError>,
        created_ids: &mut AHashMap<String, String>,
    ) -> Result<SetResponse, MethodError> {
        let request = request?;
        self.check_set_limit(&request)?;
        let account = self.account(&request.account_id)?;

        let old_state = self
            .store
            .current_state(&account.id, EntityType::Identity)
            .await
            .map_err(store_fail)?;
        if let Some(if_in_state) = &request.if_in_state {
            if State::parse(if_in_state, StateShape::Scalar) != Some(State::Scalar(old_state)) {
                return Err(MethodError::StateMismatch(State::Scalar(old_state)));
            }
        }

        let mut response = SetResponse::new(&request.account_id, State::Scalar(old_state));
        let mut batch_state = None;

        if let Some(create) = &request.create {
            let mut creation_ids: Vec<&String> = create.keys().collect();
            creation_ids.sort();
            for creation_id in creation_ids {
                match validate_create(&create[creation_id]) {
                    Ok(properties) => {
                        let id = generate_id();
                        let state = self
                            .batch_advance(&account.id, EntityType::Identity, &mut batch_state)
                            .await?;
                        self.store
                            .insert_entity(&account.id, EntityType::Identity, &id, &properties, state)
                            .await
                            .map_err(store_fail)?;
                        created_ids.insert(creation_id.clone(), id.clone());
                        response
                            .push_created(creation_id.clone(), serde_json::json!({ "id": id }));
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
                    .update_identity(&account.id, id_ref, &update[id_ref], created_ids, &mut batch_state)
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
                let Some(id) = resolve_id(id_ref, created_ids) else {
                    response
                        .not_destroyed
                        .insert(id_ref.clone(), SetError::not_found());
                    continue;
                };
                let id = id.to_string();
                let state = self
                    .batch_advance(&account.id, EntityType::Identity, &mut batch_state)
                    .await?;
                if self
                    .store
                    .destroy_entity(&account.id, EntityType::Identity, &id, state)
                    .await
                    .map_err(store_fail)?
                {
                    response.destroyed.push(id);
                } else {
                    response
                        .not_destroyed
                        .insert(id_ref.clone(), SetError::not_found());
                }
            }
        }

        response.new_state = State::Scalar(batch_state.unwrap_or(old_state));
        Ok(response)
    }

    async fn update_identity(
        &self,
        account_id: &str,
        id_ref: &str,
        patch: &serde_json::Map<String, Value>,
        created_ids: &AHashMap<String, String>,
        batch_state: &mut Option<u64>,
    ) -> Result<Result<String, SetError>, MethodError> {
        let Some(id) = resolve_id(id_ref, created_ids) else {
            return Ok(Err(SetError::not_found()));
        };
        let id = id.to_string();
        let Some(row) = self
            .store
            .get_entity(account_id, EntityType::Identity, &id)
            .await
            .map_err(store_fail)?
            .filter(|row| !row.is_destroyed())
        else {
            return Ok(Err(SetError::not_found()));
        };

        for key in patch.keys() {
            let base = key.split('/').next().unwrap_or(key);
            if base != "email" && !PROPERTIES.contains(&base) {
                return Ok(Err(SetError::invalid_properties()
                    .with_property(key.clone())
                    .with_description("Unknown property.")));
            }
        }

        let mut properties = row.properties;
        if let Err(err) = apply_patch(&mut properties, patch, &["email", "id"]) {
            return Ok(Err(err));
        }

        let state = self
            .batch_advance(account_id, EntityType::Identity, batch_state)
            .await?;
        if self
            .store
            .update_entity(account_id, EntityType::Identity, &id, &properties, state, false)
            .await
            .map_err(store_fail)?
        {
            Ok(Ok(id))
        } else {
            Ok(Err(SetError::not_found()))
        }
    }
}

fn identity_object(row: &EntityRow) -> serde_json::Map<String, Value> {
    let mut object = row.properties.clone();
    object.insert("id".to_string(), Value::String(row.id.clone()));
    object
        .entry("mayDelete".to_string())
        .or_insert(Value::Bool(true));
    object
}

fn validate_create(
    props: &serde_json::Map<String, Value>,
) -> Result<serde_json::Map<String, Value>, SetError> {
    for key in props.keys() {
        if !PROPERTIES.contains(&key.as_str()) {
            return Err(SetError::invalid_properties()
                .with_property(key.clone())
                .with_description("Unknown property."));
        }
    }
    match props.get("email").and_then(|v| v.as_str()) {
        Some(email) if email.contains('@') => {}
        _ => {
            return Err(SetError::invalid_properties()
                .with_property("email")
                .with_description("A valid email address is required."));
        }
    }
    Ok(props.clone())
}
