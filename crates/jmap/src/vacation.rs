/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! VacationResponse is a singleton: the only valid id is
//! "singleton", creates and destroys are rejected outright, and a
//! get before the first update answers with defaults.

use ahash::AHashMap;
use jmap_proto::error::method::MethodError;
use jmap_proto::error::set::{SetError, SetErrorType};
use jmap_proto::method::get::{GetRequest, GetResponse};
use jmap_proto::method::set::{SetRequest, SetResponse};
use jmap_proto::types::id::SINGLETON_ID;
use jmap_proto::types::state::{State, StateShape};
use serde_json::Value;
use store::EntityType;

use crate::api::filter_properties;
use crate::api::set::apply_patch;
use crate::{store_fail, JMAP};

const PROPERTIES: [&str; 6] = [
    "isEnabled",
    "fromDate",
    "toDate",
    "subject",
    "textBody",
    "htmlBody",
];

impl JMAP {
    pub async fn vacation_get(
        &self,
        request: Result<GetRequest, MethodError>,
    ) -> Result<GetResponse, MethodError> {
        let request = request?;
        self.check_get_limit(&request)?;
        let account = self.account(&request.account_id)?;

        let state = self
            .store
            .current_state(&account.id, EntityType::VacationResponse)
            .await
            .map_err(store_fail)?;
        let row = self
            .store
            .get_entity(&account.id, EntityType::VacationResponse, SINGLETON_ID)
            .await
            .map_err(store_fail)?
            .filter(|row| !row.is_destroyed());

        let mut list = Vec::new();
        let mut not_found = Vec::new();
        let wants_singleton = match &request.ids {
            None => true,
            Some(ids) => {
                let mut wanted = false;
                for id in ids {
                    if id == SINGLETON_ID {
                        wanted = true;
                    } else {
                        not_found.push(id.clone());
                    }
                }
                wanted
            }
        };
        if wants_singleton {
            let mut object = serde_json::Map::new();
            object.insert("id".to_string(), Value::String(SINGLETON_ID.to_string()));
            object.insert("isEnabled".to_string(), Value::Bool(false));
            if let Some(row) = &row {
                for (key, value) in &row.properties {
                    object.insert(key.clone(), value.clone());
                }
            }
            list.push(filter_properties(object, request.properties.as_ref()));
        }

        Ok(GetResponse {
            account_id: request.account_id,
            state: State::Scalar(state),
            list,
            not_found,
        })
    }

    pub async fn vacation_set(
        &self,
        request: Result<SetRequest, MethodError>,
        _created_ids: &mut AHashMap<String, String>,
    ) -> Result<SetResponse, MethodError> {
        let request = request?;
        self.check_set_limit(&request)?;
        let account = self.account(&request.account_id)?;

        let old_state = self
            .store
            .current_state(&account.id, EntityType::VacationResponse)
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
            for creation_id in create.keys() {
                response.not_created.insert(
                    creation_id.clone(),
                    SetError::new(SetErrorType::Singleton)
                        .with_description("The vacation response is a singleton."),
                );
            }
        }

        if let Some(update) = &request.update {
            let mut ids: Vec<&String> = update.keys().collect();
            ids.sort();
            for id in ids {
                match self
                    .update_vacation(&account.id, id, &update[id], &mut batch_state)
                    .await?
                {
                    Ok(()) => {
                        response.updated.insert(id.clone(), None);
                    }
                    Err(err) => {
                        response.not_updated.insert(id.clone(), err);
                    }
                }
            }
        }

        if let Some(destroy) = &request.destroy {
            for id in destroy {
                response.not_destroyed.insert(
                    id.clone(),
                    SetError::new(SetErrorType::Singleton)
                        .with_description("The vacation response may not be destroyed."),
                );
            }
        }

        response.new_state = State::Scalar(batch_state.unwrap_or(old_state));
        Ok(response)
    }

    async fn update_vacation(
        &self,
        account_id: &str,
        id: &str,
        patch: &serde_json::Map<String, Value>,
        batch_state: &mut Option<u64>,
    ) -> Result<Result<(), SetError>, MethodError> {
        if id != SINGLETON_ID {
            return Ok(Err(SetError::not_found()));
        }
        for key in patch.keys() {
            let base = key.split('/').next().unwrap_or(key);
            if !PROPERTIES.contains(&base) {
                return Ok(Err(SetError::invalid_properties()
                    .with_property(key.clone())
                    .with_description("Unknown property.")));
            }
        }

        let existing = self
            .store
            .get_entity(account_id, EntityType::VacationResponse, SINGLETON_ID)
            .await
            .map_err(store_fail)?
            .filter(|row| !row.is_destroyed());
        let mut properties = existing
            .as_ref()
            .map(|row| row.properties.clone())
            .unwrap_or_default();
        properties
            .entry("isEnabled".to_string())
            .or_insert(Value::Bool(false));
        if let Err(err) = apply_patch(&mut properties, patch, &["id"]) {
            return Ok(Err(err));
        }

        let state = self
            .batch_advance(account_id, EntityType::VacationResponse, batch_state)
            .await?;
        if existing.is_some() {
            self.store
                .update_entity(
                    account_id,
                    EntityType::VacationResponse,
                    SINGLETON_ID,
                    &properties,
                    state,
                    false,
                )
                .await
                .map_err(store_fail)?;
        } else {
            self.store
                .insert_entity(
                    account_id,
                    EntityType::VacationResponse,
                    SINGLETON_ID,
                    &properties,
                    state,
                )
                .await
                .map_err(store_fail)?;
        }
        Ok(Ok(()))
    }
}
