/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! EmailSubmission: queues a stored message for outbound delivery.
//! Delivery is immediate, so every accepted submission lands with
//! undoStatus "final" and updates that try to cancel it are rejected
//! with cannotUnsend. The onSuccess* arguments turn into a follow-on
//! Email/set that the request executor splices into the batch.

use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use jmap_proto::error::method::MethodError;
use jmap_proto::error::set::{SetError, SetErrorType};
use jmap_proto::method::changes::{ChangesRequest, ChangesResponse};
use jmap_proto::method::get::{GetRequest, GetResponse};
use jmap_proto::method::query::{QueryRequest, QueryResponse};
use jmap_proto::method::set::{SetRequest, SetResponse};
use jmap_proto::types::id::generate_id;
use jmap_proto::types::state::{State, StateShape};
use mail_parser::MessageParser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use store::{EntityRow, EntityType, SqlValue};

use crate::api::filter_properties;
use crate::api::set::resolve_id;
use crate::email::set::{fetch_one, resolve_email_id};
use crate::query::{compile_sql_filter, compile_sql_sort, window};
use crate::{store_fail, Account, JMAP};

/// The SMTP envelope of one submission, kept separate from the
/// message headers it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub mail_from: EnvelopeAddress,
    pub rcpt_to: Vec<EnvelopeAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeAddress {
    pub email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("recipients rejected: {0}")]
    Rejected(String),
    #[error("outbound relay unavailable: {0}")]
    Unavailable(String),
}

/// Outbound delivery seam. The production implementation relays over
/// SMTP; tests substitute an in-memory recorder.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, envelope: &Envelope, raw: &[u8]) -> Result<(), SendError>;
}

const CREATE_PROPERTIES: [&str; 3] = ["identityId", "emailId", "envelope"];

impl JMAP {
    pub async fn submission_get(
        &self,
        request: Result<GetRequest, MethodError>,
    ) -> Result<GetResponse, MethodError> {
        let request = request?;
        self.check_get_limit(&request)?;
        let account = self.account(&request.account_id)?;

        let state = self
            .store
            .current_state(&account.id, EntityType::EmailSubmission)
            .await
            .map_err(store_fail)?;
        let rows = self
            .store
            .get_entities(&account.id, EntityType::EmailSubmission)
            .await
            .map_err(store_fail)?;

        let mut list = Vec::new();
        let mut not_found = Vec::new();
        match &request.ids {
            None => {
                for row in &rows {
                    list.push(filter_properties(
                        submission_object(row),
                        request.properties.as_ref(),
                    ));
                }
            }
            Some(ids) => {
                for id in ids {
                    match rows.iter().find(|row| &row.id == id) {
                        Some(row) => list.push(filter_properties(
                            submission_object(row),
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

    pub async fn submission_changes(
        &self,
        request: Result<ChangesRequest, MethodError>,
    ) -> Result<ChangesResponse, MethodError> {
        let request = request?;
        self.account(&request.account_id)?;
        Ok(self
            .scalar_changes(EntityType::EmailSubmission, &request)
            .await?
            .response)
    }

    pub async fn submission_query(
        &self,
        request: Result<QueryRequest, MethodError>,
    ) -> Result<QueryResponse, MethodError> {
        let request = request?;
        let account = self.account(&request.account_id)?;

        let (where_sql, where_params) = compile_sql_filter(request.filter.as_ref(), &leaf)?;
        let order_sql = compile_sql_sort(
            request.sort.as_deref(),
            &|property| match property {
                "emailId" => Some("json_extract(properties, '$.emailId')".to_string()),
                "sendAt" => Some("json_extract(properties, '$.sendAt')".to_string()),
                _ => None,
            },
            "json_extract(properties, '$.sendAt')",
        )?;

        let ids = self
            .store
            .query_entities(
                &account.id,
                EntityType::EmailSubmission,
                where_sql,
                where_params,
                order_sql,
            )
            .await
            .map_err(store_fail)?;
        let state = self
            .store
            .current_state(&account.id, EntityType::EmailSubmission)
            .await
            .map_err(store_fail)?;

        let win = window(ids, &request, self.config.query_max_results)?;
        Ok(QueryResponse {
            account_id: request.account_id,
            query_state: State::Scalar(state),
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

    pub async fn submission_set(
        &self,
        request: Result<SetRequest, MethodError>,
        created_ids: &mut AHashMap<String, String>,
    ) -> Result<(SetResponse, Option<SetRequest>), MethodError> {
        let request = request?;
        self.check_set_limit(&request)?;
        let account = self.account(&request.account_id)?;

        let old_state = self
            .store
            .current_state(&account.id, EntityType::EmailSubmission)
            .await
            .map_err(store_fail)?;
        if let Some(if_in_state) = &request.if_in_state {
            if State::parse(if_in_state, StateShape::Scalar) != Some(State::Scalar(old_state)) {
                return Err(MethodError::StateMismatch(State::Scalar(old_state)));
            }
        }

        let mut response = SetResponse::new(&request.account_id, State::Scalar(old_state));
        let mut batch_state = None;
        // submission id -> emailId, for resolving onSuccess* targets
        // without re-reading rows created in this very call.
        let mut email_of: AHashMap<String, String> = AHashMap::new();

        if let Some(create) = &request.create {
            let mut creation_ids: Vec<&String> = create.keys().collect();
            creation_ids.sort();
            for creation_id in creation_ids {
                match self
                    .create_submission(&account, &create[creation_id], created_ids, &mut batch_state)
                    .await?
                {
                    Ok((id, email_id, object)) => {
                        created_ids.insert(creation_id.clone(), id.clone());
                        email_of.insert(id, email_id);
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
                    .update_submission(&account, id_ref, &update[id_ref], created_ids)
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
                let Some(id) = resolve_id(id_ref, created_ids).map(str::to_string) else {
                    response
                        .not_destroyed
                        .insert(id_ref.clone(), SetError::not_found());
                    continue;
                };
                let state = self
                    .batch_advance(&account.id, EntityType::EmailSubmission, &mut batch_state)
                    .await?;
                if self
                    .store
                    .destroy_entity(&account.id, EntityType::EmailSubmission, &id, state)
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
        let follow_on = self
            .build_follow_on(&account, &request, &response, &email_of)
            .await?;
        Ok((response, follow_on))
    }

    async fn create_submission(
        &self,
        account: &Account,
        props: &serde_json::Map<String, Value>,
        created_ids: &AHashMap<String, String>,
        batch_state: &mut Option<u64>,
    ) -> Result<Result<(String, String, Value), SetError>, MethodError> {
        for key in props.keys() {
            if !CREATE_PROPERTIES.contains(&key.as_str()) {
                return Ok(Err(SetError::invalid_properties()
                    .with_property(key.clone())
                    .with_description("Unknown property.")));
            }
        }

        let Some(identity_id) = props
            .get("identityId")
            .and_then(|v| v.as_str())
            .and_then(|id| resolve_id(id, created_ids))
            .map(str::to_string)
        else {
            return Ok(Err(SetError::invalid_properties()
                .with_property("identityId")
                .with_description("identityId is required.")));
        };
        let Some(identity) = self
            .store
            .get_entity(&account.id, EntityType::Identity, &identity_id)
            .await
            .map_err(store_fail)?
            .filter(|row| !row.is_destroyed())
        else {
            return Ok(Err(SetError::invalid_properties()
                .with_property("identityId")
                .with_description("No such identity.")));
        };

        let mut imap = account.imap.lock().await;
        let mail_state = imap.mail_state().await.map_err(crate::imap_fail)?;
        let Some(email_id) = props
            .get("emailId")
            .and_then(|v| v.as_str())
            .and_then(|id| {
                resolve_email_id(id, created_ids, mail_state.uid_validity).ok()
            })
        else {
            return Ok(Err(SetError::invalid_properties()
                .with_property("emailId")
                .with_description("No such message.")));
        };
        let message = match fetch_one(imap.as_mut(), email_id.uid).await {
            Ok(message) => message,
            Err(_) => {
                return Ok(Err(SetError::invalid_properties()
                    .with_property("emailId")
                    .with_description("No such message.")));
            }
        };
        drop(imap);

        let envelope = match props.get("envelope") {
            Some(value) => match serde_json::from_value::<Envelope>(value.clone()) {
                Ok(envelope) => envelope,
                Err(err) => {
                    return Ok(Err(SetError::invalid_properties()
                        .with_property("envelope")
                        .with_description(format!("Invalid envelope: {err}."))));
                }
            },
            None => match derive_envelope(&identity, &message.raw) {
                Some(envelope) => envelope,
                None => {
                    return Ok(Err(SetError::new(SetErrorType::NoRecipients)
                        .with_description("The message has no recipients.")));
                }
            },
        };
        if envelope.rcpt_to.is_empty() {
            return Ok(Err(SetError::new(SetErrorType::NoRecipients)
                .with_description("The envelope has no recipients.")));
        }

        if let Err(err) = account.sender.send(&envelope, &message.raw).await {
            return Ok(Err(match err {
                SendError::Rejected(reason) => {
                    SetError::new(SetErrorType::InvalidRecipients).with_description(reason)
                }
                SendError::Unavailable(reason) => {
                    SetError::new(SetErrorType::ForbiddenToSend).with_description(reason)
                }
            }));
        }

        let id = generate_id();
        let email_id = email_id.to_string();
        let send_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let mut properties = serde_json::Map::new();
        properties.insert("identityId".to_string(), Value::String(identity_id));
        properties.insert("emailId".to_string(), Value::String(email_id.clone()));
        properties.insert(
            "envelope".to_string(),
            serde_json::to_value(&envelope).unwrap_or(Value::Null),
        );
        properties.insert("sendAt".to_string(), Value::String(send_at.clone()));
        properties.insert(
            "undoStatus".to_string(),
            Value::String("final".to_string()),
        );

        let state = self
            .batch_advance(&account.id, EntityType::EmailSubmission, batch_state)
            .await?;
        self.store
            .insert_entity(&account.id, EntityType::EmailSubmission, &id, &properties, state)
            .await
            .map_err(store_fail)?;
        tracing::debug!(account = %account.id, id = %id, email_id = %email_id, "Submitted message");

        let object = serde_json::json!({
            "id": id,
            "sendAt": send_at,
            "undoStatus": "final",
        });
        Ok(Ok((id, email_id, object)))
    }

    async fn update_submission(
        &self,
        account: &Account,
        id_ref: &str,
        patch: &serde_json::Map<String, Value>,
        created_ids: &AHashMap<String, String>,
    ) -> Result<Result<String, SetError>, MethodError> {
        let Some(id) = resolve_id(id_ref, created_ids).map(str::to_string) else {
            return Ok(Err(SetError::not_found()));
        };
        if self
            .store
            .get_entity(&account.id, EntityType::EmailSubmission, &id)
            .await
            .map_err(store_fail)?
            .filter(|row| !row.is_destroyed())
            .is_none()
        {
            return Ok(Err(SetError::not_found()));
        }

        if let Some((key, value)) = patch.iter().next() {
            if key == "undoStatus" && value.as_str() == Some("canceled") {
                return Ok(Err(SetError::new(SetErrorType::CannotUnsend)
                    .with_description("The message has already been sent.")));
            }
            return Ok(Err(SetError::invalid_patch()
                .with_property(key.clone())
                .with_description("Property may not be changed.")));
        }
        // An empty patch leaves the row untouched.
        Ok(Ok(id))
    }

    /// Resolves the onSuccess* arguments against the submissions that
    /// actually succeeded and folds them into one Email/set request.
    async fn build_follow_on(
        &self,
        account: &Account,
        request: &SetRequest,
        response: &SetResponse,
        email_of: &AHashMap<String, String>,
    ) -> Result<Option<SetRequest>, MethodError> {
        let mut update: AHashMap<String, serde_json::Map<String, Value>> = AHashMap::new();
        let mut destroy: Vec<String> = Vec::new();
        let mut destroy_seen: AHashSet<String> = AHashSet::new();

        if let Some(on_update) = &request.on_success_update_email {
            let mut keys: Vec<&String> = on_update.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(email_id) = self
                    .follow_on_target(account, key, response, email_of)
                    .await?
                {
                    update.insert(email_id, on_update[key].clone());
                }
            }
        }
        if let Some(on_destroy) = &request.on_success_destroy_email {
            for key in on_destroy {
                if let Some(email_id) = self
                    .follow_on_target(account, key, response, email_of)
                    .await?
                {
                    if destroy_seen.insert(email_id.clone()) {
                        destroy.push(email_id);
                    }
                }
            }
        }

        if update.is_empty() && destroy.is_empty() {
            return Ok(None);
        }
        Ok(Some(SetRequest {
            account_id: request.account_id.clone(),
            if_in_state: None,
            create: None,
            update: (!update.is_empty()).then_some(update),
            destroy: (!destroy.is_empty()).then_some(destroy),
            on_success_update_email: None,
            on_success_destroy_email: None,
        }))
    }

    /// Maps an onSuccess* key (a submission id or `#creationId`) to
    /// the emailId of a submission that succeeded in this call. Keys
    /// naming failed or unknown submissions are silently skipped.
    async fn follow_on_target(
        &self,
        account: &Account,
        key: &str,
        response: &SetResponse,
        email_of: &AHashMap<String, String>,
    ) -> Result<Option<String>, MethodError> {
        let id = match key.strip_prefix('#') {
            Some(creation_id) => match response.created_id(creation_id) {
                Some(id) => id.to_string(),
                None => return Ok(None),
            },
            None => key.to_string(),
        };
        if let Some(email_id) = email_of.get(&id) {
            return Ok(Some(email_id.clone()));
        }
        Ok(self
            .store
            .get_entity(&account.id, EntityType::EmailSubmission, &id)
            .await
            .map_err(store_fail)?
            .and_then(|row| {
                row.properties
                    .get("emailId")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            }))
    }
}

fn submission_object(row: &EntityRow) -> serde_json::Map<String, Value> {
    let mut object = row.properties.clone();
    object.insert("id".to_string(), Value::String(row.id.clone()));
    object
}

/// Builds the envelope the way a submitting client would: sender from
/// the identity, recipients from the To/Cc/Bcc headers of the stored
/// message. Returns None when no recipient can be found.
fn derive_envelope(identity: &EntityRow, raw: &[u8]) -> Option<Envelope> {
    let mail_from = EnvelopeAddress {
        email: identity
            .properties
            .get("email")
            .and_then(|v| v.as_str())?
            .to_string(),
    };

    let mut rcpt_to = Vec::new();
    let mut seen = AHashSet::new();
    if let Some(message) = MessageParser::default().parse(raw) {
        for address in [message.to(), message.cc(), message.bcc()]
            .into_iter()
            .flatten()
        {
            match address {
                mail_parser::Address::List(addrs) => {
                    push_recipients(&mut rcpt_to, &mut seen, addrs);
                }
                mail_parser::Address::Group(groups) => {
                    for group in groups {
                        push_recipients(&mut rcpt_to, &mut seen, &group.addresses);
                    }
                }
            }
        }
    }
    if rcpt_to.is_empty() {
        return None;
    }
    Some(Envelope { mail_from, rcpt_to })
}

fn push_recipients(
    rcpt_to: &mut Vec<EnvelopeAddress>,
    seen: &mut AHashSet<String>,
    addrs: &[mail_parser::Addr<'_>],
) {
    for addr in addrs {
        if let Some(email) = addr.address.as_deref() {
            if seen.insert(email.to_string()) {
                rcpt_to.push(EnvelopeAddress {
                    email: email.to_string(),
                });
            }
        }
    }
}

fn leaf(field: &str, value: &Value) -> Result<(String, Vec<SqlValue>), MethodError> {
    let unsupported =
        || MethodError::UnsupportedFilter(format!("Unsupported submission filter {field:?}."));
    Ok(match (field, value) {
        ("identityIds", Value::Array(ids)) | ("emailIds", Value::Array(ids)) => {
            let column = if field == "identityIds" {
                "json_extract(properties, '$.identityId')"
            } else {
                "json_extract(properties, '$.emailId')"
            };
            let mut params = Vec::with_capacity(ids.len());
            for id in ids {
                match id.as_str() {
                    Some(id) => params.push(SqlValue::Text(id.to_string())),
                    None => return Err(unsupported()),
                }
            }
            if params.is_empty() {
                ("0 = 1".to_string(), Vec::new())
            } else {
                let marks = vec!["?"; params.len()].join(", ");
                (format!("{column} IN ({marks})"), params)
            }
        }
        ("undoStatus", Value::String(status)) => (
            "json_extract(properties, '$.undoStatus') = ?".to_string(),
            vec![SqlValue::Text(status.clone())],
        ),
        // RFC 3339 timestamps in UTC compare correctly as text.
        ("before", Value::String(date)) => (
            "json_extract(properties, '$.sendAt') < ?".to_string(),
            vec![SqlValue::Text(date.clone())],
        ),
        ("after", Value::String(date)) => (
            "json_extract(properties, '$.sendAt') >= ?".to_string(),
            vec![SqlValue::Text(date.clone())],
        ),
        _ => return Err(unsupported()),
    })
}
