/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Email/set compiles JMAP mutations into IMAP commands: creates are
//! APPENDs sourced from an uploaded blob, keyword and mailbox patches
//! become STORE and MOVE diffs, destroys are UID EXPUNGE. Message
//! content is immutable; only keywords and mailboxIds may change.

use ahash::{AHashMap, AHashSet};
use jmap_proto::error::method::MethodError;
use jmap_proto::error::set::{SetError, SetErrorType};
use jmap_proto::method::set::{SetRequest, SetResponse};
use jmap_proto::types::id::EmailId;
use jmap_proto::types::keyword::Keyword;
use jmap_proto::types::state::{MailState, State, StateShape};
use serde_json::{json, Map, Value};

use crate::api::set::{apply_patch, resolve_id};
use crate::imap::{ImapSession, StoreAction};
use crate::{imap_fail, JMAP};

impl JMAP {
    pub async fn email_set(
        &self,
        request: Result<SetRequest, MethodError>,
        created_ids: &mut AHashMap<String, String>,
    ) -> Result<SetResponse, MethodError> {
        let request = request?;
        self.check_set_limit(&request)?;
        let account = self.account(&request.account_id)?;
        self.sync_mailboxes(&account).await?;
        let imap_by_id = self.mailbox_imap_by_id(&account.id).await?;
        let id_by_imap = self.mailbox_id_map(&account.id).await?;

        let mut imap = account.imap.lock().await;
        let old_state = imap.mail_state().await.map_err(imap_fail)?;
        if let Some(if_in_state) = &request.if_in_state {
            if State::parse(if_in_state, StateShape::Mail) != Some(State::Mail(old_state)) {
                return Err(MethodError::StateMismatch(State::Mail(old_state)));
            }
        }

        let mut response = SetResponse::new(&request.account_id, State::Mail(old_state));

        if let Some(create) = &request.create {
            let mut creation_ids: Vec<&String> = create.keys().collect();
            creation_ids.sort();
            for creation_id in creation_ids {
                match self
                    .create_email(
                        &account,
                        imap.as_mut(),
                        &create[creation_id],
                        created_ids,
                        &imap_by_id,
                        old_state.uid_validity,
                    )
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
                match update_email(
                    imap.as_mut(),
                    id_ref,
                    &update[id_ref],
                    created_ids,
                    &imap_by_id,
                    &id_by_imap,
                    old_state.uid_validity,
                )
                .await
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
                match destroy_email(imap.as_mut(), id_ref, created_ids, old_state.uid_validity)
                    .await
                {
                    Ok(id) => response.destroyed.push(id),
                    Err(err) => {
                        response.not_destroyed.insert(id_ref.clone(), err);
                    }
                }
            }
        }

        response.new_state = State::Mail(imap.mail_state().await.map_err(imap_fail)?);
        Ok(response)
    }

    async fn create_email(
        &self,
        account: &crate::Account,
        imap: &mut dyn ImapSession,
        props: &Map<String, Value>,
        created_ids: &AHashMap<String, String>,
        imap_by_id: &AHashMap<String, String>,
        uid_validity: u32,
    ) -> Result<Result<(String, Value), SetError>, MethodError> {
        for key in props.keys() {
            if !matches!(key.as_str(), "mailboxIds" | "keywords" | "blobId") {
                return Ok(Err(SetError::invalid_properties()
                    .with_description(format!("Property {key:?} may not be set."))
                    .with_property(key)));
            }
        }

        let mut mailboxes = Vec::new();
        if let Some(Value::Object(mailbox_ids)) = props.get("mailboxIds") {
            for (id_ref, member) in mailbox_ids {
                if member.as_bool() != Some(true) {
                    continue;
                }
                let imap_name = resolve_id(id_ref, created_ids)
                    .and_then(|id| imap_by_id.get(id));
                match imap_name {
                    Some(imap_name) => mailboxes.push(imap_name.clone()),
                    None => {
                        return Ok(Err(SetError::invalid_properties()
                            .with_description(format!("Mailbox {id_ref:?} not found."))
                            .with_property("mailboxIds")))
                    }
                }
            }
        }
        if mailboxes.is_empty() {
            return Ok(Err(SetError::invalid_properties()
                .with_description("At least one mailbox is required.")
                .with_property("mailboxIds")));
        }

        let Some(blob_id) = props.get("blobId").and_then(Value::as_str) else {
            return Ok(Err(SetError::invalid_properties()
                .with_description("Creation requires a blobId with the raw message.")
                .with_property("blobId")));
        };
        let raw = match account.blobs.get(&account.id, blob_id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                return Ok(Err(SetError::new(SetErrorType::BlobNotFound)
                    .with_description(format!("Blob {blob_id:?} not found."))))
            }
            Err(err) => {
                return Ok(Err(SetError::new(SetErrorType::BlobNotFound)
                    .with_description(err.to_string())))
            }
        };

        let flags = keyword_flags(props.get("keywords"));
        let uid = match imap.append(&mailboxes[0], &flags, &raw).await {
            Ok(uid) => uid,
            Err(err) => {
                return Ok(Err(SetError::forbidden().with_description(err.to_string())))
            }
        };
        if mailboxes.len() > 1 {
            if let Err(err) = imap.uid_move(&[uid], &mailboxes[1..], &[]).await {
                return Ok(Err(SetError::partial_fail().with_description(err.to_string())));
            }
        }

        let id = EmailId::new(uid_validity, uid);
        let object = json!({
            "id": id,
            "blobId": id,
            "threadId": self.threads.thread_id(&id),
            "size": raw.len(),
        });
        Ok(Ok((id.to_string(), object)))
    }
}

async fn update_email(
    imap: &mut dyn ImapSession,
    id_ref: &str,
    patch: &Map<String, Value>,
    created_ids: &AHashMap<String, String>,
    imap_by_id: &AHashMap<String, String>,
    id_by_imap: &AHashMap<String, String>,
    uid_validity: u32,
) -> Result<String, SetError> {
    let email_id = resolve_email_id(id_ref, created_ids, uid_validity)?;

    for key in patch.keys() {
        let property = key.split('/').next().unwrap_or(key);
        if !matches!(property, "keywords" | "mailboxIds") {
            return Err(SetError::invalid_properties()
                .with_description("Message content is immutable.")
                .with_property(property));
        }
    }

    let message = fetch_one(imap, email_id.uid).await?;

    // Materialize the mutable view of the message, patch it, then
    // turn the difference into STORE and MOVE commands.
    let mut view = match json!({
        "keywords": super::keywords_object(&message.flags),
        "mailboxIds": super::mailbox_ids_object(&message.mailboxes, id_by_imap),
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let before = view.clone();
    apply_patch(&mut view, patch, &[])?;

    let old_flags = flag_set(&before, "keywords");
    let new_flags = flag_set(&view, "keywords");
    let add_flags: Vec<String> = new_flags.difference(&old_flags).cloned().collect();
    let del_flags: Vec<String> = old_flags.difference(&new_flags).cloned().collect();

    let old_boxes = id_set(&before, "mailboxIds");
    let new_boxes = id_set(&view, "mailboxIds");
    if new_boxes.is_empty() {
        return Err(SetError::invalid_properties()
            .with_description("A message must belong to at least one mailbox.")
            .with_property("mailboxIds"));
    }
    let mut add_boxes = Vec::new();
    for id in new_boxes.difference(&old_boxes) {
        match imap_by_id.get(id) {
            Some(imap_name) => add_boxes.push(imap_name.clone()),
            None => {
                return Err(SetError::invalid_properties()
                    .with_description(format!("Mailbox {id:?} not found."))
                    .with_property("mailboxIds"))
            }
        }
    }
    let del_boxes: Vec<String> = old_boxes
        .difference(&new_boxes)
        .filter_map(|id| imap_by_id.get(id).cloned())
        .collect();

    let mut touched = false;
    if !add_flags.is_empty() {
        imap.uid_store(&[email_id.uid], &add_flags, StoreAction::Add)
            .await
            .map_err(|err| store_failure(err, touched))?;
        touched = true;
    }
    if !del_flags.is_empty() {
        imap.uid_store(&[email_id.uid], &del_flags, StoreAction::Remove)
            .await
            .map_err(|err| store_failure(err, touched))?;
        touched = true;
    }
    if !add_boxes.is_empty() || !del_boxes.is_empty() {
        imap.uid_move(&[email_id.uid], &add_boxes, &del_boxes)
            .await
            .map_err(|err| store_failure(err, touched))?;
    }

    Ok(email_id.to_string())
}

async fn destroy_email(
    imap: &mut dyn ImapSession,
    id_ref: &str,
    created_ids: &AHashMap<String, String>,
    uid_validity: u32,
) -> Result<String, SetError> {
    let email_id = resolve_email_id(id_ref, created_ids, uid_validity)?;
    fetch_one(imap, email_id.uid).await?;
    imap.uid_expunge(&[email_id.uid])
        .await
        .map_err(|err| SetError::forbidden().with_description(err.to_string()))?;
    Ok(email_id.to_string())
}

pub(crate) fn resolve_email_id(
    id_ref: &str,
    created_ids: &AHashMap<String, String>,
    uid_validity: u32,
) -> Result<EmailId, SetError> {
    resolve_id(id_ref, created_ids)
        .and_then(EmailId::parse)
        .filter(|email_id| email_id.uid_validity == uid_validity)
        .ok_or_else(SetError::not_found)
}

pub(crate) async fn fetch_one(
    imap: &mut dyn ImapSession,
    uid: u32,
) -> Result<crate::imap::FetchedMessage, SetError> {
    imap.uid_fetch(&[uid])
        .await
        .map_err(|err| SetError::forbidden().with_description(err.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(SetError::not_found)
}

fn store_failure(err: crate::imap::ImapError, touched: bool) -> SetError {
    if touched {
        SetError::partial_fail().with_description(err.to_string())
    } else {
        SetError::forbidden().with_description(err.to_string())
    }
}

fn keyword_flags(keywords: Option<&Value>) -> Vec<String> {
    match keywords {
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, member)| member.as_bool() == Some(true))
            .map(|(keyword, _)| Keyword::parse(keyword).to_imap_flag().to_string())
            .collect(),
        _ => Vec::new(),
    }
}

fn flag_set(view: &Map<String, Value>, key: &str) -> AHashSet<String> {
    match view.get(key) {
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, member)| member.as_bool() == Some(true))
            .map(|(keyword, _)| Keyword::parse(keyword).to_imap_flag().to_string())
            .collect(),
        _ => AHashSet::new(),
    }
}

fn id_set(view: &Map<String, Value>, key: &str) -> AHashSet<String> {
    match view.get(key) {
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, member)| member.as_bool() == Some(true))
            .map(|(id, _)| id.clone())
            .collect(),
        _ => AHashSet::new(),
    }
}
