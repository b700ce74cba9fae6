/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Email entities proxy IMAP messages directly: the id is derived
//! from (uidvalidity, uid), the change state from the mailbox status
//! triple, and message metadata is parsed out of the stored MIME on
//! the way through.

pub mod changes;
pub mod get;
pub mod query;
pub mod set;

use std::sync::Arc;

use ahash::AHashMap;
use jmap_proto::error::method::MethodError;
use jmap_proto::types::id::EmailId;
use jmap_proto::types::keyword::Keyword;
use jmap_proto::types::state::MailState;
use mail_parser::{Address, HeaderValue, MessageParser};
use serde_json::{json, Map, Value};

use crate::imap::FetchedMessage;
use crate::{imap_fail, Account, JMAP};

impl JMAP {
    pub(crate) async fn current_mail_state(
        &self,
        account: &Arc<Account>,
    ) -> Result<MailState, MethodError> {
        account
            .imap
            .lock()
            .await
            .mail_state()
            .await
            .map_err(imap_fail)
    }

    pub(crate) fn email_object(
        &self,
        message: &FetchedMessage,
        uid_validity: u32,
        id_by_imap: &AHashMap<String, String>,
    ) -> Map<String, Value> {
        let id = EmailId::new(uid_validity, message.uid);
        let mut object = match json!({
            "id": id,
            "blobId": id,
            "threadId": self.threads.thread_id(&id),
            "mailboxIds": mailbox_ids_object(&message.mailboxes, id_by_imap),
            "keywords": keywords_object(&message.flags),
            "size": message.size,
            "receivedAt": format_date(message.received_at),
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        if let Some(parsed) = MessageParser::default().parse(&message.raw) {
            object.insert(
                "subject".to_string(),
                parsed.subject().map(|s| json!(s)).unwrap_or(Value::Null),
            );
            object.insert("from".to_string(), addresses(parsed.from()));
            object.insert("to".to_string(), addresses(parsed.to()));
            object.insert("cc".to_string(), addresses(parsed.cc()));
            object.insert("bcc".to_string(), addresses(parsed.bcc()));
            object.insert(
                "sentAt".to_string(),
                parsed
                    .date()
                    .map(|date| json!(date.to_rfc3339()))
                    .unwrap_or(Value::Null),
            );
            object.insert(
                "messageId".to_string(),
                parsed
                    .message_id()
                    .map(|mid| json!([mid]))
                    .unwrap_or(Value::Null),
            );
            object.insert(
                "inReplyTo".to_string(),
                match parsed.in_reply_to() {
                    HeaderValue::Text(text) => json!([text]),
                    HeaderValue::TextList(list) => json!(list),
                    _ => Value::Null,
                },
            );
            object.insert(
                "hasAttachment".to_string(),
                Value::Bool(parsed.attachment_count() > 0),
            );
            object.insert(
                "preview".to_string(),
                parsed
                    .body_text(0)
                    .map(|text| {
                        let mut preview = text.chars().take(256).collect::<String>();
                        preview.truncate(preview.trim_end().len());
                        json!(preview)
                    })
                    .unwrap_or(Value::Null),
            );
        }

        object
    }
}

pub(crate) fn keywords_object(flags: &[String]) -> Value {
    let mut keywords = Map::new();
    for flag in flags {
        if flag != "\\Recent" {
            keywords.insert(Keyword::from_imap_flag(flag).to_string(), Value::Bool(true));
        }
    }
    Value::Object(keywords)
}

pub(crate) fn mailbox_ids_object(
    mailboxes: &[String],
    id_by_imap: &AHashMap<String, String>,
) -> Value {
    let mut ids = Map::new();
    for imap_name in mailboxes {
        if let Some(id) = id_by_imap.get(imap_name) {
            ids.insert(id.clone(), Value::Bool(true));
        }
    }
    Value::Object(ids)
}

pub(crate) fn format_date(timestamp: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn addresses(address: Option<&Address<'_>>) -> Value {
    let mut list = Vec::new();
    match address {
        Some(Address::List(addrs)) => push_addrs(&mut list, addrs),
        Some(Address::Group(groups)) => {
            for group in groups {
                push_addrs(&mut list, &group.addresses);
            }
        }
        None => {}
    }
    if list.is_empty() {
        Value::Null
    } else {
        Value::Array(list)
    }
}

fn push_addrs(list: &mut Vec<Value>, addrs: &[mail_parser::Addr<'_>]) {
    for addr in addrs {
        list.push(json!({
            "name": addr.name.as_deref(),
            "email": addr.address.as_deref().unwrap_or_default(),
        }));
    }
}
