/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! In-memory IMAP backend for the integration tests: a single uid
//! space with CONDSTORE-style modseq bookkeeping, interpreted search
//! keys and multi-folder message membership.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jmap::imap::search::{SearchKey, SortField, SortKey};
use jmap::imap::{
    FetchedMessage, ImapError, ImapSession, MailChanges, MailboxCounts, MailboxInfo, StoreAction,
    UidModseq,
};
use jmap::submission::{EmailSender, Envelope, SendError};
use jmap_proto::types::state::MailState;
use parking_lot::Mutex;

pub fn raw_message(from: &str, to: &str, subject: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\n\
         Message-ID: <{subject}@example.com>\r\n\
         Date: Sun, 30 Aug 2026 12:00:00 +0000\r\n\r\n\
         Hello from the test suite.\r\n"
    )
    .into_bytes()
}

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub modseq: u64,
    pub flags: Vec<String>,
    pub mailboxes: Vec<String>,
    pub received_at: i64,
    pub raw: Vec<u8>,
}

pub struct MailData {
    pub uid_validity: u32,
    pub uid_next: u32,
    pub modseq: u64,
    pub delimiter: char,
    pub folders: Vec<MailboxInfo>,
    pub messages: BTreeMap<u32, MockMessage>,
    pub expunged: Vec<UidModseq>,
}

impl MailData {
    pub fn new(uid_validity: u32) -> Self {
        MailData {
            uid_validity,
            uid_next: 1,
            modseq: 1,
            delimiter: '/',
            folders: Vec::new(),
            messages: BTreeMap::new(),
            expunged: Vec::new(),
        }
    }

    pub fn add_folder(&mut self, imap_name: &str, role: Option<&str>) {
        self.folders.push(MailboxInfo {
            imap_name: imap_name.to_string(),
            delimiter: Some(self.delimiter),
            role: role.map(str::to_string),
            subscribed: true,
        });
    }

    fn bump(&mut self) -> u64 {
        self.modseq += 1;
        self.modseq
    }

    pub fn append(
        &mut self,
        mailboxes: &[&str],
        flags: &[&str],
        raw: Vec<u8>,
        received_at: i64,
    ) -> u32 {
        let uid = self.uid_next;
        self.uid_next += 1;
        let modseq = self.bump();
        self.messages.insert(
            uid,
            MockMessage {
                modseq,
                flags: flags.iter().map(|f| f.to_string()).collect(),
                mailboxes: mailboxes.iter().map(|m| m.to_string()).collect(),
                received_at,
                raw,
            },
        );
        uid
    }

    pub fn set_flags(&mut self, uid: u32, flags: &[&str]) {
        let modseq = self.bump();
        if let Some(message) = self.messages.get_mut(&uid) {
            message.flags = flags.iter().map(|f| f.to_string()).collect();
            message.modseq = modseq;
        }
    }

    pub fn expunge(&mut self, uid: u32) {
        if self.messages.remove(&uid).is_some() {
            let modseq = self.bump();
            self.expunged.push(UidModseq { uid, modseq });
        }
    }

    fn header(raw: &[u8], name: &str) -> Option<String> {
        let text = std::str::from_utf8(raw).ok()?;
        for line in text.split("\r\n") {
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                if key.eq_ignore_ascii_case(name) {
                    return Some(value.trim().to_ascii_lowercase());
                }
            }
        }
        None
    }

    fn matches(&self, message: &MockMessage, key: &SearchKey) -> bool {
        let header_contains = |name: &str, needle: &str| {
            Self::header(&message.raw, name)
                .is_some_and(|value| value.contains(&needle.to_ascii_lowercase()))
        };
        match key {
            SearchKey::All => true,
            SearchKey::And(keys) => keys.iter().all(|k| self.matches(message, k)),
            SearchKey::Or(a, b) => self.matches(message, a) || self.matches(message, b),
            SearchKey::Not(inner) => !self.matches(message, inner),
            SearchKey::InMailbox(name) => message.mailboxes.iter().any(|m| m == name),
            SearchKey::From(needle) => header_contains("From", needle),
            SearchKey::To(needle) => header_contains("To", needle),
            SearchKey::Cc(needle) => header_contains("Cc", needle),
            SearchKey::Bcc(needle) => header_contains("Bcc", needle),
            SearchKey::Subject(needle) => header_contains("Subject", needle),
            SearchKey::Body(needle) | SearchKey::Text(needle) => {
                String::from_utf8_lossy(&message.raw)
                    .to_ascii_lowercase()
                    .contains(&needle.to_ascii_lowercase())
            }
            SearchKey::Keyword(flag) => message.flags.iter().any(|f| f == flag),
            SearchKey::Unkeyword(flag) => !message.flags.iter().any(|f| f == flag),
            SearchKey::Before(date) => {
                chrono::DateTime::from_timestamp(message.received_at, 0)
                    .is_some_and(|at| at.date_naive() < *date)
            }
            SearchKey::Since(date) => {
                chrono::DateTime::from_timestamp(message.received_at, 0)
                    .is_some_and(|at| at.date_naive() >= *date)
            }
            SearchKey::Larger(size) => message.raw.len() as u32 > *size,
            SearchKey::Smaller(size) => (message.raw.len() as u32) < *size,
        }
    }

    fn fetched(&self, uid: u32, message: &MockMessage) -> FetchedMessage {
        FetchedMessage {
            uid,
            modseq: message.modseq,
            flags: message.flags.clone(),
            mailboxes: message.mailboxes.clone(),
            size: message.raw.len() as u32,
            received_at: message.received_at,
            raw: message.raw.clone(),
        }
    }
}

pub struct MockImapSession {
    data: Arc<Mutex<MailData>>,
}

impl MockImapSession {
    pub fn new(data: Arc<Mutex<MailData>>) -> Self {
        MockImapSession { data }
    }
}

#[async_trait]
impl ImapSession for MockImapSession {
    async fn mail_state(&mut self) -> Result<MailState, ImapError> {
        let data = self.data.lock();
        Ok(MailState::new(data.uid_validity, data.uid_next, data.modseq))
    }

    async fn list_mailboxes(&mut self) -> Result<Vec<MailboxInfo>, ImapError> {
        Ok(self.data.lock().folders.clone())
    }

    async fn mailbox_counts(&mut self, imap_name: &str) -> Result<MailboxCounts, ImapError> {
        let data = self.data.lock();
        let mut counts = MailboxCounts::default();
        for message in data.messages.values() {
            if message.mailboxes.iter().any(|m| m == imap_name) {
                counts.total += 1;
                if !message.flags.iter().any(|f| f == "\\Seen") {
                    counts.unseen += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn create_mailbox(&mut self, imap_name: &str) -> Result<(), ImapError> {
        let mut data = self.data.lock();
        if data.folders.iter().any(|f| f.imap_name == imap_name) {
            return Err(ImapError::Protocol(format!(
                "mailbox {imap_name:?} already exists"
            )));
        }
        data.add_folder(imap_name, None);
        Ok(())
    }

    async fn rename_mailbox(&mut self, from: &str, to: &str) -> Result<(), ImapError> {
        let mut data = self.data.lock();
        if !data.folders.iter().any(|f| f.imap_name == from) {
            return Err(ImapError::MailboxNotFound(from.to_string()));
        }
        let delim = data.delimiter;
        let prefix = format!("{from}{delim}");
        for folder in &mut data.folders {
            if folder.imap_name == from {
                folder.imap_name = to.to_string();
            } else if let Some(rest) = folder.imap_name.strip_prefix(&prefix) {
                folder.imap_name = format!("{to}{delim}{rest}");
            }
        }
        for message in data.messages.values_mut() {
            for mailbox in &mut message.mailboxes {
                if mailbox == from {
                    *mailbox = to.to_string();
                } else if let Some(rest) = mailbox.strip_prefix(&prefix) {
                    *mailbox = format!("{to}{delim}{rest}");
                }
            }
        }
        Ok(())
    }

    async fn delete_mailbox(&mut self, imap_name: &str) -> Result<(), ImapError> {
        let mut data = self.data.lock();
        let before = data.folders.len();
        data.folders.retain(|f| f.imap_name != imap_name);
        if data.folders.len() == before {
            return Err(ImapError::MailboxNotFound(imap_name.to_string()));
        }
        Ok(())
    }

    async fn uid_search(&mut self, query: &SearchKey) -> Result<Vec<u32>, ImapError> {
        let data = self.data.lock();
        Ok(data
            .messages
            .iter()
            .filter(|(_, message)| data.matches(message, query))
            .map(|(uid, _)| *uid)
            .collect())
    }

    async fn uid_sort(
        &mut self,
        sort: &[SortKey],
        query: &SearchKey,
    ) -> Result<Vec<u32>, ImapError> {
        let data = self.data.lock();
        let mut matched: Vec<(u32, MockMessage)> = data
            .messages
            .iter()
            .filter(|(_, message)| data.matches(message, query))
            .map(|(uid, message)| (*uid, message.clone()))
            .collect();
        matched.sort_by(|(uid_a, a), (uid_b, b)| {
            for key in sort {
                let ordering = match key.field {
                    SortField::ReceivedAt | SortField::SentAt => {
                        a.received_at.cmp(&b.received_at)
                    }
                    SortField::Size => a.raw.len().cmp(&b.raw.len()),
                    SortField::Subject => MailData::header(&a.raw, "Subject")
                        .cmp(&MailData::header(&b.raw, "Subject")),
                    SortField::From => MailData::header(&a.raw, "From")
                        .cmp(&MailData::header(&b.raw, "From")),
                    SortField::To => {
                        MailData::header(&a.raw, "To").cmp(&MailData::header(&b.raw, "To"))
                    }
                };
                let ordering = if key.ascending {
                    ordering
                } else {
                    ordering.reverse()
                };
                if !ordering.is_eq() {
                    return ordering;
                }
            }
            uid_a.cmp(uid_b)
        });
        Ok(matched.into_iter().map(|(uid, _)| uid).collect())
    }

    async fn uid_fetch(&mut self, uids: &[u32]) -> Result<Vec<FetchedMessage>, ImapError> {
        let data = self.data.lock();
        Ok(uids
            .iter()
            .filter_map(|uid| data.messages.get(uid).map(|m| data.fetched(*uid, m)))
            .collect())
    }

    async fn changed_since(&mut self, modseq: u64) -> Result<MailChanges, ImapError> {
        let data = self.data.lock();
        Ok(MailChanges {
            changed: data
                .messages
                .iter()
                .filter(|(_, message)| message.modseq > modseq)
                .map(|(uid, message)| UidModseq {
                    uid: *uid,
                    modseq: message.modseq,
                })
                .collect(),
            vanished: data
                .expunged
                .iter()
                .filter(|entry| entry.modseq > modseq)
                .map(|entry| entry.uid)
                .collect(),
        })
    }

    async fn uid_store(
        &mut self,
        uids: &[u32],
        flags: &[String],
        action: StoreAction,
    ) -> Result<(), ImapError> {
        let mut data = self.data.lock();
        for uid in uids {
            let modseq = data.bump();
            if let Some(message) = data.messages.get_mut(uid) {
                match action {
                    StoreAction::Add => {
                        for flag in flags {
                            if !message.flags.contains(flag) {
                                message.flags.push(flag.clone());
                            }
                        }
                    }
                    StoreAction::Remove => {
                        message.flags.retain(|flag| !flags.contains(flag));
                    }
                    StoreAction::Replace => {
                        message.flags = flags.to_vec();
                    }
                }
                message.modseq = modseq;
            }
        }
        Ok(())
    }

    async fn uid_move(
        &mut self,
        uids: &[u32],
        add: &[String],
        remove: &[String],
    ) -> Result<(), ImapError> {
        let mut data = self.data.lock();
        for name in add {
            if !data.folders.iter().any(|f| &f.imap_name == name) {
                return Err(ImapError::MailboxNotFound(name.clone()));
            }
        }
        for uid in uids {
            let modseq = data.bump();
            if let Some(message) = data.messages.get_mut(uid) {
                message.mailboxes.retain(|name| !remove.contains(name));
                for name in add {
                    if !message.mailboxes.contains(name) {
                        message.mailboxes.push(name.clone());
                    }
                }
                message.modseq = modseq;
            }
        }
        Ok(())
    }

    async fn append(
        &mut self,
        imap_name: &str,
        flags: &[String],
        raw: &[u8],
    ) -> Result<u32, ImapError> {
        let mut data = self.data.lock();
        if !data.folders.iter().any(|f| f.imap_name == imap_name) {
            return Err(ImapError::MailboxNotFound(imap_name.to_string()));
        }
        let flags: Vec<&str> = flags.iter().map(String::as_str).collect();
        let received_at = 1_700_000_000 + i64::from(data.uid_next);
        Ok(data.append(&[imap_name], &flags, raw.to_vec(), received_at))
    }

    async fn uid_expunge(&mut self, uids: &[u32]) -> Result<(), ImapError> {
        let mut data = self.data.lock();
        for uid in uids {
            data.expunge(*uid);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSender {
    pub sent: Mutex<Vec<(Envelope, Vec<u8>)>>,
    pub reject: Mutex<Option<String>>,
}

#[async_trait]
impl EmailSender for MockSender {
    async fn send(&self, envelope: &Envelope, raw: &[u8]) -> Result<(), SendError> {
        if let Some(reason) = self.reject.lock().clone() {
            return Err(SendError::Rejected(reason));
        }
        self.sent.lock().push((envelope.clone(), raw.to_vec()));
        Ok(())
    }
}
