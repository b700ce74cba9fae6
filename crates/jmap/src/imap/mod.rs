/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The seam between the JMAP engines and the IMAP backend. The
//! session exposes the account's message store as a single uid space
//! with CONDSTORE/QRESYNC change reporting; connection management,
//! literal handling and reconnect policy all live behind the trait.

pub mod search;

use async_trait::async_trait;
use jmap_proto::types::state::MailState;

use crate::imap::search::{SearchKey, SortKey};

#[derive(Debug, thiserror::Error)]
pub enum ImapError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("No such mailbox: {0}")]
    MailboxNotFound(String),
}

/// One listed mailbox. `imap_name` is the full path; hierarchy is
/// recovered by splitting on the delimiter. The role comes from
/// SPECIAL-USE attributes where the server advertises them.
#[derive(Debug, Clone)]
pub struct MailboxInfo {
    pub imap_name: String,
    pub delimiter: Option<char>,
    pub role: Option<String>,
    pub subscribed: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MailboxCounts {
    pub total: u32,
    pub unseen: u32,
}

/// Metadata and content of one fetched message. `mailboxes` lists the
/// IMAP names of the folders containing it; the unified uid space
/// allows multi-folder membership, Gmail-style.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub uid: u32,
    pub modseq: u64,
    pub flags: Vec<String>,
    pub mailboxes: Vec<String>,
    pub size: u32,
    pub received_at: i64,
    pub raw: Vec<u8>,
}

/// The result of a CHANGEDSINCE poll: messages whose flags changed or
/// that arrived after the given modseq, plus uids reported VANISHED.
#[derive(Debug, Clone, Default)]
pub struct MailChanges {
    pub changed: Vec<UidModseq>,
    pub vanished: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct UidModseq {
    pub uid: u32,
    pub modseq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Add,
    Remove,
    Replace,
}

#[async_trait]
pub trait ImapSession: Send + Sync {
    /// Polls (uidvalidity, uidnext, highestmodseq) for the account's
    /// message store via STATUS/SELECT.
    async fn mail_state(&mut self) -> Result<MailState, ImapError>;

    async fn list_mailboxes(&mut self) -> Result<Vec<MailboxInfo>, ImapError>;
    async fn mailbox_counts(&mut self, imap_name: &str) -> Result<MailboxCounts, ImapError>;
    async fn create_mailbox(&mut self, imap_name: &str) -> Result<(), ImapError>;
    async fn rename_mailbox(&mut self, from: &str, to: &str) -> Result<(), ImapError>;
    async fn delete_mailbox(&mut self, imap_name: &str) -> Result<(), ImapError>;

    async fn uid_search(&mut self, query: &SearchKey) -> Result<Vec<u32>, ImapError>;
    async fn uid_sort(
        &mut self,
        sort: &[SortKey],
        query: &SearchKey,
    ) -> Result<Vec<u32>, ImapError>;
    async fn uid_fetch(&mut self, uids: &[u32]) -> Result<Vec<FetchedMessage>, ImapError>;

    /// UID FETCH 1:* (FLAGS) (CHANGEDSINCE n VANISHED).
    async fn changed_since(&mut self, modseq: u64) -> Result<MailChanges, ImapError>;

    async fn uid_store(
        &mut self,
        uids: &[u32],
        flags: &[String],
        action: StoreAction,
    ) -> Result<(), ImapError>;
    async fn uid_move(
        &mut self,
        uids: &[u32],
        add: &[String],
        remove: &[String],
    ) -> Result<(), ImapError>;

    /// Appends a message, returning the uid assigned by the server.
    async fn append(
        &mut self,
        imap_name: &str,
        flags: &[String],
        raw: &[u8],
    ) -> Result<u32, ImapError>;
    async fn uid_expunge(&mut self, uids: &[u32]) -> Result<(), ImapError>;
}
