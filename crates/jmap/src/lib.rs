/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The JMAP proxy core: a batch request executor and the per-entity
//! get/changes/query/set engines, layered over a black-box IMAP
//! session for mail data and an SQLite cache for server-owned
//! entities.

pub mod api;
pub mod blob;
pub mod changes;
pub mod email;
pub mod identity;
pub mod imap;
pub mod mailbox;
pub mod query;
pub mod submission;
pub mod thread;
pub mod vacation;

use std::sync::Arc;

use ahash::AHashMap;
use jmap_proto::error::method::MethodError;
use store::SqlStore;

use crate::blob::BlobStore;
use crate::imap::{ImapError, ImapSession};
use crate::submission::EmailSender;
use crate::thread::{SurrogateThreads, ThreadStrategy};

pub struct JMAP {
    pub store: SqlStore,
    pub config: Config,
    pub threads: Arc<dyn ThreadStrategy>,
    accounts: parking_lot::RwLock<AHashMap<String, Arc<Account>>>,
}

/// One proxied account: its IMAP session plus the outbound mail and
/// blob services. The session mutex serializes IMAP command sequences
/// so concurrent method calls cannot interleave on the wire.
pub struct Account {
    pub id: String,
    pub imap: tokio::sync::Mutex<Box<dyn ImapSession>>,
    pub sender: Arc<dyn EmailSender>,
    pub blobs: Arc<dyn BlobStore>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub request_max_size: usize,
    pub request_max_calls: usize,
    pub get_max_objects: usize,
    pub set_max_objects: usize,
    pub query_max_results: usize,
    pub changes_max_results: usize,
    pub api_path: String,
    pub session_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            request_max_size: 10_000_000,
            request_max_calls: 16,
            get_max_objects: 500,
            set_max_objects: 500,
            query_max_results: 1000,
            changes_max_results: 1000,
            api_path: "/jmap".to_string(),
            session_path: "/jmap/session".to_string(),
        }
    }
}

impl JMAP {
    pub fn new(config: Config, store: SqlStore) -> Self {
        JMAP {
            store,
            config,
            threads: Arc::new(SurrogateThreads),
            accounts: parking_lot::RwLock::new(AHashMap::new()),
        }
    }

    pub fn add_account(
        &self,
        id: impl Into<String>,
        imap: Box<dyn ImapSession>,
        sender: Arc<dyn EmailSender>,
        blobs: Arc<dyn BlobStore>,
    ) {
        let id = id.into();
        self.accounts.write().insert(
            id.clone(),
            Arc::new(Account {
                id,
                imap: tokio::sync::Mutex::new(imap),
                sender,
                blobs,
            }),
        );
    }

    pub(crate) fn account(&self, account_id: &str) -> Result<Arc<Account>, MethodError> {
        self.accounts
            .read()
            .get(account_id)
            .cloned()
            .ok_or(MethodError::AccountNotFound)
    }
}

pub(crate) fn store_fail(err: store::Error) -> MethodError {
    tracing::error!(error = %err, "Store operation failed");
    MethodError::ServerFail(err.to_string())
}

pub(crate) fn imap_fail(err: ImapError) -> MethodError {
    tracing::error!(error = %err, "IMAP backend operation failed");
    match err {
        ImapError::Connection(_) => MethodError::ServerUnavailable,
        _ => MethodError::ServerFail(err.to_string()),
    }
}
