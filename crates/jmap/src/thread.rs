/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Threading. The proxy cannot see server-side thread structure, so
//! the default strategy is a surrogate 1:1 mapping where each message
//! is the sole member of its own thread. The trait is the seam for a
//! backend that can do better (OBJECTID, X-GM-THRID).

use ahash::AHashMap;
use jmap_proto::error::method::MethodError;
use jmap_proto::method::changes::{ChangesRequest, ChangesResponse};
use jmap_proto::method::get::{GetRequest, GetResponse};
use jmap_proto::types::id::EmailId;
use jmap_proto::types::state::State;
use serde_json::json;

use crate::{imap_fail, JMAP};

pub trait ThreadStrategy: Send + Sync {
    fn thread_id(&self, email_id: &EmailId) -> String;
    /// The representative email of a thread id, or None when the id
    /// cannot name a thread at all.
    fn email_of(&self, thread_id: &str) -> Option<EmailId>;
}

pub struct SurrogateThreads;

impl ThreadStrategy for SurrogateThreads {
    fn thread_id(&self, email_id: &EmailId) -> String {
        email_id.to_string()
    }

    fn email_of(&self, thread_id: &str) -> Option<EmailId> {
        EmailId::parse(thread_id)
    }
}

impl JMAP {
    pub async fn thread_get(
        &self,
        request: Result<GetRequest, MethodError>,
    ) -> Result<GetResponse, MethodError> {
        let request = request?;
        self.check_get_limit(&request)?;
        let account = self.account(&request.account_id)?;
        let Some(ids) = &request.ids else {
            return Err(MethodError::InvalidArguments(
                "Thread/get requires the ids argument.".to_string(),
            ));
        };

        let mut imap = account.imap.lock().await;
        let state = imap.mail_state().await.map_err(imap_fail)?;

        let mut members = Vec::with_capacity(ids.len());
        let mut uids = Vec::new();
        for id in ids {
            let email_id = self
                .threads
                .email_of(id)
                .filter(|email_id| email_id.uid_validity == state.uid_validity);
            if let Some(email_id) = email_id {
                uids.push(email_id.uid);
            }
            members.push((id, email_id));
        }
        let known: AHashMap<u32, ()> = imap
            .uid_fetch(&uids)
            .await
            .map_err(imap_fail)?
            .into_iter()
            .map(|message| (message.uid, ()))
            .collect();
        drop(imap);

        let mut list = Vec::new();
        let mut not_found = Vec::new();
        for (id, email_id) in members {
            match email_id.filter(|email_id| known.contains_key(&email_id.uid)) {
                Some(email_id) => list.push(json!({
                    "id": id,
                    "emailIds": [email_id.to_string()],
                })),
                None => not_found.push(id.clone()),
            }
        }

        Ok(GetResponse {
            account_id: request.account_id,
            state: State::Mail(state),
            list,
            not_found,
        })
    }

    /// Thread change tracking rides on Email/changes: a thread is
    /// touched exactly when its member message is.
    pub async fn thread_changes(
        &self,
        request: Result<ChangesRequest, MethodError>,
    ) -> Result<ChangesResponse, MethodError> {
        let mut response = self.email_changes(request).await?;
        for ids in [
            &mut response.created,
            &mut response.updated,
            &mut response.destroyed,
        ] {
            for id in ids.iter_mut() {
                if let Some(email_id) = EmailId::parse(id) {
                    *id = self.threads.thread_id(&email_id);
                }
            }
        }
        Ok(response)
    }
}
