/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::AHashMap;
use jmap_proto::error::method::MethodError;
use jmap_proto::method::get::{GetRequest, GetResponse};
use jmap_proto::types::id::EmailId;
use jmap_proto::types::state::State;

use crate::api::filter_properties;
use crate::{imap_fail, JMAP};

impl JMAP {
    pub async fn email_get(
        &self,
        request: Result<GetRequest, MethodError>,
    ) -> Result<GetResponse, MethodError> {
        let request = request?;
        self.check_get_limit(&request)?;
        let account = self.account(&request.account_id)?;
        // ids: null means "everything" and is refused for emails.
        let Some(ids) = &request.ids else {
            return Err(MethodError::InvalidArguments(
                "Email/get requires the ids argument.".to_string(),
            ));
        };
        self.sync_mailboxes(&account).await?;
        let id_by_imap = self.mailbox_id_map(&account.id).await?;

        let mut imap = account.imap.lock().await;
        let state = imap.mail_state().await.map_err(imap_fail)?;

        // Malformed ids and ids from a previous uidvalidity epoch are
        // ids that cannot exist: report them notFound, not as errors.
        let mut uids = Vec::with_capacity(ids.len());
        let mut not_found = Vec::new();
        for id in ids {
            match EmailId::parse(id) {
                Some(email_id) if email_id.uid_validity == state.uid_validity => {
                    uids.push(email_id.uid);
                }
                _ => not_found.push(id.clone()),
            }
        }

        let messages: AHashMap<u32, _> = imap
            .uid_fetch(&uids)
            .await
            .map_err(imap_fail)?
            .into_iter()
            .map(|message| (message.uid, message))
            .collect();
        drop(imap);

        let mut list = Vec::new();
        for uid in uids {
            match messages.get(&uid) {
                Some(message) => list.push(filter_properties(
                    self.email_object(message, state.uid_validity, &id_by_imap),
                    request.properties.as_ref(),
                )),
                None => not_found.push(EmailId::new(state.uid_validity, uid).to_string()),
            }
        }

        Ok(GetResponse {
            account_id: request.account_id,
            state: State::Mail(state),
            list,
            not_found,
        })
    }
}
