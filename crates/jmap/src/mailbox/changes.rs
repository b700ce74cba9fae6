/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use jmap_proto::error::method::MethodError;
use jmap_proto::method::changes::{ChangesRequest, ChangesResponse};
use store::EntityType;

use crate::mailbox::COUNT_PROPERTIES;
use crate::JMAP;

impl JMAP {
    pub async fn mailbox_changes(
        &self,
        request: Result<ChangesRequest, MethodError>,
    ) -> Result<ChangesResponse, MethodError> {
        let request = request?;
        let account = self.account(&request.account_id)?;
        self.sync_mailboxes(&account).await?;

        let changes = self.scalar_changes(EntityType::Mailbox, &request).await?;
        let mut response = changes.response;
        // When nothing structural moved, tell clients they only need
        // to refresh the counters.
        if changes.counts_only && !response.updated.is_empty() {
            response.updated_properties = Some(
                COUNT_PROPERTIES.iter().map(|p| p.to_string()).collect(),
            );
        }
        Ok(response)
    }
}
