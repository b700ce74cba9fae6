/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The session resource: static capability objects advertising the
//! server limits clients must honor.

use jmap_proto::request::capability::Capability;
use serde_json::{json, Map, Value};

use crate::JMAP;

impl JMAP {
    pub fn session_object(&self) -> Value {
        let mut capabilities = Map::new();
        capabilities.insert(
            Capability::Core.as_str().to_string(),
            json!({
                "maxSizeRequest": self.config.request_max_size,
                "maxCallsInRequest": self.config.request_max_calls,
                "maxObjectsInGet": self.config.get_max_objects,
                "maxObjectsInSet": self.config.set_max_objects,
                "maxSizeUpload": self.config.request_max_size,
                "maxConcurrentUpload": 4,
                "maxConcurrentRequests": 4,
                "collationAlgorithms": [
                    "i;ascii-numeric",
                    "i;ascii-casemap",
                    "i;unicode-casemap"
                ]
            }),
        );
        capabilities.insert(
            Capability::Mail.as_str().to_string(),
            json!({
                "maxMailboxesPerEmail": Value::Null,
                "maxMailboxDepth": Value::Null,
                "maxSizeMailboxName": 200,
                "maxSizeAttachmentsPerEmail": 50_000_000u32,
                "emailQuerySortOptions": [
                    "receivedAt",
                    "sentAt",
                    "size",
                    "subject",
                    "from",
                    "to"
                ],
                "mayCreateTopLevelMailbox": true
            }),
        );
        capabilities.insert(
            Capability::Submission.as_str().to_string(),
            json!({
                "maxDelayedSend": 0,
                "submissionExtensions": {}
            }),
        );
        capabilities.insert(Capability::VacationResponse.as_str().to_string(), json!({}));

        json!({
            "capabilities": capabilities,
            "apiUrl": self.config.api_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use store::SqlStore;

    use crate::{Config, JMAP};

    #[test]
    fn session_advertises_limits() {
        let server = JMAP::new(Config::default(), SqlStore::open_memory().unwrap());
        let session = server.session_object();
        let core = &session["capabilities"]["urn:ietf:params:jmap:core"];
        assert_eq!(core["maxCallsInRequest"], 16);
        assert_eq!(core["maxObjectsInGet"], 500);
        assert!(session["capabilities"]
            .as_object()
            .unwrap()
            .contains_key("urn:ietf:params:jmap:vacationresponse"));
        assert_eq!(session["apiUrl"], "/jmap");
    }
}
