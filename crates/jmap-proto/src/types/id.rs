/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt::Display;

use rand::Rng;

/// The singleton id used by VacationResponse objects.
pub const SINGLETON_ID: &str = "singleton";

/// JMAP-visible identity of an IMAP-backed message, encoded on the wire
/// as `"{uidvalidity}-{uid}"`. A uidvalidity that no longer matches the
/// mailbox means the mailbox was recreated and the id cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmailId {
    pub uid_validity: u32,
    pub uid: u32,
}

impl EmailId {
    pub fn new(uid_validity: u32, uid: u32) -> Self {
        EmailId { uid_validity, uid }
    }

    /// Strict parse: exactly two numeric segments, uid non-zero. A
    /// malformed id is "an id that cannot exist", reported by callers
    /// as notFound rather than as a request error.
    pub fn parse(value: &str) -> Option<Self> {
        let (uid_validity, uid) = value.split_once('-')?;
        if uid.contains('-') {
            return None;
        }
        let id = EmailId {
            uid_validity: parse_decimal(uid_validity)?,
            uid: parse_decimal(uid)?,
        };
        if id.uid != 0 {
            Some(id)
        } else {
            None
        }
    }
}

fn parse_decimal(value: &str) -> Option<u32> {
    if !value.is_empty() && value.bytes().all(|ch| ch.is_ascii_digit()) {
        value.parse().ok()
    } else {
        None
    }
}

impl Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.uid_validity, self.uid)
    }
}

impl serde::Serialize for EmailId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

/// Generates an opaque 32-hex-digit identifier, used for mailboxes
/// without a server-assigned OBJECTID and for identity/submission rows.
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    let mut id = String::with_capacity(32);
    for _ in 0..4 {
        let part: u32 = rng.gen();
        id.push_str(&format!("{part:08x}"));
    }
    id
}
