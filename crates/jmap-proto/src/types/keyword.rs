/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt::Display;

pub const SEEN: &str = "$seen";
pub const DRAFT: &str = "$draft";
pub const FLAGGED: &str = "$flagged";
pub const ANSWERED: &str = "$answered";

/// A JMAP email keyword and its IMAP system-flag counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    Seen,
    Draft,
    Flagged,
    Answered,
    Other(String),
}

impl Keyword {
    pub fn parse(value: &str) -> Self {
        match value {
            SEEN => Keyword::Seen,
            DRAFT => Keyword::Draft,
            FLAGGED => Keyword::Flagged,
            ANSWERED => Keyword::Answered,
            other => Keyword::Other(other.to_string()),
        }
    }

    pub fn from_imap_flag(flag: &str) -> Self {
        match flag {
            "\\Seen" => Keyword::Seen,
            "\\Draft" => Keyword::Draft,
            "\\Flagged" => Keyword::Flagged,
            "\\Answered" => Keyword::Answered,
            other => Keyword::Other(other.to_string()),
        }
    }

    pub fn to_imap_flag(&self) -> &str {
        match self {
            Keyword::Seen => "\\Seen",
            Keyword::Draft => "\\Draft",
            Keyword::Flagged => "\\Flagged",
            Keyword::Answered => "\\Answered",
            Keyword::Other(flag) => flag.as_str(),
        }
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Keyword::Seen => f.write_str(SEEN),
            Keyword::Draft => f.write_str(DRAFT),
            Keyword::Flagged => f.write_str(FLAGGED),
            Keyword::Answered => f.write_str(ANSWERED),
            Keyword::Other(value) => f.write_str(value),
        }
    }
}

impl serde::Serialize for Keyword {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}
