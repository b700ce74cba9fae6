/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::borrow::Cow;

/// Item-scoped errors reported inside notCreated/notUpdated/
/// notDestroyed maps. An item error never aborts its sibling items.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SetError {
    #[serde(rename = "type")]
    pub type_: SetErrorType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Cow<'static, str>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SetErrorType {
    #[serde(rename = "forbidden")]
    Forbidden,
    #[serde(rename = "tooLarge")]
    TooLarge,
    #[serde(rename = "notFound")]
    NotFound,
    #[serde(rename = "invalidPatch")]
    InvalidPatch,
    #[serde(rename = "willDestroy")]
    WillDestroy,
    #[serde(rename = "invalidProperties")]
    InvalidProperties,
    #[serde(rename = "singleton")]
    Singleton,
    #[serde(rename = "mailboxHasChild")]
    MailboxHasChild,
    #[serde(rename = "mailboxHasEmail")]
    MailboxHasEmail,
    #[serde(rename = "blobNotFound")]
    BlobNotFound,
    #[serde(rename = "invalidEmail")]
    InvalidEmail,
    #[serde(rename = "noRecipients")]
    NoRecipients,
    #[serde(rename = "invalidRecipients")]
    InvalidRecipients,
    #[serde(rename = "forbiddenToSend")]
    ForbiddenToSend,
    #[serde(rename = "cannotUnsend")]
    CannotUnsend,
    #[serde(rename = "alreadyExists")]
    AlreadyExists,
    #[serde(rename = "serverPartialFail")]
    ServerPartialFail,
}

impl SetError {
    pub fn new(type_: SetErrorType) -> Self {
        SetError {
            type_,
            description: None,
            properties: None,
        }
    }

    pub fn not_found() -> Self {
        Self::new(SetErrorType::NotFound)
            .with_description("Id not found or already destroyed.")
    }

    pub fn invalid_patch() -> Self {
        Self::new(SetErrorType::InvalidPatch)
    }

    pub fn invalid_properties() -> Self {
        Self::new(SetErrorType::InvalidProperties)
    }

    pub fn forbidden() -> Self {
        Self::new(SetErrorType::Forbidden)
    }

    pub fn partial_fail() -> Self {
        Self::new(SetErrorType::ServerPartialFail).with_description(concat!(
            "Some changes were applied before the failure, please ",
            "resynchronize to determine the current state."
        ))
    }

    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.properties
            .get_or_insert_with(Vec::new)
            .push(property.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::SetError;

    #[test]
    fn set_error_shape() {
        let value = serde_json::to_value(
            SetError::invalid_patch()
                .with_description("Property may not be changed.")
                .with_property("email"),
        )
        .unwrap();
        assert_eq!(value["type"], "invalidPatch");
        assert_eq!(value["properties"][0], "email");
    }
}
