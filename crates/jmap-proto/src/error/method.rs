/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::fmt::Display;

use serde::ser::SerializeMap;
use serde::Serialize;

use crate::types::state::State;

/// Method-call-scoped errors, returned as the call's result with the
/// method name replaced by "error". State-carrying variants include
/// the current state as a hint so clients can resynchronize.
#[derive(Debug, Clone)]
pub enum MethodError {
    InvalidArguments(String),
    RequestTooLarge,
    StateMismatch(State),
    CannotCalculateChanges(State),
    AnchorNotFound,
    UnsupportedFilter(String),
    UnsupportedSort(String),
    ServerFail(String),
    UnknownMethod(String),
    ServerUnavailable,
    ServerPartialFail,
    InvalidResultReference(String),
    AccountNotFound,
    NotFound,
}

impl Display for MethodError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            MethodError::InvalidArguments(err) => write!(f, "Invalid arguments: {}", err),
            MethodError::RequestTooLarge => write!(f, "Request too large"),
            MethodError::StateMismatch(_) => write!(f, "State mismatch"),
            MethodError::CannotCalculateChanges(_) => write!(f, "Cannot calculate changes"),
            MethodError::AnchorNotFound => write!(f, "Anchor not found"),
            MethodError::UnsupportedFilter(err) => write!(f, "Unsupported filter: {}", err),
            MethodError::UnsupportedSort(err) => write!(f, "Unsupported sort: {}", err),
            MethodError::ServerFail(err) => write!(f, "Server error: {}", err),
            MethodError::UnknownMethod(err) => write!(f, "Unknown method: {}", err),
            MethodError::ServerUnavailable => write!(f, "Server unavailable"),
            MethodError::ServerPartialFail => write!(f, "Server partial fail"),
            MethodError::InvalidResultReference(err) => {
                write!(f, "Invalid result reference: {}", err)
            }
            MethodError::AccountNotFound => write!(f, "Account not found"),
            MethodError::NotFound => write!(f, "Not found"),
        }
    }
}

impl MethodError {
    pub fn error_type(&self) -> &'static str {
        match self {
            MethodError::InvalidArguments(_) => "invalidArguments",
            MethodError::RequestTooLarge => "tooLarge",
            MethodError::StateMismatch(_) => "stateMismatch",
            MethodError::CannotCalculateChanges(_) => "cannotCalculateChanges",
            MethodError::AnchorNotFound => "anchorNotFound",
            MethodError::UnsupportedFilter(_) => "unsupportedFilter",
            MethodError::UnsupportedSort(_) => "unsupportedSort",
            MethodError::ServerFail(_) => "serverFail",
            MethodError::UnknownMethod(_) => "unknownMethod",
            MethodError::ServerUnavailable => "serverUnavailable",
            MethodError::ServerPartialFail => "serverPartialFail",
            MethodError::InvalidResultReference(_) => "invalidResultReference",
            MethodError::AccountNotFound => "accountNotFound",
            MethodError::NotFound => "notFound",
        }
    }
}

impl Serialize for MethodError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.error_type())?;

        let description = match self {
            MethodError::InvalidArguments(description) => description.as_str(),
            MethodError::RequestTooLarge => concat!(
                "The number of ids requested by the client exceeds the maximum number ",
                "the server is willing to process in a single method call."
            ),
            MethodError::StateMismatch(state) => {
                map.serialize_entry("currentState", state)?;
                concat!(
                    "An \"ifInState\" argument was supplied, but ",
                    "it does not match the current state."
                )
            }
            MethodError::CannotCalculateChanges(state) => {
                map.serialize_entry("currentState", state)?;
                concat!(
                    "The server cannot calculate the changes ",
                    "between the old and new states."
                )
            }
            MethodError::AnchorNotFound => concat!(
                "An anchor argument was supplied, but it ",
                "cannot be found in the results of the query."
            ),
            MethodError::UnsupportedFilter(description) => description.as_str(),
            MethodError::UnsupportedSort(description) => description.as_str(),
            MethodError::ServerFail(_) => concat!(
                "An unexpected error occurred while processing ",
                "this call, please contact the system administrator."
            ),
            MethodError::UnknownMethod(description) => description.as_str(),
            MethodError::ServerUnavailable => concat!(
                "This server is temporarily unavailable. ",
                "Attempting this same operation later may succeed."
            ),
            MethodError::ServerPartialFail => concat!(
                "Some, but not all, expected changes described by the method ",
                "occurred. Please resynchronize to determine server state."
            ),
            MethodError::InvalidResultReference(description) => description.as_str(),
            MethodError::AccountNotFound => {
                "The accountId does not correspond to a valid account."
            }
            MethodError::NotFound => "The requested object does not exist.",
        };

        if !description.is_empty() {
            map.serialize_entry("description", description)?;
        }
        map.end()
    }
}
