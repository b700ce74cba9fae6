/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

pub mod capability;
pub mod reference;

use std::fmt::Display;

use serde::Deserialize;
use serde_json::Value;

use crate::error::request::{RequestError, RequestLimitError};

/// A decoded JMAP request envelope: an ordered list of method calls
/// plus the capabilities the client claims to be using.
#[derive(Debug)]
pub struct Request {
    pub using: Vec<String>,
    pub method_calls: Vec<Call>,
}

/// One method call: `[name, arguments, clientTag]` on the wire. The
/// arguments stay as raw JSON until back-references are resolved and
/// the registered handler deserializes its typed request.
#[derive(Debug)]
pub struct Call {
    pub id: String,
    pub name: MethodName,
    pub arguments: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodName {
    pub obj: MethodObject,
    pub fnc: MethodFunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodObject {
    Core,
    Mailbox,
    Thread,
    Email,
    Identity,
    EmailSubmission,
    VacationResponse,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodFunction {
    Echo,
    Get,
    Changes,
    Query,
    QueryChanges,
    Set,
    Unknown,
}

#[derive(Deserialize)]
struct RawRequest {
    #[serde(default)]
    using: Vec<String>,
    #[serde(rename = "methodCalls")]
    method_calls: Vec<(String, serde_json::Map<String, Value>, String)>,
}

impl Request {
    pub fn parse(bytes: &[u8], max_calls: usize, max_size: usize) -> Result<Self, RequestError> {
        if bytes.len() > max_size {
            return Err(RequestError::limit(RequestLimitError::SizeRequest));
        }
        let raw = serde_json::from_slice::<RawRequest>(bytes)
            .map_err(|err| RequestError::not_request(err.to_string()))?;
        if raw.method_calls.len() > max_calls {
            return Err(RequestError::limit(RequestLimitError::CallsIn));
        }

        Ok(Request {
            using: raw.using,
            method_calls: raw
                .method_calls
                .into_iter()
                .map(|(name, arguments, id)| Call {
                    name: MethodName::parse(&name),
                    arguments,
                    id,
                })
                .collect(),
        })
    }
}

impl MethodName {
    pub fn new(obj: MethodObject, fnc: MethodFunction) -> Self {
        MethodName { obj, fnc }
    }

    pub fn error() -> Self {
        MethodName {
            obj: MethodObject::Unknown,
            fnc: MethodFunction::Unknown,
        }
    }

    pub fn parse(name: &str) -> Self {
        let Some((obj, fnc)) = name.split_once('/') else {
            return MethodName::error();
        };
        MethodName {
            obj: match obj {
                "Core" => MethodObject::Core,
                "Mailbox" => MethodObject::Mailbox,
                "Thread" => MethodObject::Thread,
                "Email" => MethodObject::Email,
                "Identity" => MethodObject::Identity,
                "EmailSubmission" => MethodObject::EmailSubmission,
                "VacationResponse" => MethodObject::VacationResponse,
                _ => MethodObject::Unknown,
            },
            fnc: match fnc {
                "echo" => MethodFunction::Echo,
                "get" => MethodFunction::Get,
                "changes" => MethodFunction::Changes,
                "query" => MethodFunction::Query,
                "queryChanges" => MethodFunction::QueryChanges,
                "set" => MethodFunction::Set,
                _ => MethodFunction::Unknown,
            },
        }
    }

    pub fn is_known(&self) -> bool {
        self.obj != MethodObject::Unknown && self.fnc != MethodFunction::Unknown
    }

    pub fn as_str(&self) -> &'static str {
        match (self.obj, self.fnc) {
            (MethodObject::Core, MethodFunction::Echo) => "Core/echo",
            (MethodObject::Mailbox, MethodFunction::Get) => "Mailbox/get",
            (MethodObject::Mailbox, MethodFunction::Changes) => "Mailbox/changes",
            (MethodObject::Mailbox, MethodFunction::Query) => "Mailbox/query",
            (MethodObject::Mailbox, MethodFunction::QueryChanges) => "Mailbox/queryChanges",
            (MethodObject::Mailbox, MethodFunction::Set) => "Mailbox/set",
            (MethodObject::Thread, MethodFunction::Get) => "Thread/get",
            (MethodObject::Thread, MethodFunction::Changes) => "Thread/changes",
            (MethodObject::Email, MethodFunction::Get) => "Email/get",
            (MethodObject::Email, MethodFunction::Changes) => "Email/changes",
            (MethodObject::Email, MethodFunction::Query) => "Email/query",
            (MethodObject::Email, MethodFunction::QueryChanges) => "Email/queryChanges",
            (MethodObject::Email, MethodFunction::Set) => "Email/set",
            (MethodObject::Identity, MethodFunction::Get) => "Identity/get",
            (MethodObject::Identity, MethodFunction::Changes) => "Identity/changes",
            (MethodObject::Identity, MethodFunction::Set) => "Identity/set",
            (MethodObject::EmailSubmission, MethodFunction::Get) => "EmailSubmission/get",
            (MethodObject::EmailSubmission, MethodFunction::Changes) => {
                "EmailSubmission/changes"
            }
            (MethodObject::EmailSubmission, MethodFunction::Query) => "EmailSubmission/query",
            (MethodObject::EmailSubmission, MethodFunction::QueryChanges) => {
                "EmailSubmission/queryChanges"
            }
            (MethodObject::EmailSubmission, MethodFunction::Set) => "EmailSubmission/set",
            (MethodObject::VacationResponse, MethodFunction::Get) => "VacationResponse/get",
            (MethodObject::VacationResponse, MethodFunction::Set) => "VacationResponse/set",
            _ => "error",
        }
    }
}

impl Display for MethodName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{MethodFunction, MethodName, MethodObject, Request};

    #[test]
    fn parse_request_envelope() {
        let request = Request::parse(
            br#"{
                "using": ["urn:ietf:params:jmap:core", "urn:ietf:params:jmap:mail"],
                "methodCalls": [
                    ["Mailbox/get", {"accountId": "a"}, "0"],
                    ["Frobnicate/make", {}, "1"]
                ]
            }"#,
            16,
            1024,
        )
        .unwrap();
        assert_eq!(request.using.len(), 2);
        assert_eq!(request.method_calls.len(), 2);
        assert_eq!(
            request.method_calls[0].name,
            MethodName::new(MethodObject::Mailbox, MethodFunction::Get)
        );
        assert!(!request.method_calls[1].name.is_known());
        assert_eq!(request.method_calls[1].id, "1");
    }

    #[test]
    fn known_method_names_round_trip() {
        for name in [
            "Core/echo",
            "Mailbox/get",
            "Mailbox/changes",
            "Mailbox/query",
            "Mailbox/queryChanges",
            "Mailbox/set",
            "Thread/get",
            "Thread/changes",
            "Email/get",
            "Email/changes",
            "Email/query",
            "Email/queryChanges",
            "Email/set",
            "Identity/get",
            "Identity/changes",
            "Identity/set",
            "EmailSubmission/get",
            "EmailSubmission/changes",
            "EmailSubmission/query",
            "EmailSubmission/queryChanges",
            "EmailSubmission/set",
            "VacationResponse/get",
            "VacationResponse/set",
        ] {
            assert_eq!(MethodName::parse(name).as_str(), name, "{name}");
        }
    }

    #[test]
    fn enforce_request_limits() {
        let body = br#"{"methodCalls": [["Core/echo", {}, "0"], ["Core/echo", {}, "1"]]}"#;
        assert!(Request::parse(body, 1, 1024).is_err());
        assert!(Request::parse(body, 16, 8).is_err());
        assert!(Request::parse(b"this is not json", 16, 1024).is_err());
        assert!(Request::parse(body, 16, 1024).is_ok());
    }
}
