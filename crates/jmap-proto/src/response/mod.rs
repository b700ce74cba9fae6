/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use ahash::AHashMap;
use serde::ser::{SerializeSeq, SerializeStruct};
use serde::Serialize;
use serde_json::Value;

use crate::error::method::MethodError;
use crate::request::reference::{eval_pointer, ResultReference};

/// The ordered method-response list for one batch, plus the idmap of
/// creation references materialized so far. Responses are appended in
/// submission order; error results are kept in the list but are never
/// valid back-reference targets.
#[derive(Debug, Default)]
pub struct Response {
    pub method_responses: Vec<CallResponse>,
    pub created_ids: AHashMap<String, String>,
}

#[derive(Debug)]
pub struct CallResponse {
    pub name: String,
    pub response: Value,
    pub call_id: String,
    pub is_error: bool,
}

impl Response {
    pub fn new(capacity: usize) -> Self {
        Response {
            method_responses: Vec::with_capacity(capacity),
            created_ids: AHashMap::new(),
        }
    }

    pub fn push_response(
        &mut self,
        name: impl Into<String>,
        call_id: impl Into<String>,
        response: impl Serialize,
    ) {
        self.method_responses.push(CallResponse {
            name: name.into(),
            response: serde_json::to_value(response).unwrap_or(Value::Null),
            call_id: call_id.into(),
            is_error: false,
        });
    }

    pub fn push_error(&mut self, call_id: impl Into<String>, error: MethodError) {
        self.method_responses.push(CallResponse {
            name: "error".to_string(),
            response: serde_json::to_value(&error).unwrap_or(Value::Null),
            call_id: call_id.into(),
            is_error: true,
        });
    }

    /// Rewrites every `#key` argument in place per the back-reference
    /// contract: the referenced call must be an earlier, non-error
    /// result; the pointer path is applied to its body; non-array
    /// results are wrapped in a singleton array.
    pub fn resolve_references(
        &self,
        arguments: &mut serde_json::Map<String, Value>,
    ) -> Result<(), MethodError> {
        let reference_keys = arguments
            .keys()
            .filter(|key| key.starts_with('#'))
            .cloned()
            .collect::<Vec<_>>();

        for key in reference_keys {
            let target = key[1..].to_string();
            if arguments.contains_key(&target) {
                return Err(MethodError::InvalidArguments(format!(
                    "Request references {key:?} but also contains {target:?}."
                )));
            }
            let value = arguments.remove(&key).unwrap_or(Value::Null);
            let reference = serde_json::from_value::<ResultReference>(value).map_err(|_| {
                MethodError::InvalidResultReference(format!(
                    "Failed to parse result reference {key:?}."
                ))
            })?;
            let resolved = self.eval_result_reference(&reference)?;
            arguments.insert(target, resolved);
        }

        Ok(())
    }

    fn eval_result_reference(&self, rr: &ResultReference) -> Result<Value, MethodError> {
        let source = self
            .method_responses
            .iter()
            .find(|response| {
                !response.is_error && response.call_id == rr.result_of && response.name == rr.name
            })
            .ok_or_else(|| {
                MethodError::InvalidResultReference(format!(
                    "No previous result found for reference {rr}."
                ))
            })?;

        match eval_pointer(&rr.path, &source.response) {
            Some(value @ Value::Array(_)) => Ok(value),
            Some(value) => Ok(Value::Array(vec![value])),
            None => Err(MethodError::InvalidResultReference(format!(
                "Failed to evaluate {rr} result reference."
            ))),
        }
    }
}

impl Serialize for Response {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut body = serializer.serialize_struct("Response", 1)?;
        body.serialize_field("methodResponses", &self.method_responses)?;
        body.end()
    }
}

impl Serialize for CallResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut triple = serializer.serialize_seq(Some(3))?;
        triple.serialize_element(&self.name)?;
        triple.serialize_element(&self.response)?;
        triple.serialize_element(&self.call_id)?;
        triple.end()
    }
}
