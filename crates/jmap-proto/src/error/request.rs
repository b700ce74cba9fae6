/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::borrow::Cow;

/// Request-level (as opposed to method-call-level) errors, serialized
/// as RFC 7807 problem details in the HTTP response body.
#[derive(Debug, serde::Serialize)]
pub struct RequestError {
    #[serde(rename = "type")]
    pub p_type: RequestErrorType,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Cow<'static, str>>,
    pub detail: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<RequestLimitError>,
}

#[derive(Debug, Copy, Clone, serde::Serialize)]
pub enum RequestErrorType {
    #[serde(rename = "urn:ietf:params:jmap:error:unknownCapability")]
    UnknownCapability,
    #[serde(rename = "urn:ietf:params:jmap:error:notJSON")]
    NotJson,
    #[serde(rename = "urn:ietf:params:jmap:error:notRequest")]
    NotRequest,
    #[serde(rename = "urn:ietf:params:jmap:error:limit")]
    Limit,
    #[serde(rename = "about:blank")]
    Other,
}

#[derive(Debug, Copy, Clone, serde::Serialize)]
pub enum RequestLimitError {
    #[serde(rename = "maxSizeRequest")]
    SizeRequest,
    #[serde(rename = "maxCallsInRequest")]
    CallsIn,
}

impl RequestError {
    pub fn blank(
        status: u16,
        title: impl Into<Cow<'static, str>>,
        detail: impl Into<Cow<'static, str>>,
    ) -> Self {
        RequestError {
            p_type: RequestErrorType::Other,
            status,
            title: Some(title.into()),
            detail: detail.into(),
            limit: None,
        }
    }

    pub fn not_found() -> Self {
        Self::blank(
            404,
            "Not Found",
            "There is nothing here, please move along.",
        )
    }

    pub fn not_json() -> Self {
        RequestError {
            p_type: RequestErrorType::NotJson,
            status: 400,
            title: None,
            detail: "The request did not contain valid JSON.".into(),
            limit: None,
        }
    }

    pub fn not_request(detail: impl Into<Cow<'static, str>>) -> Self {
        RequestError {
            p_type: RequestErrorType::NotRequest,
            status: 400,
            title: None,
            detail: detail.into(),
            limit: None,
        }
    }

    pub fn limit(limit: RequestLimitError) -> Self {
        RequestError {
            p_type: RequestErrorType::Limit,
            status: 400,
            title: None,
            detail: match limit {
                RequestLimitError::SizeRequest => concat!(
                    "The request is larger than the server ",
                    "is willing to process."
                ),
                RequestLimitError::CallsIn => concat!(
                    "The request exceeds the maximum number ",
                    "of calls in a single request."
                ),
            }
            .into(),
            limit: Some(limit),
        }
    }
}
