/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! HTTP status policy: request-level failures (bad path, non-JSON
//! body, envelope too large) map to 4xx problem-details responses;
//! everything that reaches the executor returns 200 with any
//! per-method errors carried inside the response body.

use jmap_proto::error::request::RequestError;

use crate::JMAP;

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    fn json(status: u16, body: impl serde::Serialize) -> Self {
        HttpResponse {
            status,
            content_type: CONTENT_TYPE_JSON,
            body: serde_json::to_string(&body).unwrap_or_default(),
        }
    }

    fn problem(error: RequestError) -> Self {
        HttpResponse {
            status: error.status,
            content_type: "application/problem+json",
            body: serde_json::to_string(&error).unwrap_or_default(),
        }
    }
}

impl JMAP {
    pub async fn handle_http(
        &self,
        method: &str,
        path: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> HttpResponse {
        if method.eq_ignore_ascii_case("GET") && path == self.config.session_path {
            return HttpResponse::json(200, self.session_object());
        }
        if !method.eq_ignore_ascii_case("POST") || path != self.config.api_path {
            return HttpResponse::problem(RequestError::not_found());
        }
        if !content_type
            .is_some_and(|value| value.split(';').next().unwrap_or("").trim() == "application/json")
        {
            return HttpResponse::problem(RequestError::not_json());
        }
        match self.handle_request(body).await {
            Ok(response) => HttpResponse::json(200, response),
            Err(error) => HttpResponse::problem(error),
        }
    }
}
