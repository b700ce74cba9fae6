/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The batch executor. Calls run strictly in submission order; a
//! failed call becomes an `error` result in its slot and the batch
//! carries on. EmailSubmission/set may splice a follow-on Email/set
//! response directly after its own.

use jmap_proto::error::method::MethodError;
use jmap_proto::error::request::RequestError;
use jmap_proto::method::changes::ChangesRequest;
use jmap_proto::method::get::GetRequest;
use jmap_proto::method::query::{QueryChangesRequest, QueryRequest};
use jmap_proto::method::set::SetRequest;
use jmap_proto::request::{Call, MethodFunction, MethodObject, Request};
use jmap_proto::response::Response;
use jmap_proto::types::state::State;
use serde::de::DeserializeOwned;
use serde_json::Value;
use store::EntityType;

use crate::{store_fail, JMAP};

impl JMAP {
    pub async fn handle_request(&self, bytes: &[u8]) -> Result<Response, RequestError> {
        let request = Request::parse(
            bytes,
            self.config.request_max_calls,
            self.config.request_max_size,
        )?;
        let mut response = Response::new(request.method_calls.len());

        for mut call in request.method_calls {
            tracing::debug!(
                method = call.name.as_str(),
                call_id = call.id.as_str(),
                "Processing method call"
            );
            if let Err(err) = response.resolve_references(&mut call.arguments) {
                response.push_error(call.id, err);
                continue;
            }
            if !call.name.is_known() {
                response.push_error(
                    call.id,
                    MethodError::UnknownMethod(
                        "Method not supported by this server.".to_string(),
                    ),
                );
                continue;
            }
            self.handle_call(call, &mut response).await;
        }

        Ok(response)
    }

    async fn handle_call(&self, call: Call, response: &mut Response) {
        let name = call.name;
        let call_id = call.id;
        let arguments = call.arguments;

        // Set handlers grow the idmap; it is moved out for the
        // duration of the call and restored afterwards.
        let mut created_ids = std::mem::take(&mut response.created_ids);

        let result: Result<(), MethodError> = match (name.obj, name.fnc) {
            (MethodObject::Core, MethodFunction::Echo) => {
                response.push_response(name.as_str(), call_id.clone(), Value::Object(arguments));
                Ok(())
            }
            (MethodObject::Mailbox, MethodFunction::Get) => {
                match self.mailbox_get(parse::<GetRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Mailbox, MethodFunction::Changes) => {
                match self.mailbox_changes(parse::<ChangesRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Mailbox, MethodFunction::Query) => {
                match self.mailbox_query(parse::<QueryRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Mailbox, MethodFunction::Set) => {
                match self
                    .mailbox_set(parse::<SetRequest>(arguments), &mut created_ids)
                    .await
                {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Thread, MethodFunction::Changes) => {
                match self.thread_changes(parse::<ChangesRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Thread, MethodFunction::Get) => {
                match self.thread_get(parse::<GetRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Email, MethodFunction::Get) => {
                match self.email_get(parse::<GetRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Email, MethodFunction::Changes) => {
                match self.email_changes(parse::<ChangesRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Email, MethodFunction::Query) => {
                match self.email_query(parse::<QueryRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Email, MethodFunction::Set) => {
                match self
                    .email_set(parse::<SetRequest>(arguments), &mut created_ids)
                    .await
                {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Identity, MethodFunction::Get) => {
                match self.identity_get(parse::<GetRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Identity, MethodFunction::Changes) => {
                match self.identity_changes(parse::<ChangesRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::Identity, MethodFunction::Set) => {
                match self
                    .identity_set(parse::<SetRequest>(arguments), &mut created_ids)
                    .await
                {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::EmailSubmission, MethodFunction::Get) => {
                match self.submission_get(parse::<GetRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::EmailSubmission, MethodFunction::Changes) => {
                match self
                    .submission_changes(parse::<ChangesRequest>(arguments))
                    .await
                {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::EmailSubmission, MethodFunction::Query) => {
                match self.submission_query(parse::<QueryRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::EmailSubmission, MethodFunction::Set) => {
                match self
                    .submission_set(parse::<SetRequest>(arguments), &mut created_ids)
                    .await
                {
                    Ok((body, follow_on)) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        if let Some(follow_on) = follow_on {
                            match self.email_set(Ok(follow_on), &mut created_ids).await {
                                Ok(body) => response.push_response(
                                    "Email/set",
                                    call_id.clone(),
                                    body,
                                ),
                                Err(err) => response.push_error(call_id.clone(), err),
                            }
                        }
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::VacationResponse, MethodFunction::Get) => {
                match self.vacation_get(parse::<GetRequest>(arguments)).await {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (MethodObject::VacationResponse, MethodFunction::Set) => {
                match self
                    .vacation_set(parse::<SetRequest>(arguments), &mut created_ids)
                    .await
                {
                    Ok(body) => {
                        response.push_response(name.as_str(), call_id.clone(), body);
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            (_, MethodFunction::QueryChanges) => {
                match self
                    .query_changes(name.obj, parse::<QueryChangesRequest>(arguments))
                    .await
                {
                    Ok(never) => match never {},
                    Err(err) => Err(err),
                }
            }
            _ => Err(MethodError::UnknownMethod(
                "Method not supported by this server.".to_string(),
            )),
        };

        response.created_ids = created_ids;
        if let Err(err) = result {
            tracing::debug!(
                method = name.as_str(),
                call_id = call_id.as_str(),
                error = %err,
                "Method call failed"
            );
            response.push_error(call_id, err);
        }
    }

    /// queryChanges is declined uniformly: every query response
    /// advertises canCalculateChanges: false, and a client insisting
    /// anyway receives cannotCalculateChanges with the current state.
    async fn query_changes(
        &self,
        obj: MethodObject,
        request: Result<QueryChangesRequest, MethodError>,
    ) -> Result<std::convert::Infallible, MethodError> {
        let request = request?;
        let account = self.account(&request.account_id)?;
        let current = match obj {
            MethodObject::Email => State::Mail(self.current_mail_state(&account).await?),
            MethodObject::Mailbox => State::Scalar(
                self.store
                    .current_state(&request.account_id, EntityType::Mailbox)
                    .await
                    .map_err(store_fail)?,
            ),
            MethodObject::EmailSubmission => State::Scalar(
                self.store
                    .current_state(&request.account_id, EntityType::EmailSubmission)
                    .await
                    .map_err(store_fail)?,
            ),
            _ => {
                return Err(MethodError::UnknownMethod(
                    "Method not supported by this server.".to_string(),
                ))
            }
        };
        Err(self.query_changes_unsupported(current))
    }

    pub(crate) fn check_get_limit(&self, request: &GetRequest) -> Result<(), MethodError> {
        if request
            .ids
            .as_ref()
            .is_some_and(|ids| ids.len() > self.config.get_max_objects)
        {
            Err(MethodError::RequestTooLarge)
        } else {
            Ok(())
        }
    }

    pub(crate) fn check_set_limit(&self, request: &SetRequest) -> Result<(), MethodError> {
        if request.total_operations() > self.config.set_max_objects {
            Err(MethodError::RequestTooLarge)
        } else {
            Ok(())
        }
    }
}

fn parse<T: DeserializeOwned>(
    arguments: serde_json::Map<String, Value>,
) -> Result<T, MethodError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|err| MethodError::InvalidArguments(err.to_string()))
}
