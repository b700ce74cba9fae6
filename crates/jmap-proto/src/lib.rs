/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Wire-level JMAP types: request/response envelopes, method call
//! structs, state tokens, identifier codecs, filter trees and the
//! error taxonomy. This crate performs no I/O.

pub mod error;
pub mod method;
pub mod request;
pub mod response;
pub mod types;
