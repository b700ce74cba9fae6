/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use serde::Deserialize;
use serde_json::Value;

/// A resultReference argument value: points at a prior call's result
/// by client tag + method name, and extracts part of it via a JSON
/// pointer that additionally supports the `*` array wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultReference {
    pub result_of: String,
    pub name: String,
    pub path: String,
}

impl std::fmt::Display for ResultReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.result_of, self.name, self.path)
    }
}

/// Evaluates an RFC 6901 pointer over `value`, extended with `*`:
/// the wildcard maps the remaining path over every array element and
/// flattens one level of nesting. Returns None when the path does not
/// resolve.
pub fn eval_pointer(path: &str, value: &Value) -> Option<Value> {
    let mut tokens = path.split('/');
    // A pointer is either "" (whole document) or starts with '/'.
    match tokens.next() {
        Some("") if path.is_empty() => return Some(value.clone()),
        Some("") => {}
        _ => return None,
    }
    eval_tokens(tokens, value)
}

fn eval_tokens<'x>(mut tokens: std::str::Split<'x, char>, value: &Value) -> Option<Value> {
    let Some(token) = tokens.next() else {
        return Some(value.clone());
    };

    if token == "*" {
        let items = value.as_array()?;
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            match eval_tokens(tokens.clone(), item)? {
                Value::Array(nested) => results.extend(nested),
                single => results.push(single),
            }
        }
        return Some(Value::Array(results));
    }

    let token = unescape(token);
    match value {
        Value::Object(map) => eval_tokens(tokens, map.get(token.as_ref())?),
        Value::Array(items) => {
            let index: usize = token.parse().ok()?;
            eval_tokens(tokens, items.get(index)?)
        }
        _ => None,
    }
}

fn unescape(token: &str) -> std::borrow::Cow<'_, str> {
    if token.contains('~') {
        token.replace("~1", "/").replace("~0", "~").into()
    } else {
        token.into()
    }
}
