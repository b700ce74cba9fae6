/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Compiles JMAP email filter trees into IMAP SEARCH programs. IMAP
//! OR is binary, so n-ary disjunctions right-fold into nested ORs;
//! NOT applies to the disjunction of its children.

use chrono::NaiveDate;
use jmap_proto::error::method::MethodError;
use jmap_proto::types::filter::{Comparator, Filter, Operator};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    All,
    And(Vec<SearchKey>),
    Or(Box<SearchKey>, Box<SearchKey>),
    Not(Box<SearchKey>),
    InMailbox(String),
    From(String),
    To(String),
    Cc(String),
    Bcc(String),
    Subject(String),
    Body(String),
    Text(String),
    Keyword(String),
    Unkeyword(String),
    Before(NaiveDate),
    Since(NaiveDate),
    Larger(u32),
    Smaller(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    ReceivedAt,
    SentAt,
    Size,
    Subject,
    From,
    To,
}

/// Builds the search program for a JMAP filter, or `All` when no
/// filter was given.
pub fn compile_filter(filter: Option<&Filter>) -> Result<SearchKey, MethodError> {
    match filter {
        None => Ok(SearchKey::All),
        Some(filter) => {
            filter.validate()?;
            compile_node(filter)
        }
    }
}

fn compile_node(filter: &Filter) -> Result<SearchKey, MethodError> {
    match filter {
        Filter::Condition(fields) => {
            let mut keys = Vec::with_capacity(fields.len());
            for (field, value) in fields {
                keys.push(compile_leaf(field, value)?);
            }
            Ok(collapse_and(keys))
        }
        Filter::Operator(op) => {
            let mut keys = Vec::with_capacity(op.conditions.len());
            for condition in &op.conditions {
                keys.push(compile_node(condition)?);
            }
            Ok(match op.operator {
                Operator::And => collapse_and(keys),
                Operator::Or => fold_or(keys),
                Operator::Not => SearchKey::Not(Box::new(fold_or(keys))),
            })
        }
    }
}

fn collapse_and(mut keys: Vec<SearchKey>) -> SearchKey {
    if keys.len() == 1 {
        keys.pop().unwrap()
    } else {
        SearchKey::And(keys)
    }
}

/// Right fold: `[a, b, c]` becomes `OR a (OR b c)`.
fn fold_or(keys: Vec<SearchKey>) -> SearchKey {
    let mut it = keys.into_iter().rev();
    let mut folded = it.next().unwrap_or(SearchKey::All);
    for key in it {
        folded = SearchKey::Or(Box::new(key), Box::new(folded));
    }
    folded
}

fn compile_leaf(field: &str, value: &Value) -> Result<SearchKey, MethodError> {
    let unsupported = || {
        MethodError::UnsupportedFilter(format!("Unsupported email filter {field:?}."))
    };
    Ok(match field {
        "inMailbox" => SearchKey::InMailbox(as_string(value).ok_or_else(unsupported)?),
        "from" => SearchKey::From(as_string(value).ok_or_else(unsupported)?),
        "to" => SearchKey::To(as_string(value).ok_or_else(unsupported)?),
        "cc" => SearchKey::Cc(as_string(value).ok_or_else(unsupported)?),
        "bcc" => SearchKey::Bcc(as_string(value).ok_or_else(unsupported)?),
        "subject" => SearchKey::Subject(as_string(value).ok_or_else(unsupported)?),
        "body" => SearchKey::Body(as_string(value).ok_or_else(unsupported)?),
        "text" => SearchKey::Text(as_string(value).ok_or_else(unsupported)?),
        "hasKeyword" => SearchKey::Keyword(imap_flag(value).ok_or_else(unsupported)?),
        "notKeyword" => SearchKey::Unkeyword(imap_flag(value).ok_or_else(unsupported)?),
        "before" => SearchKey::Before(as_date(value).ok_or_else(unsupported)?),
        "after" => SearchKey::Since(as_date(value).ok_or_else(unsupported)?),
        "minSize" => SearchKey::Larger(as_size(value).ok_or_else(unsupported)?.saturating_sub(1)),
        "maxSize" => SearchKey::Smaller(as_size(value).ok_or_else(unsupported)?),
        _ => return Err(unsupported()),
    })
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(|s| s.to_string())
}

fn imap_flag(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(|s| jmap_proto::types::keyword::Keyword::parse(s).to_imap_flag().to_string())
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    chrono::DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|dt| dt.date_naive())
}

fn as_size(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

pub fn compile_sort(sort: Option<&[Comparator]>) -> Result<Vec<SortKey>, MethodError> {
    let Some(sort) = sort else {
        return Ok(vec![SortKey {
            field: SortField::ReceivedAt,
            ascending: true,
        }]);
    };
    sort.iter()
        .map(|comparator| {
            let field = match comparator.property.as_str() {
                "receivedAt" => SortField::ReceivedAt,
                "sentAt" => SortField::SentAt,
                "size" => SortField::Size,
                "subject" => SortField::Subject,
                "from" => SortField::From,
                "to" => SortField::To,
                other => {
                    return Err(MethodError::UnsupportedSort(format!(
                        "Unsupported email sort property {other:?}."
                    )))
                }
            };
            Ok(SortKey {
                field,
                ascending: comparator.is_ascending,
            })
        })
        .collect()
}

impl SearchKey {
    /// Renders the wire-format SEARCH program. Compound operands of
    /// OR and NOT are grouped with a parenthesized list.
    pub fn to_imap_string(&self) -> String {
        match self {
            SearchKey::All => "ALL".to_string(),
            SearchKey::And(keys) => keys
                .iter()
                .map(|key| key.to_imap_string())
                .collect::<Vec<_>>()
                .join(" "),
            SearchKey::Or(a, b) => {
                format!("OR {} {}", a.to_imap_group(), b.to_imap_group())
            }
            SearchKey::Not(key) => format!("NOT {}", key.to_imap_group()),
            SearchKey::InMailbox(id) => format!("INMAILBOX {}", quote(id)),
            SearchKey::From(s) => format!("FROM {}", quote(s)),
            SearchKey::To(s) => format!("TO {}", quote(s)),
            SearchKey::Cc(s) => format!("CC {}", quote(s)),
            SearchKey::Bcc(s) => format!("BCC {}", quote(s)),
            SearchKey::Subject(s) => format!("SUBJECT {}", quote(s)),
            SearchKey::Body(s) => format!("BODY {}", quote(s)),
            SearchKey::Text(s) => format!("TEXT {}", quote(s)),
            SearchKey::Keyword(flag) => format!("KEYWORD {flag}"),
            SearchKey::Unkeyword(flag) => format!("UNKEYWORD {flag}"),
            SearchKey::Before(date) => format!("BEFORE {}", date.format("%d-%b-%Y")),
            SearchKey::Since(date) => format!("SINCE {}", date.format("%d-%b-%Y")),
            SearchKey::Larger(n) => format!("LARGER {n}"),
            SearchKey::Smaller(n) => format!("SMALLER {n}"),
        }
    }

    fn to_imap_group(&self) -> String {
        match self {
            SearchKey::And(_) => format!("({})", self.to_imap_string()),
            _ => self.to_imap_string(),
        }
    }
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}
