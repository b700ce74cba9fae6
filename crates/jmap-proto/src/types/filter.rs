/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use serde::Deserialize;
use serde_json::Value;

use crate::error::method::MethodError;

/// A JMAP FilterOperator tree. Leaves are maps of field name to
/// argument; internal nodes combine their children with AND/OR/NOT,
/// where NOT negates the disjunction of its children.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Operator(FilterOperator),
    Condition(serde_json::Map<String, Value>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterOperator {
    pub operator: Operator,
    pub conditions: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Operator {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "NOT")]
    Not,
}

impl Filter {
    /// Rejects operator nodes with empty condition lists anywhere in
    /// the tree.
    pub fn validate(&self) -> Result<(), MethodError> {
        match self {
            Filter::Condition(_) => Ok(()),
            Filter::Operator(op) => {
                if op.conditions.is_empty() {
                    return Err(MethodError::InvalidArguments(
                        "Filter operator with empty conditions.".to_string(),
                    ));
                }
                for condition in &op.conditions {
                    condition.validate()?;
                }
                Ok(())
            }
        }
    }
}

/// One entry of a JMAP sort list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparator {
    pub property: String,
    #[serde(default = "default_ascending")]
    pub is_ascending: bool,
}

fn default_ascending() -> bool {
    true
}
