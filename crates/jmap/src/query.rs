/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Shared query plumbing: the position/anchor/limit window applied to
//! every entity type's full result list, and the JMAP-filter-to-SQL
//! compiler used by SQLite-cached entities. Filter values are always
//! bound parameters, never interpolated.

use jmap_proto::error::method::MethodError;
use jmap_proto::method::query::QueryRequest;
use jmap_proto::types::filter::{Comparator, Filter, Operator};
use serde_json::Value;
use store::SqlValue;

pub(crate) struct Window {
    pub ids: Vec<String>,
    pub position: usize,
    pub total: usize,
    /// Echoed back only when the requested limit was clamped.
    pub limit: Option<usize>,
}

pub(crate) fn window(
    ids: Vec<String>,
    request: &QueryRequest,
    max_results: usize,
) -> Result<Window, MethodError> {
    if request.position.is_some() && request.anchor.is_some() {
        return Err(MethodError::InvalidArguments(
            "position and anchor are mutually exclusive.".to_string(),
        ));
    }
    if request.anchor.is_some() != request.anchor_offset.is_some() {
        return Err(MethodError::InvalidArguments(
            "anchor and anchorOffset must be supplied together.".to_string(),
        ));
    }

    let total = ids.len();
    let (limit, clamped) = match request.limit {
        Some(limit) if limit > max_results => (max_results, Some(max_results)),
        Some(limit) => (limit, None),
        None => (max_results, None),
    };

    let position = if let Some(anchor) = &request.anchor {
        let index = ids
            .iter()
            .position(|id| id == anchor)
            .ok_or(MethodError::AnchorNotFound)? as i64;
        (index + request.anchor_offset.unwrap_or(0)).max(0) as usize
    } else {
        let position = request.position.unwrap_or(0);
        if position < 0 {
            (position + total as i64).max(0) as usize
        } else {
            position as usize
        }
    };

    let ids = if position < total {
        ids[position..(position + limit).min(total)].to_vec()
    } else {
        Vec::new()
    };

    Ok(Window {
        ids,
        position,
        total,
        limit: clamped,
    })
}

/// A leaf compiler maps one (field, argument) pair to a WHERE
/// fragment plus its bound values, or fails with unsupportedFilter.
pub(crate) type SqlLeaf<'x> =
    &'x dyn Fn(&str, &Value) -> Result<(String, Vec<SqlValue>), MethodError>;

pub(crate) fn compile_sql_filter(
    filter: Option<&Filter>,
    leaf: SqlLeaf<'_>,
) -> Result<(String, Vec<SqlValue>), MethodError> {
    match filter {
        None => Ok((String::new(), Vec::new())),
        Some(filter) => {
            filter.validate()?;
            compile_sql_node(filter, leaf)
        }
    }
}

fn compile_sql_node(
    filter: &Filter,
    leaf: SqlLeaf<'_>,
) -> Result<(String, Vec<SqlValue>), MethodError> {
    match filter {
        Filter::Condition(fields) => {
            let mut fragments = Vec::with_capacity(fields.len());
            let mut params = Vec::new();
            for (field, value) in fields {
                let (sql, mut bound) = leaf(field, value)?;
                fragments.push(sql);
                params.append(&mut bound);
            }
            Ok((join_fragments(fragments, " AND "), params))
        }
        Filter::Operator(op) => {
            let mut fragments = Vec::with_capacity(op.conditions.len());
            let mut params = Vec::new();
            for condition in &op.conditions {
                let (sql, mut bound) = compile_sql_node(condition, leaf)?;
                fragments.push(sql);
                params.append(&mut bound);
            }
            let joined = match op.operator {
                Operator::And => join_fragments(fragments, " AND "),
                Operator::Or => join_fragments(fragments, " OR "),
                Operator::Not => format!("NOT ({})", join_fragments(fragments, " OR ")),
            };
            Ok((joined, params))
        }
    }
}

fn join_fragments(fragments: Vec<String>, separator: &str) -> String {
    if fragments.len() == 1 {
        fragments.into_iter().next().unwrap()
    } else {
        let mut joined = String::new();
        for (n, fragment) in fragments.into_iter().enumerate() {
            if n > 0 {
                joined.push_str(separator);
            }
            joined.push('(');
            joined.push_str(&fragment);
            joined.push(')');
        }
        joined
    }
}

/// Builds an ORDER BY list from a JMAP sort, with a per-entity column
/// mapping. An unmapped property fails with unsupportedSort.
pub(crate) fn compile_sql_sort(
    sort: Option<&[Comparator]>,
    column_for: &dyn Fn(&str) -> Option<String>,
    default_order: &str,
) -> Result<String, MethodError> {
    let Some(sort) = sort.filter(|sort| !sort.is_empty()) else {
        return Ok(default_order.to_string());
    };
    let mut order = String::new();
    for (n, comparator) in sort.iter().enumerate() {
        let column = column_for(&comparator.property).ok_or_else(|| {
            MethodError::UnsupportedSort(format!(
                "Unsupported sort property {:?}.",
                comparator.property
            ))
        })?;
        if n > 0 {
            order.push_str(", ");
        }
        order.push_str(&column);
        order.push_str(if comparator.is_ascending { " ASC" } else { " DESC" });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::window;
    use jmap_proto::error::method::MethodError;
    use jmap_proto::method::query::QueryRequest;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id{i}")).collect()
    }

    fn request() -> QueryRequest {
        serde_json::from_value(serde_json::json!({"accountId": "a"})).unwrap()
    }

    #[test]
    fn negative_position_counts_from_the_end() {
        let mut req = request();
        req.position = Some(-2);
        let win = window(ids(5), &req, 1000).unwrap();
        assert_eq!(win.position, 3);
        assert_eq!(win.ids, ["id3", "id4"]);

        // Past the start clamps to zero.
        req.position = Some(-10);
        let win = window(ids(5), &req, 1000).unwrap();
        assert_eq!(win.position, 0);
        assert_eq!(win.ids.len(), 5);
    }

    #[test]
    fn anchor_resolves_to_its_index() {
        let mut req = request();
        req.anchor = Some("id2".to_string());
        req.anchor_offset = Some(1);
        let win = window(ids(5), &req, 1000).unwrap();
        assert_eq!(win.position, 3);
        assert_eq!(win.ids[0], "id3");

        req.anchor = Some("missing".to_string());
        assert!(matches!(
            window(ids(5), &req, 1000),
            Err(MethodError::AnchorNotFound)
        ));
    }

    #[test]
    fn anchor_and_position_are_exclusive() {
        let mut req = request();
        req.position = Some(1);
        req.anchor = Some("id1".to_string());
        req.anchor_offset = Some(0);
        assert!(window(ids(3), &req, 1000).is_err());

        let mut req = request();
        req.anchor = Some("id1".to_string());
        assert!(window(ids(3), &req, 1000).is_err(), "anchor without anchorOffset");

        let mut req = request();
        req.anchor_offset = Some(2);
        assert!(window(ids(3), &req, 1000).is_err(), "anchorOffset without anchor");
    }

    #[test]
    fn limit_is_clamped_and_echoed() {
        let mut req = request();
        req.limit = Some(5000);
        let win = window(ids(3), &req, 1000).unwrap();
        assert_eq!(win.limit, Some(1000));

        req.limit = Some(2);
        let win = window(ids(3), &req, 1000).unwrap();
        assert_eq!(win.limit, None);
        assert_eq!(win.ids.len(), 2);
        assert_eq!(win.total, 3);
    }

    #[test]
    fn window_past_the_end_is_empty() {
        let mut req = request();
        req.position = Some(10);
        let win = window(ids(3), &req, 1000).unwrap();
        assert!(win.ids.is_empty());
        assert_eq!(win.total, 3);
    }
}
