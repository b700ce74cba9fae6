/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use jmap_proto::error::method::MethodError;
use jmap_proto::method::query::{QueryRequest, QueryResponse};
use jmap_proto::types::state::State;
use serde_json::Value;
use store::{EntityType, SqlValue};

use crate::query::{compile_sql_filter, compile_sql_sort, window};
use crate::{store_fail, JMAP};

impl JMAP {
    pub async fn mailbox_query(
        &self,
        request: Result<QueryRequest, MethodError>,
    ) -> Result<QueryResponse, MethodError> {
        let request = request?;
        let account = self.account(&request.account_id)?;
        self.sync_mailboxes(&account).await?;

        let (where_sql, where_params) = compile_sql_filter(request.filter.as_ref(), &leaf)?;
        let order_sql = compile_sql_sort(
            request.sort.as_deref(),
            &|property| match property {
                "name" => Some("json_extract(properties, '$.name') COLLATE NOCASE".to_string()),
                "sortOrder" => {
                    Some("CAST(json_extract(properties, '$.sortOrder') AS INTEGER)".to_string())
                }
                _ => None,
            },
            "created",
        )?;

        let ids = self
            .store
            .query_entities(
                &account.id,
                EntityType::Mailbox,
                where_sql,
                where_params,
                order_sql,
            )
            .await
            .map_err(store_fail)?;
        let state = self
            .store
            .current_state(&account.id, EntityType::Mailbox)
            .await
            .map_err(store_fail)?;

        let win = window(ids, &request, self.config.query_max_results)?;
        Ok(QueryResponse {
            account_id: request.account_id,
            query_state: State::Scalar(state),
            can_calculate_changes: false,
            position: win.position,
            total: request
                .calculate_total
                .unwrap_or(false)
                .then_some(win.total),
            ids: win.ids,
            limit: win.limit,
        })
    }
}

fn leaf(field: &str, value: &Value) -> Result<(String, Vec<SqlValue>), MethodError> {
    let unsupported =
        || MethodError::UnsupportedFilter(format!("Unsupported mailbox filter {field:?}."));
    Ok(match (field, value) {
        ("parentId", Value::Null) => (
            "json_extract(properties, '$.parentId') IS NULL".to_string(),
            Vec::new(),
        ),
        ("parentId", Value::String(id)) => (
            "json_extract(properties, '$.parentId') = ?".to_string(),
            vec![SqlValue::Text(id.clone())],
        ),
        ("name", Value::String(name)) => (
            "json_extract(properties, '$.name') LIKE '%' || ? || '%'".to_string(),
            vec![SqlValue::Text(name.clone())],
        ),
        ("role", Value::Null) => (
            "json_extract(properties, '$.role') IS NULL".to_string(),
            Vec::new(),
        ),
        ("role", Value::String(role)) => (
            "json_extract(properties, '$.role') = ?".to_string(),
            vec![SqlValue::Text(role.clone())],
        ),
        ("hasAnyRole", Value::Bool(true)) => (
            "json_extract(properties, '$.role') IS NOT NULL".to_string(),
            Vec::new(),
        ),
        ("hasAnyRole", Value::Bool(false)) => (
            "json_extract(properties, '$.role') IS NULL".to_string(),
            Vec::new(),
        ),
        _ => return Err(unsupported()),
    })
}
