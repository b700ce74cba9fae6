/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! SQLite-backed scalar-state store for server-owned entities: the
//! mailbox cache, identities, email submissions and the vacation
//! response. Every row carries created/updated/destroyed modseq
//! stamps; destroys are tombstones so change enumeration can still
//! report them.

pub mod changes;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Mailbox,
    Identity,
    EmailSubmission,
    VacationResponse,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Mailbox => "mailbox",
            EntityType::Identity => "identity",
            EntityType::EmailSubmission => "submission",
            EntityType::VacationResponse => "vacation",
        }
    }
}

/// One stored entity with its stamp columns. `updated_non_counts` is
/// only maintained for mailboxes, where it separates structural
/// changes from counter-only changes.
#[derive(Debug, Clone)]
pub struct EntityRow {
    pub id: String,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub created: u64,
    pub updated: Option<u64>,
    pub updated_non_counts: Option<u64>,
    pub destroyed: Option<u64>,
}

impl EntityRow {
    /// The state at which this row was last touched. Write order
    /// guarantees destroyed > updated > created when set.
    pub fn last_touched(&self) -> u64 {
        self.destroyed
            .or(self.updated)
            .unwrap_or(self.created)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.is_some()
    }
}

/// Bound parameter values produced by the query compiler. Keeping
/// this enum here lets callers build WHERE fragments without a
/// rusqlite dependency of their own.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
}

impl rusqlite::types::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        match self {
            SqlValue::Text(value) => value.to_sql(),
            SqlValue::Integer(value) => value.to_sql(),
        }
    }
}

#[derive(Clone)]
pub struct SqlStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS s (
                account TEXT NOT NULL,
                type TEXT NOT NULL,
                modseq INTEGER NOT NULL,
                PRIMARY KEY (account, type)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS e (
                account TEXT NOT NULL,
                type TEXT NOT NULL,
                id TEXT NOT NULL,
                properties TEXT NOT NULL,
                created INTEGER NOT NULL,
                updated INTEGER,
                updated_non_counts INTEGER,
                destroyed INTEGER,
                PRIMARY KEY (account, type, id)
            )",
            [],
        )?;
        Ok(SqlStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Offloads a blocking closure holding the connection lock onto
    /// the blocking thread pool.
    pub async fn spawn_worker<U, V>(&self, f: U) -> Result<V>
    where
        U: FnOnce(&Connection) -> Result<V> + Send + 'static,
        V: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|err| Error::Internal(format!("Worker thread failed: {err}")))?
    }

    /// The current scalar state for (account, type): the value of the
    /// per-type counter, which every mutation advances.
    pub async fn current_state(&self, account: &str, typ: EntityType) -> Result<u64> {
        let account = account.to_string();
        self.spawn_worker(move |conn| {
            conn.query_row(
                "SELECT modseq FROM s WHERE account = ?1 AND type = ?2",
                params![account, typ.as_str()],
                |row| row.get::<_, u64>(0),
            )
            .optional()
            .map(|modseq| modseq.unwrap_or(0))
            .map_err(Into::into)
        })
        .await
    }

    /// The low-water mark below which change history is unknown: the
    /// smallest recorded creation stamp, or zero when nothing was
    /// ever written.
    pub async fn low_state(&self, account: &str, typ: EntityType) -> Result<u64> {
        let account = account.to_string();
        self.spawn_worker(move |conn| {
            conn.query_row(
                "SELECT MIN(created) FROM e WHERE account = ?1 AND type = ?2",
                params![account, typ.as_str()],
                |row| row.get::<_, Option<u64>>(0),
            )
            .map(|created| created.unwrap_or(0))
            .map_err(Into::into)
        })
        .await
    }

    /// Advances and returns the scalar state. Called once per set
    /// call; every item mutated by that call shares the new value.
    pub async fn advance(&self, account: &str, typ: EntityType) -> Result<u64> {
        let account = account.to_string();
        self.spawn_worker(move |conn| {
            conn.execute(
                "INSERT INTO s (account, type, modseq) VALUES (?1, ?2, 1)
                 ON CONFLICT (account, type) DO UPDATE SET modseq = modseq + 1",
                params![account, typ.as_str()],
            )?;
            conn.query_row(
                "SELECT modseq FROM s WHERE account = ?1 AND type = ?2",
                params![account, typ.as_str()],
                |row| row.get(0),
            )
            .map_err(Into::into)
        })
        .await
    }

    pub async fn get_entity(
        &self,
        account: &str,
        typ: EntityType,
        id: &str,
    ) -> Result<Option<EntityRow>> {
        let account = account.to_string();
        let id = id.to_string();
        self.spawn_worker(move |conn| {
            conn.query_row(
                "SELECT id, properties, created, updated, updated_non_counts, destroyed
                 FROM e WHERE account = ?1 AND type = ?2 AND id = ?3",
                params![account, typ.as_str(), id],
                row_to_entity,
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    /// All live (non-tombstoned) rows for a type.
    pub async fn get_entities(&self, account: &str, typ: EntityType) -> Result<Vec<EntityRow>> {
        let account = account.to_string();
        self.spawn_worker(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, properties, created, updated, updated_non_counts, destroyed
                 FROM e WHERE account = ?1 AND type = ?2 AND destroyed IS NULL
                 ORDER BY created",
            )?;
            let rows = stmt
                .query_map(params![account, typ.as_str()], row_to_entity)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn insert_entity(
        &self,
        account: &str,
        typ: EntityType,
        id: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
        state: u64,
    ) -> Result<()> {
        let account = account.to_string();
        let id = id.to_string();
        let properties = serde_json::Value::Object(properties.clone()).to_string();
        self.spawn_worker(move |conn| {
            conn.execute(
                "INSERT INTO e (account, type, id, properties, created) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![account, typ.as_str(), id, properties, state],
            )?;
            Ok(())
        })
        .await
    }

    /// Rewrites a live row's properties and stamps it. Counter-only
    /// mailbox updates pass `counts_only` so Mailbox/changes can later
    /// report changedProperties instead of a full update. Returns
    /// false when the row vanished (or was tombstoned) in between.
    pub async fn update_entity(
        &self,
        account: &str,
        typ: EntityType,
        id: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
        state: u64,
        counts_only: bool,
    ) -> Result<bool> {
        let account = account.to_string();
        let id = id.to_string();
        let properties = serde_json::Value::Object(properties.clone()).to_string();
        self.spawn_worker(move |conn| {
            let touched = if counts_only {
                conn.execute(
                    "UPDATE e SET properties = ?4, updated = ?5
                     WHERE account = ?1 AND type = ?2 AND id = ?3 AND destroyed IS NULL",
                    params![account, typ.as_str(), id, properties, state],
                )?
            } else {
                conn.execute(
                    "UPDATE e SET properties = ?4, updated = ?5, updated_non_counts = ?5
                     WHERE account = ?1 AND type = ?2 AND id = ?3 AND destroyed IS NULL",
                    params![account, typ.as_str(), id, properties, state],
                )?
            };
            Ok(touched > 0)
        })
        .await
    }

    /// Rewrites a live row's properties without stamping it. Used for
    /// cache-internal bookkeeping that must stay invisible to change
    /// enumeration, such as tracking backend renames of child rows.
    pub async fn rewrite_entity(
        &self,
        account: &str,
        typ: EntityType,
        id: &str,
        properties: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool> {
        let account = account.to_string();
        let id = id.to_string();
        let properties = serde_json::Value::Object(properties.clone()).to_string();
        self.spawn_worker(move |conn| {
            let touched = conn.execute(
                "UPDATE e SET properties = ?4
                 WHERE account = ?1 AND type = ?2 AND id = ?3 AND destroyed IS NULL",
                params![account, typ.as_str(), id, properties],
            )?;
            Ok(touched > 0)
        })
        .await
    }

    /// Tombstones a live row. Returns false when there was nothing
    /// live to destroy.
    pub async fn destroy_entity(
        &self,
        account: &str,
        typ: EntityType,
        id: &str,
        state: u64,
    ) -> Result<bool> {
        let account = account.to_string();
        let id = id.to_string();
        self.spawn_worker(move |conn| {
            let touched = conn.execute(
                "UPDATE e SET destroyed = ?4, updated = COALESCE(updated, created),
                        updated_non_counts = COALESCE(updated_non_counts, created)
                 WHERE account = ?1 AND type = ?2 AND id = ?3 AND destroyed IS NULL",
                params![account, typ.as_str(), id, state],
            )?;
            Ok(touched > 0)
        })
        .await
    }

    /// Runs a compiled filter over the live rows of a type, returning
    /// matching ids in the requested order. `where_sql` and
    /// `order_sql` are produced by the query compiler from a JMAP
    /// filter/sort; values are always bound, never interpolated.
    pub async fn query_entities(
        &self,
        account: &str,
        typ: EntityType,
        where_sql: String,
        where_params: Vec<SqlValue>,
        order_sql: String,
    ) -> Result<Vec<String>> {
        let account = account.to_string();
        self.spawn_worker(move |conn| {
            let mut sql = String::with_capacity(128);
            sql.push_str(
                "SELECT id FROM e WHERE account = ?1 AND type = ?2 AND destroyed IS NULL",
            );
            if !where_sql.is_empty() {
                sql.push_str(" AND (");
                sql.push_str(&where_sql);
                sql.push(')');
            }
            if !order_sql.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&order_sql);
            } else {
                sql.push_str(" ORDER BY created");
            }

            let mut stmt = conn.prepare(&sql)?;
            let mut bound: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::with_capacity(
                where_params.len() + 2,
            );
            bound.push(Box::new(account));
            bound.push(Box::new(typ.as_str()));
            for param in where_params {
                bound.push(Box::new(param));
            }
            let ids = stmt
                .query_map(
                    rusqlite::params_from_iter(bound.iter().map(|p| p.as_ref())),
                    |row| row.get::<_, String>(0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }
}

pub(crate) fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityRow> {
    let properties: String = row.get(1)?;
    Ok(EntityRow {
        id: row.get(0)?,
        properties: serde_json::from_str::<serde_json::Value>(&properties)
            .ok()
            .and_then(|value| match value {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default(),
        created: row.get(2)?,
        updated: row.get(3)?,
        updated_non_counts: row.get(4)?,
        destroyed: row.get(5)?,
    })
}
