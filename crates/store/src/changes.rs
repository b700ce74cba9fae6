/*
 * SPDX-FileCopyrightText: 2020 A3Mailer Team Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use rusqlite::params;

use crate::{EntityRow, EntityType, Result, SqlStore};

impl SqlStore {
    /// Rows touched after `since`, tombstones included, ordered by
    /// their last-touched stamp ascending. Callers pass their page
    /// size plus one; the lookahead row tells them whether more
    /// changes remain and where the page boundary may safely sit.
    pub async fn changes_window(
        &self,
        account: &str,
        typ: EntityType,
        since: u64,
        limit: usize,
    ) -> Result<Vec<EntityRow>> {
        let account = account.to_string();
        self.spawn_worker(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, properties, created, updated, updated_non_counts, destroyed
                 FROM e
                 WHERE account = ?1 AND type = ?2
                   AND COALESCE(destroyed, updated, created) > ?3
                 ORDER BY COALESCE(destroyed, updated, created) ASC
                 LIMIT ?4",
            )?;
            let rows = stmt
                .query_map(
                    params![account, typ.as_str(), since, limit as u64],
                    crate::row_to_entity,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}
