/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Insert-only audit log consumed by external compliance tooling.

use uuid::Uuid;

use crate::model::AuditEntry;
use crate::{now, Result, Store};

impl Store {
    /// Appends an audit entry. The id and timestamp are assigned here.
    #[allow(clippy::too_many_arguments)]
    pub async fn append_audit(
        &self,
        actor_user_id: i64,
        action: &str,
        folder_path: &str,
        uids: &[u32],
        remote_addr: &str,
        success: bool,
        detail: &str,
    ) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            actor_user_id,
            action: action.to_string(),
            folder_path: folder_path.to_string(),
            uids: uids.to_vec(),
            remote_addr: remote_addr.to_string(),
            success,
            detail: detail.to_string(),
            created_at: now(),
        };

        let uids_json = serde_json::to_string(&entry.uids)?;
        sqlx::query(
            "INSERT INTO audit_log (id, actor_user_id, action, folder_path, uids, remote_addr, \
             success, detail, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(entry.actor_user_id)
        .bind(&entry.action)
        .bind(&entry.folder_path)
        .bind(uids_json)
        .bind(&entry.remote_addr)
        .bind(entry.success)
        .bind(&entry.detail)
        .bind(entry.created_at)
        .execute(self.pool())
        .await?;

        Ok(entry)
    }

    /// Newest-first audit entries for one actor.
    pub async fn audit_entries_for(&self, actor_user_id: i64, limit: i64) -> Result<Vec<AuditEntry>> {
        Ok(sqlx::query_as(
            "SELECT * FROM audit_log WHERE actor_user_id = ? ORDER BY created_at DESC, id LIMIT ?",
        )
        .bind(actor_user_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?)
    }
}
