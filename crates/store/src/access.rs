/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Shared-mailbox grants.
//!
//! Every read here filters on expiry: a grant whose `expires_at` has passed
//! is indistinguishable from one that was never created.

use chrono::{DateTime, Utc};

use crate::model::{Permission, SharedAccess};
use crate::{now, Result, Store};

impl Store {
    /// Grants (or replaces) a user's access to a mailbox they do not own.
    pub async fn grant_access(
        &self,
        mailbox_id: i64,
        user_id: i64,
        permissions: &[Permission],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SharedAccess> {
        let created_at = now();
        let permissions_json = serde_json::to_string(permissions)?;
        // RETURNING, not last_insert_rowid(): on the conflict path the
        // rowid would describe some earlier insert, not the updated row.
        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO shared_mailbox_access (mailbox_id, user_id, permissions, expires_at, \
             created_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(mailbox_id, user_id) DO UPDATE SET \
             permissions = excluded.permissions, expires_at = excluded.expires_at \
             RETURNING id, created_at",
        )
        .bind(mailbox_id)
        .bind(user_id)
        .bind(&permissions_json)
        .bind(expires_at)
        .bind(created_at)
        .fetch_one(self.pool())
        .await?;

        Ok(SharedAccess {
            id,
            mailbox_id,
            user_id,
            permissions: permissions.to_vec(),
            expires_at,
            created_at,
        })
    }

    pub async fn revoke_access(&self, mailbox_id: i64, user_id: i64) -> Result<bool> {
        let affected =
            sqlx::query("DELETE FROM shared_mailbox_access WHERE mailbox_id = ? AND user_id = ?")
                .bind(mailbox_id)
                .bind(user_id)
                .execute(self.pool())
                .await?
                .rows_affected();
        Ok(affected > 0)
    }

    /// The unexpired grant the user holds on the mailbox, if any.
    pub async fn grant_for(&self, user_id: i64, mailbox_id: i64) -> Result<Option<SharedAccess>> {
        Ok(sqlx::query_as(
            "SELECT * FROM shared_mailbox_access \
             WHERE user_id = ? AND mailbox_id = ? \
             AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(user_id)
        .bind(mailbox_id)
        .bind(now())
        .fetch_optional(self.pool())
        .await?)
    }

    /// Drops expired grant rows. Callers never observe expired grants either
    /// way; this only reclaims the storage.
    pub async fn prune_expired_grants(&self) -> Result<u64> {
        Ok(
            sqlx::query("DELETE FROM shared_mailbox_access WHERE expires_at <= ?")
                .bind(now())
                .execute(self.pool())
                .await?
                .rows_affected(),
        )
    }
}
