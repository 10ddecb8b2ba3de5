/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Mailbox records, ownership listings and quota bookkeeping.
//!
//! Provisioning a mailbox creates its six special-use folders in the same
//! transaction, so a mailbox is never observable in a half-provisioned state.

use sqlx::SqliteConnection;
use tracing::info;

use crate::model::{Mailbox, OwnedMailbox, SharedMailbox, SpecialUse};
use crate::{now, Result, Store, StoreError};

impl Store {
    /// Creates a mailbox and its special-use folder set atomically.
    ///
    /// `quota_bytes` of zero means unlimited.
    pub async fn create_mailbox(
        &self,
        user_id: i64,
        domain_id: i64,
        email: &str,
        display_name: &str,
        quota_bytes: i64,
    ) -> Result<Mailbox> {
        let created_at = now();
        let mut tx = self.begin().await?;

        let result = sqlx::query(
            "INSERT INTO mailboxes (user_id, domain_id, email, display_name, quota_bytes, \
             used_bytes, created_at) VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(user_id)
        .bind(domain_id)
        .bind(email)
        .bind(display_name)
        .bind(quota_bytes)
        .bind(created_at)
        .execute(&mut *tx)
        .await;

        let mailbox_id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(err) => {
                let err = StoreError::from(err);
                if err.is_unique_violation() {
                    return Err(StoreError::AlreadyExists(email.to_string()));
                }
                return Err(err);
            }
        };

        let uid_validity = created_at.timestamp() as u32;
        for role in SpecialUse::ALL {
            Self::insert_folder_tx(
                &mut tx,
                mailbox_id,
                role.default_path(),
                Some(role),
                uid_validity,
            )
            .await?;
        }

        tx.commit().await?;
        info!(email, mailbox_id, "mailbox provisioned");

        Ok(Mailbox {
            id: mailbox_id,
            user_id,
            domain_id,
            email: email.to_string(),
            display_name: display_name.to_string(),
            quota_bytes,
            used_bytes: 0,
            created_at,
        })
    }

    pub async fn mailbox_by_id(&self, id: i64) -> Result<Option<Mailbox>> {
        Ok(sqlx::query_as("SELECT * FROM mailboxes WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn mailbox_by_email(&self, email: &str) -> Result<Option<Mailbox>> {
        Ok(sqlx::query_as("SELECT * FROM mailboxes WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool())
            .await?)
    }

    /// All mailboxes the user owns, joined with their domain names.
    pub async fn owned_mailboxes(&self, user_id: i64) -> Result<Vec<OwnedMailbox>> {
        Ok(sqlx::query_as(
            "SELECT m.*, d.name AS domain_name FROM mailboxes m \
             JOIN domains d ON d.id = m.domain_id \
             WHERE m.user_id = ? ORDER BY d.name, m.email",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?)
    }

    /// All mailboxes visible to the user through an unexpired grant, joined
    /// with the grant and the owner's primary email. Expired grants are
    /// filtered in the query itself; they do not exist as far as callers are
    /// concerned.
    pub async fn shared_mailboxes(&self, user_id: i64) -> Result<Vec<SharedMailbox>> {
        Ok(sqlx::query_as(
            "SELECT m.*, u.primary_email AS owner_email, s.permissions, s.expires_at \
             FROM shared_mailbox_access s \
             JOIN mailboxes m ON m.id = s.mailbox_id \
             JOIN users u ON u.id = m.user_id \
             WHERE s.user_id = ? AND (s.expires_at IS NULL OR s.expires_at > ?) \
             ORDER BY u.primary_email, m.email",
        )
        .bind(user_id)
        .bind(now())
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn set_quota(&self, mailbox_id: i64, quota_bytes: i64) -> Result<()> {
        sqlx::query("UPDATE mailboxes SET quota_bytes = ? WHERE id = ?")
            .bind(quota_bytes)
            .bind(mailbox_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Adjusts `used_bytes` inside a caller-owned transaction. Clamped at
    /// zero so a drifted decrement cannot push usage negative.
    pub async fn add_used_bytes_tx(
        conn: &mut SqliteConnection,
        mailbox_id: i64,
        delta: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE mailboxes SET used_bytes = MAX(0, used_bytes + ?) WHERE id = ?")
            .bind(delta)
            .bind(mailbox_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Mailbox row read inside a transaction, so a quota check and the write
    /// it guards see the same `used_bytes`.
    pub async fn mailbox_by_id_tx(
        conn: &mut SqliteConnection,
        mailbox_id: i64,
    ) -> Result<Option<Mailbox>> {
        Ok(sqlx::query_as("SELECT * FROM mailboxes WHERE id = ?")
            .bind(mailbox_id)
            .fetch_optional(conn)
            .await?)
    }
}
