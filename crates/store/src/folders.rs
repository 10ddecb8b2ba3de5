/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Folder records and their IMAP addressing counters.
//!
//! `message_count` and `unseen_count` are a cache over the message table,
//! not ground truth; [`Store::recompute_counters`] recounts them from the
//! messages themselves and is the drift-correction path after bulk
//! operations.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::model::{Folder, SpecialUse, FLAG_SEEN};
use crate::{Result, Store, StoreError};

impl Store {
    pub(crate) async fn insert_folder_tx(
        conn: &mut SqliteConnection,
        mailbox_id: i64,
        full_path: &str,
        special_use: Option<SpecialUse>,
        uid_validity: u32,
    ) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO folders (mailbox_id, full_path, delimiter, special_use, uid_validity, \
             uid_next, highest_modseq, message_count, unseen_count, attributes) \
             VALUES (?, ?, '/', ?, ?, 1, 0, 0, 0, '{}')",
        )
        .bind(mailbox_id)
        .bind(full_path)
        .bind(special_use.map(|role| role.as_str()))
        .bind(uid_validity)
        .execute(conn)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Creates a plain (non-special-use) folder.
    pub async fn create_folder(&self, mailbox_id: i64, full_path: &str) -> Result<Folder> {
        let uid_validity = Utc::now().timestamp() as u32;
        let mut tx = self.begin().await?;
        let result =
            Self::insert_folder_tx(&mut tx, mailbox_id, full_path, None, uid_validity).await;
        let id = match result {
            Ok(id) => id,
            Err(err) if err.is_unique_violation() => {
                return Err(StoreError::AlreadyExists(full_path.to_string()))
            }
            Err(err) => return Err(err),
        };
        tx.commit().await?;

        self.folder_by_id(id).await?.ok_or(StoreError::NotFound)
    }

    pub async fn folder_by_id(&self, id: i64) -> Result<Option<Folder>> {
        Ok(sqlx::query_as("SELECT * FROM folders WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn folder_by_path(&self, mailbox_id: i64, full_path: &str) -> Result<Option<Folder>> {
        Ok(
            sqlx::query_as("SELECT * FROM folders WHERE mailbox_id = ? AND full_path = ?")
                .bind(mailbox_id)
                .bind(full_path)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn list_folders(&self, mailbox_id: i64) -> Result<Vec<Folder>> {
        Ok(
            sqlx::query_as("SELECT * FROM folders WHERE mailbox_id = ? ORDER BY full_path")
                .bind(mailbox_id)
                .fetch_all(self.pool())
                .await?,
        )
    }

    /// Folder row read inside the caller's transaction; the UID allocation
    /// that follows must see the `uid_next` this returned.
    pub async fn folder_for_update_tx(
        conn: &mut SqliteConnection,
        folder_id: i64,
    ) -> Result<Option<Folder>> {
        Ok(sqlx::query_as("SELECT * FROM folders WHERE id = ?")
            .bind(folder_id)
            .fetch_optional(conn)
            .await?)
    }

    /// Advances the folder's addressing counters inside the caller's
    /// transaction. `uid_next` and `highest_modseq` only ever move forward;
    /// the count deltas may be negative.
    pub async fn bump_folder_tx(
        conn: &mut SqliteConnection,
        folder_id: i64,
        uid_next: u32,
        highest_modseq: i64,
        message_delta: i64,
        unseen_delta: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE folders SET uid_next = MAX(uid_next, ?), \
             highest_modseq = MAX(highest_modseq, ?), \
             message_count = MAX(0, message_count + ?), \
             unseen_count = MAX(0, unseen_count + ?) WHERE id = ?",
        )
        .bind(uid_next)
        .bind(highest_modseq)
        .bind(message_delta)
        .bind(unseen_delta)
        .bind(folder_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Rebuilds a folder: assigns a fresh `uid_validity` (invalidating every
    /// UID a client may have cached) and moves `uid_next` past the highest
    /// surviving UID.
    pub async fn rebuild_folder(&self, folder_id: i64) -> Result<Folder> {
        let mut tx = self.begin().await?;
        let folder = Self::folder_for_update_tx(&mut tx, folder_id)
            .await?
            .ok_or(StoreError::NotFound)?;

        let max_uid: Option<u32> =
            sqlx::query_scalar("SELECT MAX(uid) FROM messages WHERE folder_id = ?")
                .bind(folder_id)
                .fetch_one(&mut *tx)
                .await?;

        // A rebuild within the same second must still change the epoch.
        let uid_validity = (Utc::now().timestamp() as u32).max(folder.uid_validity + 1);
        let uid_next = max_uid.map_or(1, |uid| uid + 1);

        sqlx::query("UPDATE folders SET uid_validity = ?, uid_next = ? WHERE id = ?")
            .bind(uid_validity)
            .bind(uid_next)
            .bind(folder_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        warn!(
            folder_id,
            old = folder.uid_validity,
            new = uid_validity,
            "folder rebuilt, cached client UIDs invalidated"
        );
        self.folder_by_id(folder_id)
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// Recounts `message_count`/`unseen_count` from the message table,
    /// correcting any drift the incremental counters accumulated.
    pub async fn recompute_counters(&self, folder_id: i64) -> Result<Folder> {
        let mut tx = self.begin().await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE folder_id = ?")
            .bind(folder_id)
            .fetch_one(&mut *tx)
            .await?;

        // Flags are a JSON array; the seen check matches the serialized form.
        let seen_pattern = format!("%\"{}\"%", FLAG_SEEN.replace('\\', "\\\\"));
        let seen: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE folder_id = ? AND flags LIKE ?",
        )
        .bind(folder_id)
        .bind(&seen_pattern)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE folders SET message_count = ?, unseen_count = ? WHERE id = ?")
            .bind(total)
            .bind(total - seen)
            .bind(folder_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(folder_id, total, unseen = total - seen, "counters recomputed");
        self.folder_by_id(folder_id)
            .await?
            .ok_or(StoreError::NotFound)
    }
}
