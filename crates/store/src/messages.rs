/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Message rows.
//!
//! UID and modseq values are decided by the engine while it holds the folder
//! lock; this module only persists them. Everything that allocates UIDs goes
//! through the `*_tx` functions so the allocation and the counter updates
//! commit or roll back together.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::model::Message;
use crate::{Result, Store};

/// Payload for appending a message row; the persisted row adds the UID and
/// modseq chosen under the folder lock.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub subject: String,
    pub from_addr: String,
    pub body: String,
    pub flags: Vec<String>,
    pub size_bytes: i64,
    pub internal_date: DateTime<Utc>,
}

impl NewMessage {
    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|f| f == crate::FLAG_SEEN)
    }
}

impl From<&Message> for NewMessage {
    fn from(message: &Message) -> Self {
        NewMessage {
            subject: message.subject.clone(),
            from_addr: message.from_addr.clone(),
            body: message.body.clone(),
            flags: message.flags.clone(),
            size_bytes: message.size_bytes,
            internal_date: message.internal_date,
        }
    }
}

impl Store {
    /// Inserts a message row inside the caller's transaction.
    pub async fn append_message_tx(
        conn: &mut SqliteConnection,
        folder_id: i64,
        uid: u32,
        modseq: i64,
        message: &NewMessage,
    ) -> Result<i64> {
        let flags = serde_json::to_string(&message.flags)?;
        let id = sqlx::query(
            "INSERT INTO messages (folder_id, uid, subject, from_addr, body, flags, size_bytes, \
             modseq, internal_date) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(folder_id)
        .bind(uid)
        .bind(&message.subject)
        .bind(&message.from_addr)
        .bind(&message.body)
        .bind(flags)
        .bind(message.size_bytes)
        .bind(modseq)
        .bind(message.internal_date)
        .execute(conn)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn message_by_id(&self, id: i64) -> Result<Option<Message>> {
        Ok(sqlx::query_as("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?)
    }

    pub async fn messages_in_folder(&self, folder_id: i64) -> Result<Vec<Message>> {
        Ok(
            sqlx::query_as("SELECT * FROM messages WHERE folder_id = ? ORDER BY uid")
                .bind(folder_id)
                .fetch_all(self.pool())
                .await?,
        )
    }

    /// Messages matching the given UIDs, in UID order. UIDs with no row are
    /// silently absent from the result; stale sequence sets are expected.
    pub async fn messages_by_uids(&self, folder_id: i64, uids: &[u32]) -> Result<Vec<Message>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM messages WHERE folder_id = ? AND uid IN ({}) ORDER BY uid",
            placeholders(uids.len())
        );
        let mut query = sqlx::query_as(&sql).bind(folder_id);
        for uid in uids {
            query = query.bind(uid);
        }
        Ok(query.fetch_all(self.pool()).await?)
    }

    /// Same as [`Store::messages_by_uids`] but on the caller's transaction.
    pub async fn messages_by_uids_tx(
        conn: &mut SqliteConnection,
        folder_id: i64,
        uids: &[u32],
    ) -> Result<Vec<Message>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM messages WHERE folder_id = ? AND uid IN ({}) ORDER BY uid",
            placeholders(uids.len())
        );
        let mut query = sqlx::query_as(&sql).bind(folder_id);
        for uid in uids {
            query = query.bind(uid);
        }
        Ok(query.fetch_all(conn).await?)
    }

    /// Highest UID currently present in the folder, if any.
    pub async fn max_uid(&self, folder_id: i64) -> Result<Option<u32>> {
        Ok(
            sqlx::query_scalar("SELECT MAX(uid) FROM messages WHERE folder_id = ?")
                .bind(folder_id)
                .fetch_one(self.pool())
                .await?,
        )
    }

    /// Deletes the given UIDs, returning how many rows went away.
    pub async fn delete_by_uids_tx(
        conn: &mut SqliteConnection,
        folder_id: i64,
        uids: &[u32],
    ) -> Result<u64> {
        if uids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM messages WHERE folder_id = ? AND uid IN ({})",
            placeholders(uids.len())
        );
        let mut query = sqlx::query(&sql).bind(folder_id);
        for uid in uids {
            query = query.bind(uid);
        }
        Ok(query.execute(conn).await?.rows_affected())
    }

    /// Replaces a message's flag set and stamps the new modseq.
    pub async fn update_flags_tx(
        conn: &mut SqliteConnection,
        message_id: i64,
        flags: &[String],
        modseq: i64,
    ) -> Result<()> {
        let flags = serde_json::to_string(flags)?;
        sqlx::query("UPDATE messages SET flags = ?, modseq = ? WHERE id = ?")
            .bind(flags)
            .bind(modseq)
            .bind(message_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Messages whose modseq lies strictly above the given floor, oldest
    /// change first. Feeds incremental synchronization.
    pub async fn messages_since_modseq(
        &self,
        folder_id: i64,
        since_modseq: i64,
    ) -> Result<Vec<Message>> {
        Ok(sqlx::query_as(
            "SELECT * FROM messages WHERE folder_id = ? AND modseq > ? ORDER BY modseq, uid",
        )
        .bind(folder_id)
        .bind(since_modseq)
        .fetch_all(self.pool())
        .await?)
    }
}

fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count * 2);
    for i in 0..count {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}
