/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Flag updates (STORE).
//!
//! Flags form a set; order carries no meaning and re-applying an identical
//! mutation leaves the visible set unchanged. The folder's modseq still
//! advances on every update, which is what CONDSTORE clients key on.

use store::{Permission, Store};
use tracing::debug;

use crate::acl;
use crate::audit;
use crate::error::{EngineError, Result};
use crate::{Engine, Session};

use super::FlagMode;

impl Engine {
    /// Applies a flag mutation to one message and stamps the folder's next
    /// modseq. Returns the modseq stamped on the row.
    pub async fn update_flags(
        &self,
        session: &Session,
        message_id: i64,
        flags: &[String],
        mode: FlagMode,
    ) -> Result<i64> {
        let outcome = self
            .update_flags_inner(session, message_id, flags, mode)
            .await;

        let (path, uid, success) = match &outcome {
            Ok((path, uid, _)) => (path.clone(), *uid, true),
            Err(_) => (String::new(), 0, false),
        };
        let detail = match &outcome {
            Ok(_) => format!("mode={mode:?}"),
            Err(err) => format!("message={message_id} {}", err.audit_tag()),
        };
        audit::record(
            &self.store,
            &session.ctx,
            "store-flags",
            &path,
            &[uid],
            success,
            &detail,
        )
        .await;

        outcome.map(|(_, _, modseq)| modseq)
    }

    async fn update_flags_inner(
        &self,
        session: &Session,
        message_id: i64,
        flags: &[String],
        mode: FlagMode,
    ) -> Result<(String, u32, i64)> {
        let message = self
            .store
            .message_by_id(message_id)
            .await?
            .ok_or(EngineError::NotFound)?;
        let folder = self
            .store
            .folder_by_id(message.folder_id)
            .await?
            .ok_or(EngineError::NotFound)?;
        acl::resolve_mailbox(
            &self.store,
            session.user.id,
            folder.mailbox_id,
            Permission::Write,
        )
        .await?;

        let lock = self.locks.for_folder(folder.id);
        let _guard = lock.lock().await;

        let mut tx = self.store.begin().await?;
        let folder_now = Store::folder_for_update_tx(&mut tx, folder.id)
            .await?
            .ok_or(EngineError::NotFound)?;
        // Re-read under the lock; a concurrent update may have landed since.
        let current = Store::messages_by_uids_tx(&mut tx, folder.id, &[message.uid])
            .await?
            .into_iter()
            .next()
            .ok_or(EngineError::NotFound)?;

        let was_seen = current.is_seen();
        let next_flags = mode.apply(&current.flags, flags);
        let now_seen = next_flags.iter().any(|f| f == store::FLAG_SEEN);
        let unseen_delta = match (was_seen, now_seen) {
            (false, true) => -1,
            (true, false) => 1,
            _ => 0,
        };

        let modseq = folder_now.highest_modseq + 1;
        Store::update_flags_tx(&mut tx, current.id, &next_flags, modseq).await?;
        Store::bump_folder_tx(&mut tx, folder.id, folder_now.uid_next, modseq, 0, unseen_delta)
            .await?;
        Store::commit(tx).await?;

        debug!(
            message_id,
            folder_id = folder.id,
            modseq,
            "flags updated"
        );
        Ok((folder.full_path, message.uid, modseq))
    }
}
