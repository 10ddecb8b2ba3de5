/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Copy and move.
//!
//! Copy clones the addressed source rows into the destination folder inside
//! one transaction, with strictly increasing UIDs allocated from the
//! destination's `uid_next` while its folder lock is held. A copy is a new
//! object, not continued history, but it still advances the destination's
//! HIGHESTMODSEQ, and the fresh rows are stamped with that advanced value so
//! incremental synchronization sees them.
//!
//! Move is copy followed by a best-effort delete of the originals. A failed
//! delete is logged and swallowed: the copy is already durable, and an
//! orphaned source row is a lesser failure than reporting data loss on a
//! preserved message. Cross-domain movement is the same code path; only the
//! destination mailbox's domain differs, and the same quota check applies.
//!
//! Only the destination folder is locked. The source read and move's delete
//! run unlocked, an accepted narrow race that is idempotent at the row
//! level.

use store::messages::NewMessage;
use store::{Message, Permission, Store};
use tracing::{info, warn};

use crate::acl;
use crate::audit;
use crate::error::{EngineError, Result};
use crate::quota::check_quota;
use crate::{Engine, Session};

use super::UidMapping;

struct CopyOutcome {
    mappings: Vec<UidMapping>,
    dest_path: String,
    copied: Vec<Message>,
    total_size: i64,
}

impl Engine {
    /// Copies the addressed UIDs from one folder into another, returning the
    /// source-to-destination UID map. UIDs absent from the source are
    /// skipped; stale sequence sets are expected, and a partial copy beats
    /// aborting the command.
    pub async fn copy_messages(
        &self,
        session: &Session,
        src_folder_id: i64,
        dest_folder_id: i64,
        uids: &[u32],
    ) -> Result<Vec<UidMapping>> {
        let outcome = self
            .copy_inner(session, src_folder_id, dest_folder_id, uids)
            .await;

        let (path, success, detail) = match &outcome {
            Ok(ok) => (ok.dest_path.clone(), true, String::new()),
            Err(err) => (
                String::new(),
                false,
                format!("src={src_folder_id} dest={dest_folder_id} {}", err.audit_tag()),
            ),
        };
        audit::record(&self.store, &session.ctx, "copy", &path, uids, success, &detail).await;

        outcome.map(|ok| ok.mappings)
    }

    /// Moves the addressed UIDs: copy, then best-effort delete of the
    /// originals with the source counters and usage decremented.
    pub async fn move_messages(
        &self,
        session: &Session,
        src_folder_id: i64,
        dest_folder_id: i64,
        uids: &[u32],
    ) -> Result<Vec<UidMapping>> {
        let outcome = self
            .copy_inner(session, src_folder_id, dest_folder_id, uids)
            .await;

        let (path, success, detail) = match &outcome {
            Ok(ok) => (ok.dest_path.clone(), true, String::new()),
            Err(err) => (
                String::new(),
                false,
                format!("src={src_folder_id} dest={dest_folder_id} {}", err.audit_tag()),
            ),
        };
        audit::record(&self.store, &session.ctx, "move", &path, uids, success, &detail).await;

        let outcome = outcome?;
        if !outcome.copied.is_empty() {
            if let Err(err) = self.delete_originals(src_folder_id, &outcome).await {
                // The copy committed; the client keeps its messages either way.
                warn!(
                    src_folder_id,
                    dest_folder_id,
                    error = %err,
                    "move could not delete source messages, leaving orphaned copies"
                );
            }
        }
        Ok(outcome.mappings)
    }

    async fn copy_inner(
        &self,
        session: &Session,
        src_folder_id: i64,
        dest_folder_id: i64,
        uids: &[u32],
    ) -> Result<CopyOutcome> {
        let src_folder = self
            .store
            .folder_by_id(src_folder_id)
            .await?
            .ok_or(EngineError::NotFound)?;
        acl::resolve_mailbox(
            &self.store,
            session.user.id,
            src_folder.mailbox_id,
            Permission::Read,
        )
        .await?;

        let dest_folder = self
            .store
            .folder_by_id(dest_folder_id)
            .await?
            .ok_or(EngineError::NotFound)?;
        acl::resolve_mailbox(
            &self.store,
            session.user.id,
            dest_folder.mailbox_id,
            Permission::Write,
        )
        .await?;

        // Unlocked source read; the destination lock below is what protects
        // UID allocation.
        let sources = self.store.messages_by_uids(src_folder.id, uids).await?;
        let total_size: i64 = sources.iter().map(|m| m.size_bytes).sum();

        if sources.is_empty() {
            return Ok(CopyOutcome {
                mappings: Vec::new(),
                dest_path: dest_folder.full_path,
                copied: Vec::new(),
                total_size: 0,
            });
        }

        let lock = self.locks.for_folder(dest_folder.id);
        let _guard = lock.lock().await;

        let mut tx = self.store.begin().await?;
        let dest = Store::folder_for_update_tx(&mut tx, dest_folder.id)
            .await?
            .ok_or(EngineError::NotFound)?;
        let dest_mailbox = Store::mailbox_by_id_tx(&mut tx, dest.mailbox_id)
            .await?
            .ok_or(EngineError::NotFound)?;
        check_quota(&dest_mailbox, total_size)?;

        let modseq = dest.highest_modseq + 1;
        let mut next_uid = dest.uid_next;
        let mut mappings = Vec::with_capacity(sources.len());
        let mut unseen = 0i64;
        for message in &sources {
            Store::append_message_tx(&mut tx, dest.id, next_uid, modseq, &NewMessage::from(message))
                .await?;
            mappings.push(UidMapping {
                src_uid: message.uid,
                dest_uid: next_uid,
            });
            if !message.is_seen() {
                unseen += 1;
            }
            next_uid += 1;
        }

        Store::bump_folder_tx(
            &mut tx,
            dest.id,
            next_uid,
            modseq,
            sources.len() as i64,
            unseen,
        )
        .await?;
        Store::add_used_bytes_tx(&mut tx, dest_mailbox.id, total_size).await?;
        Store::commit(tx).await?;

        info!(
            src_folder_id,
            dest_folder_id = dest.id,
            count = mappings.len(),
            first_uid = mappings.first().map(|m| m.dest_uid),
            "messages copied"
        );

        Ok(CopyOutcome {
            mappings,
            dest_path: dest.full_path,
            copied: sources,
            total_size,
        })
    }

    /// Second transaction of a move: drop the originals and settle the
    /// source folder's counters and mailbox usage. Unlocked by design.
    async fn delete_originals(&self, src_folder_id: i64, outcome: &CopyOutcome) -> Result<()> {
        let src_uids: Vec<u32> = outcome.copied.iter().map(|m| m.uid).collect();
        let unseen: i64 = outcome.copied.iter().filter(|m| !m.is_seen()).count() as i64;

        let mut tx = self.store.begin().await?;
        let src = Store::folder_for_update_tx(&mut tx, src_folder_id)
            .await?
            .ok_or(EngineError::NotFound)?;

        let deleted = Store::delete_by_uids_tx(&mut tx, src.id, &src_uids).await? as i64;
        Store::bump_folder_tx(
            &mut tx,
            src.id,
            src.uid_next,
            src.highest_modseq + 1,
            -deleted,
            -unseen.min(deleted),
        )
        .await?;
        Store::add_used_bytes_tx(&mut tx, src.mailbox_id, -outcome.total_size).await?;
        Store::commit(tx).await?;
        Ok(())
    }
}
