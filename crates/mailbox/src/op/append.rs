/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Delivery into a folder.
//!
//! The acceptance path lands new messages here after the domain cache has
//! vouched for the destination domain. Same discipline as every other
//! usage-increasing write: folder lock, one transaction, quota checked
//! against the row the transaction sees, full rollback on overflow.

use store::messages::NewMessage;
use store::{SpecialUse, Store};
use tracing::info;

use crate::audit;
use crate::error::{EngineError, Result};
use crate::quota::check_quota;
use crate::Engine;
use crate::SessionContext;

impl Engine {
    /// Delivers a message to a mailbox's INBOX, addressed by mailbox email.
    /// Returns the folder id and allocated UID.
    pub async fn deliver(&self, mailbox_email: &str, message: NewMessage) -> Result<(i64, u32)> {
        let mailbox = self
            .store
            .mailbox_by_email(mailbox_email)
            .await?
            .ok_or(EngineError::NotFound)?;

        let outcome = self.deliver_inner(&mailbox, &message).await;

        // Delivery acts on the owner's behalf; the "client" is the
        // acceptance path itself. Failures get a row too, with the error
        // tag in the detail.
        let ctx = SessionContext::new(mailbox.user_id, "acceptance");
        let (path, uids, success, detail) = match &outcome {
            Ok((path, _, uid)) => (path.clone(), vec![*uid], true, String::new()),
            Err(err) => (String::new(), Vec::new(), false, err.audit_tag().to_string()),
        };
        audit::record(&self.store, &ctx, "deliver", &path, &uids, success, &detail).await;

        outcome.map(|(_, folder_id, uid)| (folder_id, uid))
    }

    async fn deliver_inner(
        &self,
        mailbox: &store::Mailbox,
        message: &NewMessage,
    ) -> Result<(String, i64, u32)> {
        let inbox = self
            .store
            .folder_by_path(mailbox.id, SpecialUse::Inbox.default_path())
            .await?
            .ok_or(EngineError::NotFound)?;

        let lock = self.locks.for_folder(inbox.id);
        let _guard = lock.lock().await;

        let mut tx = self.store.begin().await?;
        let folder = Store::folder_for_update_tx(&mut tx, inbox.id)
            .await?
            .ok_or(EngineError::NotFound)?;
        let mailbox_now = Store::mailbox_by_id_tx(&mut tx, mailbox.id)
            .await?
            .ok_or(EngineError::NotFound)?;
        check_quota(&mailbox_now, message.size_bytes)?;

        let uid = folder.uid_next;
        let modseq = folder.highest_modseq + 1;
        Store::append_message_tx(&mut tx, folder.id, uid, modseq, message).await?;
        Store::bump_folder_tx(
            &mut tx,
            folder.id,
            uid + 1,
            modseq,
            1,
            if message.is_seen() { 0 } else { 1 },
        )
        .await?;
        Store::add_used_bytes_tx(&mut tx, mailbox.id, message.size_bytes).await?;
        Store::commit(tx).await?;

        info!(mailbox_email = %mailbox.email, uid, "message delivered");
        Ok((folder.full_path, folder.id, uid))
    }
}
