/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Folder selection, synchronization resume and counter repair.

use store::{Folder, Message, Permission};
use tracing::info;

use crate::acl;
use crate::audit;
use crate::error::{EngineError, Result};
use crate::{Engine, Session};

use super::FolderStatus;

impl FolderStatus {
    fn of(folder: &Folder) -> Self {
        Self {
            folder_id: folder.id,
            uid_validity: folder.uid_validity,
            uid_next: folder.uid_next,
            highest_modseq: folder.highest_modseq,
            message_count: folder.message_count,
            unseen_count: folder.unseen_count,
        }
    }
}

impl Engine {
    /// Resolves a folder by path within a mailbox and returns its counters.
    /// Lock-free; selection is a read.
    pub async fn select_folder(
        &self,
        session: &Session,
        mailbox_id: i64,
        path: &str,
    ) -> Result<FolderStatus> {
        acl::resolve_mailbox(&self.store, session.user.id, mailbox_id, Permission::Read).await?;
        let folder = self
            .store
            .folder_by_path(mailbox_id, path)
            .await?
            .ok_or(EngineError::NotFound)?;
        Ok(FolderStatus::of(&folder))
    }

    /// Resumes incremental synchronization. The client presents the
    /// UIDVALIDITY it cached; a mismatch means its UIDs are worthless and it
    /// must resynchronize from scratch, reported as a conflict. Otherwise
    /// returns every message whose modseq lies above the client's floor.
    pub async fn resume_sync(
        &self,
        session: &Session,
        folder_id: i64,
        expected_uid_validity: u32,
        since_modseq: i64,
    ) -> Result<Vec<Message>> {
        let folder = self
            .store
            .folder_by_id(folder_id)
            .await?
            .ok_or(EngineError::NotFound)?;
        acl::resolve_mailbox(
            &self.store,
            session.user.id,
            folder.mailbox_id,
            Permission::Read,
        )
        .await?;

        if folder.uid_validity != expected_uid_validity {
            return Err(EngineError::Conflict {
                expected: expected_uid_validity,
                actual: folder.uid_validity,
            });
        }
        Ok(self
            .store
            .messages_since_modseq(folder_id, since_modseq)
            .await?)
    }

    /// Recounts a folder's cached counters from the message table. Admin
    /// gated; this is the drift-correction path after bulk operations.
    pub async fn recompute_folder(&self, session: &Session, folder_id: i64) -> Result<FolderStatus> {
        let result: Result<(FolderStatus, String)> = async {
            let folder = self
                .store
                .folder_by_id(folder_id)
                .await?
                .ok_or(EngineError::NotFound)?;
            acl::resolve_mailbox(
                &self.store,
                session.user.id,
                folder.mailbox_id,
                Permission::Admin,
            )
            .await?;
            let folder = self.store.recompute_counters(folder_id).await?;
            info!(folder_id, "folder counters recomputed");
            Ok((FolderStatus::of(&folder), folder.full_path))
        }
        .await;

        let path = match &result {
            Ok((_, path)) => path.clone(),
            Err(_) => String::new(),
        };
        audit::record(
            &self.store,
            &session.ctx,
            "recompute",
            &path,
            &[],
            result.is_ok(),
            &format!("folder={folder_id}"),
        )
        .await;
        result.map(|(status, _)| status)
    }
}
