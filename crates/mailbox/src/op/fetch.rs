/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! UID-addressed fetches.
//!
//! Fetches are reads: no folder lock, no audit row, no modseq movement. The
//! sequence-set ceiling is the highest UID currently in the folder, so
//! `"1:*"` addresses everything and `"*"` the newest message.

use store::{Message, Permission};

use crate::acl;
use crate::error::{EngineError, Result};
use crate::sequence::parse_sequence_set;
use crate::{Engine, Session};

impl Engine {
    /// Expands the set expression against the folder's highest UID and
    /// returns the matching messages in UID order. Stale UIDs simply do not
    /// match; a partial result is the expected behavior.
    pub async fn fetch(
        &self,
        session: &Session,
        folder_id: i64,
        set_expr: &str,
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

        let ceiling = match self.store.max_uid(folder_id).await? {
            Some(uid) => uid,
            None => return Ok(Vec::new()),
        };
        let uids = parse_sequence_set(set_expr, ceiling);
        Ok(self.store.messages_by_uids(folder_id, &uids).await?)
    }
}
