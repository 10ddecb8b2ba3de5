/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Access-control resolution.
//!
//! Ownership satisfies any permission. A non-owner needs an unexpired grant
//! whose permission set contains the required right or `admin`. Denial and
//! absence are reported identically as `NotFound`; a caller probing for
//! mailboxes it cannot see learns nothing from the answer. That conflation
//! is a deliberate anti-enumeration choice, not an oversight.

use store::{Mailbox, Permission, Store};
use tracing::debug;

use crate::error::{EngineError, Result};

/// Checks whether the user may act on the mailbox with the required
/// permission.
pub async fn check_access(
    store: &Store,
    user_id: i64,
    mailbox: &Mailbox,
    required: Permission,
) -> Result<()> {
    if mailbox.user_id == user_id {
        return Ok(());
    }

    match store.grant_for(user_id, mailbox.id).await? {
        Some(grant) if required.satisfied_by(&grant.permissions) => Ok(()),
        Some(_) => {
            debug!(
                user_id,
                mailbox_id = mailbox.id,
                required = ?required,
                "grant present but insufficient, reporting not found"
            );
            Err(EngineError::NotFound)
        }
        None => Err(EngineError::NotFound),
    }
}

/// Loads a mailbox and verifies access in one step. A missing mailbox and a
/// denied one produce the same error.
pub async fn resolve_mailbox(
    store: &Store,
    user_id: i64,
    mailbox_id: i64,
    required: Permission,
) -> Result<Mailbox> {
    let mailbox = store
        .mailbox_by_id(mailbox_id)
        .await?
        .ok_or(EngineError::NotFound)?;
    check_access(store, user_id, &mailbox, required).await?;
    Ok(mailbox)
}
