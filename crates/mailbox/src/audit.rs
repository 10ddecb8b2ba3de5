/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Audit glue.
//!
//! Every mutating engine call produces one audit row — actor, action, folder
//! path, affected UIDs, client address, timestamp, success flag — persisted
//! whether the call succeeded or not. An audit insert failure is logged and
//! never fails the operation it describes; compliance tooling prefers a gap
//! it can alert on over an operation that fails because its own paper trail
//! did.

use store::Store;
use tracing::error;

/// Per-connection context threaded through mutating operations.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: i64,
    pub remote_addr: String,
}

impl SessionContext {
    pub fn new(user_id: i64, remote_addr: impl Into<String>) -> Self {
        Self {
            user_id,
            remote_addr: remote_addr.into(),
        }
    }
}

/// Records one audit row, swallowing storage failures.
pub(crate) async fn record(
    store: &Store,
    ctx: &SessionContext,
    action: &str,
    folder_path: &str,
    uids: &[u32],
    success: bool,
    detail: &str,
) {
    if let Err(err) = store
        .append_audit(
            ctx.user_id,
            action,
            folder_path,
            uids,
            &ctx.remote_addr,
            success,
            detail,
        )
        .await
    {
        error!(
            action,
            user_id = ctx.user_id,
            error = %err,
            "audit entry could not be persisted"
        );
    }
}
