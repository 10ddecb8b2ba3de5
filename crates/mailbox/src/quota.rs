/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Quota accounting.
//!
//! Usage and limit live on the mailbox row; this module is the single place
//! that decides whether a size-increasing write fits. The check runs inside
//! the same transaction as the write it guards, so the usage it reads cannot
//! go stale before commit.

use serde::{Deserialize, Serialize};
use store::Mailbox;

use crate::error::{EngineError, Result};

/// Usage/limit pair reported to the protocol layer (GETQUOTA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub used_bytes: i64,
    /// Zero means unlimited.
    pub quota_bytes: i64,
}

impl QuotaUsage {
    pub fn of(mailbox: &Mailbox) -> Self {
        Self {
            used_bytes: mailbox.used_bytes,
            quota_bytes: mailbox.quota_bytes,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.quota_bytes == 0
    }
}

/// Fails with `QuotaExceeded` if adding `incoming` bytes would overflow the
/// mailbox quota.
pub fn check_quota(mailbox: &Mailbox, incoming: i64) -> Result<()> {
    if mailbox.quota_bytes == 0 {
        return Ok(());
    }
    let available = (mailbox.quota_bytes - mailbox.used_bytes).max(0);
    if incoming > available {
        return Err(EngineError::QuotaExceeded {
            requested: incoming,
            available,
        });
    }
    Ok(())
}
