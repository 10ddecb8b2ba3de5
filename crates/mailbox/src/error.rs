/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Error taxonomy exposed to the protocol layer.
//!
//! `NotFound` deliberately covers both "does not exist" and "exists but the
//! caller may not see it". Reporting those differently would confirm the
//! existence of mailboxes a caller cannot access; the protocol layer maps
//! both to the same tagged NO response.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the mailbox engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Unknown mailbox/folder/message, or access denied. The two are
    /// intentionally indistinguishable.
    #[error("not found")]
    NotFound,

    /// Login failure. Never says whether the identifier or the credential
    /// was wrong, nor which resolution path was tried.
    #[error("authentication failed")]
    Unauthorized,

    /// A write would push usage past the mailbox quota. The operation was
    /// rolled back in full.
    #[error("quota exceeded: {requested} bytes requested, {available} available")]
    QuotaExceeded { requested: i64, available: i64 },

    /// UIDVALIDITY presented by a resuming client no longer matches the
    /// folder; its cached UIDs are worthless.
    #[error("uidvalidity conflict: expected {expected}, folder has {actual}")]
    Conflict { expected: u32, actual: u32 },

    /// Storage failure. Details are logged, not surfaced.
    #[error("internal error")]
    Internal(#[from] store::StoreError),
}

impl EngineError {
    /// Whether this is an expected outcome the protocol layer maps to a
    /// tagged error response, as opposed to a server-side failure.
    pub fn is_expected(&self) -> bool {
        !matches!(self, EngineError::Internal(_))
    }

    /// Short action outcome tag recorded in the audit log.
    pub fn audit_tag(&self) -> &'static str {
        match self {
            EngineError::NotFound => "not-found",
            EngineError::Unauthorized => "unauthorized",
            EngineError::QuotaExceeded { .. } => "quota-exceeded",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Internal(_) => "internal",
        }
    }
}
