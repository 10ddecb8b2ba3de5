/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Error types for the persistence layer.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON column failed to serialize
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record does not exist
    #[error("record not found")]
    NotFound,

    /// Unique constraint would be violated
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Schema migration failure
    #[error("migration error: {0}")]
    Migration(String),
}

impl StoreError {
    /// Whether this error is a uniqueness violation reported by SQLite.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::AlreadyExists(_) => true,
            StoreError::Database(sqlx::Error::Database(err)) => {
                err.message().contains("UNIQUE constraint failed")
            }
            _ => false,
        }
    }
}
