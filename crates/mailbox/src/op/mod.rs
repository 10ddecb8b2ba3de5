/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Message operations.
//!
//! Each submodule implements one family of operations on [`crate::Engine`]:
//! folder selection and synchronization resume, UID fetches, flag updates,
//! copy/move with UID allocation, and delivery. Every mutating operation
//! runs under its destination folder's lock inside a single transaction and
//! writes one audit row whether it succeeds or fails.

use serde::{Deserialize, Serialize};

pub mod append;
pub mod copy_move;
pub mod fetch;
pub mod select;
pub mod store_flags;

/// Counters returned by folder selection, exactly what a SELECT/EXAMINE
/// response needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStatus {
    pub folder_id: i64,
    pub uid_validity: u32,
    pub uid_next: u32,
    pub highest_modseq: i64,
    pub message_count: u32,
    pub unseen_count: u32,
}

/// One source-to-destination UID pair from a copy or move; the protocol
/// layer renders these as COPYUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UidMapping {
    pub src_uid: u32,
    pub dest_uid: u32,
}

/// How a flag update combines with the existing set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagMode {
    /// Union with the existing flags.
    Add,
    /// Difference from the existing flags.
    Remove,
    /// Replace the existing flags.
    Set,
}

impl FlagMode {
    /// Applies the mode, returning the new flag set. Set semantics: the
    /// result is deduplicated and order carries no meaning.
    pub fn apply(&self, current: &[String], update: &[String]) -> Vec<String> {
        let mut next: Vec<String> = match self {
            FlagMode::Add => {
                let mut next = current.to_vec();
                next.extend(update.iter().cloned());
                next
            }
            FlagMode::Remove => current
                .iter()
                .filter(|flag| !update.contains(flag))
                .cloned()
                .collect(),
            FlagMode::Set => update.to_vec(),
        };
        next.sort();
        next.dedup();
        next
    }
}
