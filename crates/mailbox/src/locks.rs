/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Per-folder write locks.
//!
//! Every folder-mutating operation holds the destination folder's lock for
//! the duration of exactly one transaction, so two concurrent copies into
//! the same folder can never allocate overlapping UIDs. Reads never touch
//! these locks, and operations on different folders proceed fully in
//! parallel; there is no global lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

/// Registry of per-folder locks, keyed by folder id.
///
/// The registry's own map lock is a std `Mutex` held only long enough to
/// clone out the folder's `Arc`; it is never held across an await point.
#[derive(Debug, Default, Clone)]
pub struct FolderLocks {
    locks: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl FolderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the lock for one folder, creating it on first use.
    pub fn for_folder(&self, folder_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| {
            // A panic while holding the map lock cannot corrupt the map
            // itself; carry on with it.
            poisoned.into_inner()
        });
        locks
            .entry(folder_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}
