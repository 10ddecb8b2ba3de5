/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Multi-domain login resolution.
//!
//! A user may log in with their primary email or with the address of any
//! mailbox they own. Resolution tries the primary email first, then the
//! mailbox table. Every failure path (unknown identifier, inactive account,
//! wrong credential) produces the same `Unauthorized`, so a caller cannot
//! learn which resolution path was attempted.

use sha2::{Digest, Sha256};
use store::{OwnedMailbox, SharedMailbox, Store, User};
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// Salted SHA-256 digest of a credential, hex encoded.
pub fn hash_credential(salt: &str, credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(credential.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Resolves a login identifier to its account: primary email first, then
/// any owned mailbox address. Inactive accounts fail identically to unknown
/// identifiers.
pub async fn resolve_login(store: &Store, identifier: &str) -> Result<User> {
    let user = match store.user_by_primary_email(identifier).await? {
        Some(user) => Some(user),
        None => match store.mailbox_by_email(identifier).await? {
            Some(mailbox) => store.user_by_id(mailbox.user_id).await?,
            None => None,
        },
    };

    match user {
        Some(user) if user.active => Ok(user),
        _ => {
            debug!(identifier, "login identifier did not resolve");
            Err(EngineError::Unauthorized)
        }
    }
}

/// Verifies a credential against the resolved account.
pub async fn login(store: &Store, identifier: &str, credential: &str) -> Result<User> {
    let user = resolve_login(store, identifier).await?;
    let presented = hash_credential(&user.password_salt, credential);
    if !constant_time_eq(&presented, &user.password_hash) {
        debug!(identifier, "credential mismatch");
        return Err(EngineError::Unauthorized);
    }
    info!(user_id = user.id, "login succeeded");
    Ok(user)
}

/// Everything the user can see: owned mailboxes plus unexpired shares. This
/// is exactly the set the namespace composer works from.
pub async fn all_mailboxes(
    store: &Store,
    user_id: i64,
) -> Result<(Vec<OwnedMailbox>, Vec<SharedMailbox>)> {
    let owned = store.owned_mailboxes(user_id).await?;
    let shared = store.shared_mailboxes(user_id).await?;
    Ok((owned, shared))
}
