/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Data model for the multi-domain mailbox store.
//!
//! Every record type here maps one-to-one onto a table in `schema.sql`.
//! Set-valued columns (message flags, grant permissions, folder attributes)
//! are persisted as JSON text and decoded in the `FromRow` implementations,
//! so callers only ever see the typed form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

/// Tenant boundary. Every domain belongs to exactly one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A verified mail domain under an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// How a user's folders are projected into IMAP namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamespaceMode {
    /// Each non-primary domain roots its tree at `"<domain>/"`.
    DomainSeparated,
    /// All owned folders merge under a single root.
    Unified,
}

impl NamespaceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceMode::DomainSeparated => "domain-separated",
            NamespaceMode::Unified => "unified",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "unified" => NamespaceMode::Unified,
            _ => NamespaceMode::DomainSeparated,
        }
    }
}

/// An account. One user may own mailboxes across several domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub primary_email: String,
    pub display_name: String,
    pub password_salt: String,
    pub password_hash: String,
    pub primary_domain_id: i64,
    pub namespace_mode: NamespaceMode,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for User {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(User {
            id: row.try_get("id")?,
            primary_email: row.try_get("primary_email")?,
            display_name: row.try_get("display_name")?,
            password_salt: row.try_get("password_salt")?,
            password_hash: row.try_get("password_hash")?,
            primary_domain_id: row.try_get("primary_domain_id")?,
            namespace_mode: NamespaceMode::parse(row.try_get("namespace_mode")?),
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Unit of storage and quota. Belongs to exactly one (user, domain) pair;
/// `email` is globally unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub id: i64,
    pub user_id: i64,
    pub domain_id: i64,
    pub email: String,
    pub display_name: String,
    /// Zero means unlimited.
    pub quota_bytes: i64,
    pub used_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Mailbox {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Mailbox {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            domain_id: row.try_get("domain_id")?,
            email: row.try_get("email")?,
            display_name: row.try_get("display_name")?,
            quota_bytes: row.try_get("quota_bytes")?,
            used_bytes: row.try_get("used_bytes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Standard special-use roles, RFC 6154 style. At most one folder per role
/// per mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialUse {
    Inbox,
    Sent,
    Drafts,
    Junk,
    Trash,
    Archive,
}

impl SpecialUse {
    pub const ALL: [SpecialUse; 6] = [
        SpecialUse::Inbox,
        SpecialUse::Sent,
        SpecialUse::Drafts,
        SpecialUse::Junk,
        SpecialUse::Trash,
        SpecialUse::Archive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialUse::Inbox => "inbox",
            SpecialUse::Sent => "sent",
            SpecialUse::Drafts => "drafts",
            SpecialUse::Junk => "junk",
            SpecialUse::Trash => "trash",
            SpecialUse::Archive => "archive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inbox" => Some(SpecialUse::Inbox),
            "sent" => Some(SpecialUse::Sent),
            "drafts" => Some(SpecialUse::Drafts),
            "junk" => Some(SpecialUse::Junk),
            "trash" => Some(SpecialUse::Trash),
            "archive" => Some(SpecialUse::Archive),
            _ => None,
        }
    }

    /// Default folder path created at provisioning time.
    pub fn default_path(&self) -> &'static str {
        match self {
            SpecialUse::Inbox => "INBOX",
            SpecialUse::Sent => "Sent",
            SpecialUse::Drafts => "Drafts",
            SpecialUse::Junk => "Junk",
            SpecialUse::Trash => "Trash",
            SpecialUse::Archive => "Archive",
        }
    }
}

/// A folder inside a mailbox, with its IMAP addressing counters.
///
/// `uid_validity` changes only when the folder is rebuilt; `uid_next` and
/// `highest_modseq` are strictly increasing. `message_count`/`unseen_count`
/// are a cache over the message table and can be recomputed at any time.
#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    pub id: i64,
    pub mailbox_id: i64,
    pub full_path: String,
    pub delimiter: String,
    pub special_use: Option<SpecialUse>,
    pub uid_validity: u32,
    pub uid_next: u32,
    pub highest_modseq: i64,
    pub message_count: u32,
    pub unseen_count: u32,
    pub attributes: serde_json::Value,
}

impl FromRow<'_, SqliteRow> for Folder {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let special_use: Option<String> = row.try_get("special_use")?;
        let attributes: String = row.try_get("attributes")?;
        Ok(Folder {
            id: row.try_get("id")?,
            mailbox_id: row.try_get("mailbox_id")?,
            full_path: row.try_get("full_path")?,
            delimiter: row.try_get("delimiter")?,
            special_use: special_use.as_deref().and_then(SpecialUse::parse),
            uid_validity: row.try_get("uid_validity")?,
            uid_next: row.try_get("uid_next")?,
            highest_modseq: row.try_get("highest_modseq")?,
            message_count: row.try_get("message_count")?,
            unseen_count: row.try_get("unseen_count")?,
            attributes: serde_json::from_str(&attributes).map_err(decode_err("attributes"))?,
        })
    }
}

/// The standard `\Seen` flag, the only one counter maintenance cares about.
pub const FLAG_SEEN: &str = "\\Seen";

/// A message row. `uid` is unique within (folder, uid_validity) only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub folder_id: i64,
    pub uid: u32,
    pub subject: String,
    pub from_addr: String,
    pub body: String,
    pub flags: Vec<String>,
    pub size_bytes: i64,
    pub modseq: i64,
    pub internal_date: DateTime<Utc>,
}

impl Message {
    pub fn is_seen(&self) -> bool {
        self.flags.iter().any(|f| f == FLAG_SEEN)
    }
}

impl FromRow<'_, SqliteRow> for Message {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let flags: String = row.try_get("flags")?;
        Ok(Message {
            id: row.try_get("id")?,
            folder_id: row.try_get("folder_id")?,
            uid: row.try_get("uid")?,
            subject: row.try_get("subject")?,
            from_addr: row.try_get("from_addr")?,
            body: row.try_get("body")?,
            flags: serde_json::from_str(&flags).map_err(decode_err("flags"))?,
            size_bytes: row.try_get("size_bytes")?,
            modseq: row.try_get("modseq")?,
            internal_date: row.try_get("internal_date")?,
        })
    }
}

/// Individual rights a shared-mailbox grant can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Delete,
    Admin,
}

impl Permission {
    /// Whether `granted` is sufficient for this required permission.
    /// Admin satisfies everything; other rights must be granted explicitly.
    pub fn satisfied_by(&self, granted: &[Permission]) -> bool {
        granted.contains(&Permission::Admin) || granted.contains(self)
    }
}

/// A grant of partial access to a mailbox the user does not own.
///
/// An expired grant must be treated as absent everywhere, never as merely
/// inactive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedAccess {
    pub id: i64,
    pub mailbox_id: i64,
    pub user_id: i64,
    pub permissions: Vec<Permission>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for SharedAccess {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let permissions: String = row.try_get("permissions")?;
        Ok(SharedAccess {
            id: row.try_get("id")?,
            mailbox_id: row.try_get("mailbox_id")?,
            user_id: row.try_get("user_id")?,
            permissions: serde_json::from_str(&permissions).map_err(decode_err("permissions"))?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// A mailbox the user owns, joined with its domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedMailbox {
    pub mailbox: Mailbox,
    pub domain_name: String,
}

impl FromRow<'_, SqliteRow> for OwnedMailbox {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(OwnedMailbox {
            mailbox: Mailbox::from_row(row)?,
            domain_name: row.try_get("domain_name")?,
        })
    }
}

/// A mailbox visible to the user through an unexpired grant, joined with the
/// grant itself and the owner's primary email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedMailbox {
    pub mailbox: Mailbox,
    pub owner_email: String,
    pub permissions: Vec<Permission>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl FromRow<'_, SqliteRow> for SharedMailbox {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let permissions: String = row.try_get("permissions")?;
        Ok(SharedMailbox {
            mailbox: Mailbox::from_row(row)?,
            owner_email: row.try_get("owner_email")?,
            permissions: serde_json::from_str(&permissions).map_err(decode_err("permissions"))?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

/// One row in the insert-only audit log. Written for every mutating call,
/// successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub actor_user_id: i64,
    pub action: String,
    pub folder_path: String,
    pub uids: Vec<u32>,
    pub remote_addr: String,
    pub success: bool,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for AuditEntry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let uids: String = row.try_get("uids")?;
        Ok(AuditEntry {
            id: row.try_get("id")?,
            actor_user_id: row.try_get("actor_user_id")?,
            action: row.try_get("action")?,
            folder_path: row.try_get("folder_path")?,
            uids: serde_json::from_str(&uids).map_err(decode_err("uids"))?,
            remote_addr: row.try_get("remote_addr")?,
            success: row.try_get("success")?,
            detail: row.try_get("detail")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for Organization {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Organization {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for Domain {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Domain {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn decode_err(
    column: &str,
) -> impl FnOnce(serde_json::Error) -> sqlx::Error + '_ {
    move |err| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    }
}
