/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! # Multi-Domain Mailbox Engine
//!
//! The data, authorization and consistency layer beneath an IMAP protocol
//! front-end for a multi-tenant mail platform. One user can own or be
//! granted mailboxes across several mail domains; this crate presents them
//! as coherent namespaces and keeps the protocol's addressing invariants
//! (UIDVALIDITY, UIDNEXT, HIGHESTMODSEQ) intact under concurrent mutation.
//!
//! ## Components
//!
//! - [`sequence`] — pure sequence-set expansion, run outside any lock.
//! - [`acl`] — ownership/grant resolution with uniform `NotFound` denials.
//! - [`namespace`] — unified or domain-separated folder projection.
//! - [`op`] — copy/move/flag/select/fetch/deliver operations with UID
//!   allocation and modseq stamping under per-folder locks.
//! - [`quota`] — usage/limit accounting enforced at write time.
//! - [`auth`] — multi-domain login resolution.
//! - [`cache`] — independently lifecycled domain cache for the acceptance
//!   path.
//! - [`audit`] — one audit row per mutating call, success or not.
//!
//! The wire grammar, TLS/SASL and response formatting live upstream; the
//! protocol layer drives [`Engine`] and renders what it returns.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mailbox::{Engine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::open(EngineConfig::default()).await?;
//!     let session = engine.login("alice@a.com", "secret", "198.51.100.7").await?;
//!     let namespace = engine.namespace(&session).await?;
//!     println!("{} visible folders", namespace.entries.len());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use store::{Folder, NamespaceMode, Store, User};
use tracing::info;

pub mod acl;
pub mod audit;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod locks;
pub mod namespace;
pub mod op;
pub mod quota;
pub mod sequence;

pub use audit::SessionContext;
pub use cache::{CacheEvent, DomainCache};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use namespace::{FolderTarget, Namespace, NamespaceEntry, NamespacePrefix};
pub use op::{FlagMode, FolderStatus, UidMapping};
pub use quota::QuotaUsage;
pub use sequence::parse_sequence_set;

/// An authenticated connection's view of the engine.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub ctx: SessionContext,
}

/// The mailbox engine. Cheap to clone and share across connections; every
/// mutating operation is scoped to a per-folder lock plus one transaction,
/// so a disconnecting client aborts only its own in-flight work.
#[derive(Clone)]
pub struct Engine {
    store: Store,
    locks: locks::FolderLocks,
    cache: Arc<DomainCache>,
    config: EngineConfig,
}

impl Engine {
    /// Opens the database named by the configuration and starts the domain
    /// cache.
    pub async fn open(config: EngineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(store::StoreError::Migration)
            .map_err(EngineError::from)?;
        let store = Store::open(&config.database_url).await?;
        Self::with_store(store, config).await
    }

    /// Builds an engine over an existing store handle. Used by tests and by
    /// deployments that share one store across services.
    pub async fn with_store(store: Store, config: EngineConfig) -> Result<Self> {
        let cache = Arc::new(DomainCache::new(
            store.clone(),
            config.cache_refresh_interval(),
        ));
        cache.start().await?;

        info!("mailbox engine ready");
        Ok(Self {
            store,
            locks: locks::FolderLocks::new(),
            cache,
            config,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn domain_cache(&self) -> &Arc<DomainCache> {
        &self.cache
    }

    /// Authenticates an identifier/credential pair and opens a session.
    pub async fn login(
        &self,
        identifier: &str,
        credential: &str,
        remote_addr: &str,
    ) -> Result<Session> {
        let user = auth::login(&self.store, identifier, credential).await?;
        let ctx = SessionContext::new(user.id, remote_addr);
        Ok(Session { user, ctx })
    }

    /// Composes the namespace for this session from owned mailboxes,
    /// unexpired shares and the user's mode preference.
    pub async fn namespace(&self, session: &Session) -> Result<Namespace> {
        let (owned, shared) = auth::all_mailboxes(&self.store, session.user.id).await?;

        let mut owned_with_folders = Vec::with_capacity(owned.len());
        for mailbox in owned {
            let folders = self.store.list_folders(mailbox.mailbox.id).await?;
            owned_with_folders.push((mailbox, folders));
        }
        let mut shared_with_folders = Vec::with_capacity(shared.len());
        for mailbox in shared {
            let folders = self.store.list_folders(mailbox.mailbox.id).await?;
            shared_with_folders.push((mailbox, folders));
        }

        let primary_domain = self
            .store
            .domain_by_id(session.user.primary_domain_id)
            .await?
            .map(|domain| domain.name)
            .unwrap_or_default();

        Ok(namespace::compose(
            &owned_with_folders,
            &shared_with_folders,
            session.user.namespace_mode,
            &primary_domain,
            &self.config.shared_root,
            &self.config.delimiter,
        ))
    }

    /// Switches the user's namespace mode preference. A pure projection
    /// change; no folder rows are touched.
    pub async fn set_namespace_mode(&self, session: &Session, mode: NamespaceMode) -> Result<()> {
        self.store.set_namespace_mode(session.user.id, mode).await?;
        Ok(())
    }

    /// Folders of one mailbox, gated by read access.
    pub async fn list_folders(&self, session: &Session, mailbox_id: i64) -> Result<Vec<Folder>> {
        acl::resolve_mailbox(&self.store, session.user.id, mailbox_id, store::Permission::Read)
            .await?;
        Ok(self.store.list_folders(mailbox_id).await?)
    }

    /// Usage/limit for one mailbox, gated by read access.
    pub async fn get_quota(&self, session: &Session, mailbox_id: i64) -> Result<QuotaUsage> {
        let mailbox = acl::resolve_mailbox(
            &self.store,
            session.user.id,
            mailbox_id,
            store::Permission::Read,
        )
        .await?;
        Ok(QuotaUsage::of(&mailbox))
    }

    /// Grants another user access to a mailbox. Requires admin rights on the
    /// mailbox (ownership qualifies).
    pub async fn grant_access(
        &self,
        session: &Session,
        mailbox_id: i64,
        user_id: i64,
        permissions: &[store::Permission],
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()> {
        let result = self
            .grant_access_inner(session, mailbox_id, user_id, permissions, expires_at)
            .await;
        audit::record(
            &self.store,
            &session.ctx,
            "grant",
            "",
            &[],
            result.is_ok(),
            &format!("mailbox={mailbox_id} grantee={user_id}"),
        )
        .await;
        result
    }

    async fn grant_access_inner(
        &self,
        session: &Session,
        mailbox_id: i64,
        user_id: i64,
        permissions: &[store::Permission],
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()> {
        acl::resolve_mailbox(
            &self.store,
            session.user.id,
            mailbox_id,
            store::Permission::Admin,
        )
        .await?;
        self.store
            .grant_access(mailbox_id, user_id, permissions, expires_at)
            .await?;
        Ok(())
    }

    /// Revokes a grant. Requires admin rights on the mailbox.
    pub async fn revoke_access(
        &self,
        session: &Session,
        mailbox_id: i64,
        user_id: i64,
    ) -> Result<bool> {
        let result: Result<bool> = async {
            acl::resolve_mailbox(
                &self.store,
                session.user.id,
                mailbox_id,
                store::Permission::Admin,
            )
            .await?;
            Ok(self.store.revoke_access(mailbox_id, user_id).await?)
        }
        .await;
        audit::record(
            &self.store,
            &session.ctx,
            "revoke",
            "",
            &[],
            result.is_ok(),
            &format!("mailbox={mailbox_id} grantee={user_id}"),
        )
        .await;
        result
    }

    /// Returns the session user's own audit trail, newest first, capped by
    /// the configured query limit.
    pub async fn audit_trail(&self, session: &Session) -> Result<Vec<store::AuditEntry>> {
        Ok(self
            .store
            .audit_entries_for(session.user.id, self.config.audit_query_limit)
            .await?)
    }
}
