/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Domain lookup cache for the mail-acceptance path.
//!
//! The acceptance side needs to answer "is this a local domain" on every
//! incoming message without a round trip to storage. This component owns
//! that answer: an explicitly lifecycled cache with `start`/`stop`/
//! `invalidate` and a change-notification subscription, injected as a
//! dependency wherever it is needed. Its refresh task runs on its own timer
//! and never blocks a client command.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use store::{Domain, Store};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Change events published to cache subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// The cache was reloaded from storage.
    Refreshed { domains: usize },
    /// The cache was explicitly invalidated and reloaded.
    Invalidated,
}

/// Shared domain cache with a background refresh task.
#[derive(Debug)]
pub struct DomainCache {
    store: Store,
    domains: Arc<RwLock<HashMap<String, Domain>>>,
    events: broadcast::Sender<CacheEvent>,
    refresh_interval: Duration,
    task: RwLock<Option<JoinHandle<()>>>,
}

impl DomainCache {
    pub fn new(store: Store, refresh_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            store,
            domains: Arc::new(RwLock::new(HashMap::new())),
            events,
            refresh_interval,
            task: RwLock::new(None),
        }
    }

    /// Loads the cache and spawns the periodic refresh task. Idempotent;
    /// a second start is a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<(), store::StoreError> {
        let mut task = self.task.write().await;
        if task.is_some() {
            return Ok(());
        }

        self.reload().await?;

        let cache = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.refresh_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = cache.reload().await {
                    warn!(error = %err, "domain cache refresh failed, keeping stale entries");
                }
            }
        }));

        info!("domain cache started");
        Ok(())
    }

    /// Stops the refresh task. Lookups keep working against the last
    /// loaded snapshot.
    pub async fn stop(&self) {
        if let Some(task) = self.task.write().await.take() {
            task.abort();
            info!("domain cache stopped");
        }
    }

    /// Drops and reloads the cached set immediately.
    pub async fn invalidate(&self) -> Result<(), store::StoreError> {
        self.reload().await?;
        let _ = self.events.send(CacheEvent::Invalidated);
        Ok(())
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Cached lookup by domain name.
    pub async fn lookup(&self, name: &str) -> Option<Domain> {
        self.domains.read().await.get(name).cloned()
    }

    pub async fn is_local_domain(&self, name: &str) -> bool {
        self.domains.read().await.contains_key(name)
    }

    async fn reload(&self) -> Result<(), store::StoreError> {
        let fresh = self.store.list_domains().await?;
        let count = fresh.len();
        let mut domains = self.domains.write().await;
        domains.clear();
        for domain in fresh {
            domains.insert(domain.name.clone(), domain);
        }
        drop(domains);

        debug!(count, "domain cache reloaded");
        let _ = self.events.send(CacheEvent::Refreshed { domains: count });
        Ok(())
    }
}
