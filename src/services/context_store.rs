use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Duration, Utc};
use rusqlite::Connection;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::db::queries;
use crate::models::ConversationContext;

/// Durable side of the context store: one record per user.
pub trait ContextPersistence: Send + Sync {
    fn load_all(&self) -> anyhow::Result<Vec<ConversationContext>>;
    fn save(&self, ctx: &ConversationContext) -> anyhow::Result<()>;
    fn delete(&self, user_id: &str) -> anyhow::Result<bool>;
    fn delete_idle_since(&self, cutoff: &chrono::DateTime<Utc>) -> anyhow::Result<usize>;
}

pub struct SqliteContextPersistence {
    db: Arc<Mutex<Connection>>,
}

impl SqliteContextPersistence {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ContextPersistence for SqliteContextPersistence {
    fn load_all(&self) -> anyhow::Result<Vec<ConversationContext>> {
        let records = queries::load_contexts(&self.conn())?;
        let mut contexts = Vec::with_capacity(records.len());
        for (user_id, parsed) in records {
            match parsed {
                Ok(ctx) => contexts.push(ctx),
                Err(e) => tracing::warn!(user_id = %user_id, error = %e, "skipping unreadable context"),
            }
        }
        Ok(contexts)
    }

    fn save(&self, ctx: &ConversationContext) -> anyhow::Result<()> {
        queries::save_context(&self.conn(), ctx)
    }

    fn delete(&self, user_id: &str) -> anyhow::Result<bool> {
        queries::delete_context(&self.conn(), user_id)
    }

    fn delete_idle_since(&self, cutoff: &chrono::DateTime<Utc>) -> anyhow::Result<usize> {
        queries::delete_contexts_before(&self.conn(), cutoff)
    }
}

type Slot = Arc<AsyncMutex<ConversationContext>>;

/// In-memory contexts keyed by user, each behind its own lock, written
/// through to a `ContextPersistence` adapter.
///
/// The outer map lock is only held to look up or insert a user's slot, never
/// across an await, so different users do not wait on each other.
pub struct ContextStore {
    entries: Mutex<HashMap<String, Slot>>,
    persistence: Arc<dyn ContextPersistence>,
    retention: Option<Duration>,
}

impl ContextStore {
    /// `retention` of `None` keeps contexts forever.
    pub fn new(persistence: Arc<dyn ContextPersistence>, retention: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            persistence,
            retention,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cutoff(&self) -> Option<chrono::DateTime<Utc>> {
        self.retention.map(|keep| Utc::now() - keep)
    }

    /// Loads every durable context into memory, dropping ones past retention.
    pub fn load(&self) -> anyhow::Result<usize> {
        let cutoff = self.cutoff();
        if let Some(cutoff) = &cutoff {
            let removed = self.persistence.delete_idle_since(cutoff)?;
            if removed > 0 {
                tracing::info!(removed, "dropped idle contexts past retention");
            }
        }

        let contexts = self.persistence.load_all()?;
        let mut entries = self.entries();
        let mut loaded = 0;
        for ctx in contexts {
            if cutoff.is_some_and(|c| ctx.last_updated < c) {
                continue;
            }
            entries.insert(ctx.user_id.clone(), Arc::new(AsyncMutex::new(ctx)));
            loaded += 1;
        }
        tracing::info!(loaded, "conversation contexts loaded");
        Ok(loaded)
    }

    /// Exclusive access to a user's context, creating an empty one on first use.
    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<ConversationContext> {
        loop {
            let slot = self
                .entries()
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(ConversationContext::new(user_id))))
                .clone();
            let guard = slot.clone().lock_owned().await;
            if self.is_current(user_id, &slot) {
                return guard;
            }
        }
    }

    /// Exclusive access only if the user already has a context.
    pub async fn lock_existing(&self, user_id: &str) -> Option<OwnedMutexGuard<ConversationContext>> {
        loop {
            let slot = self.entries().get(user_id).cloned()?;
            let guard = slot.clone().lock_owned().await;
            if self.is_current(user_id, &slot) {
                return Some(guard);
            }
        }
    }

    /// False once a delete or eviction has unlinked `slot` from the map.
    fn is_current(&self, user_id: &str, slot: &Slot) -> bool {
        self.entries()
            .get(user_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    pub async fn get(&self, user_id: &str) -> Option<ConversationContext> {
        self.lock_existing(user_id).await.map(|guard| guard.clone())
    }

    pub async fn put(&self, ctx: ConversationContext) -> anyhow::Result<()> {
        let mut guard = self.lock(&ctx.user_id).await;
        *guard = ctx;
        self.persist(&guard)
    }

    /// Writes a context the caller already holds the lock for.
    pub fn persist(&self, ctx: &ConversationContext) -> anyhow::Result<()> {
        self.persistence.save(ctx).map_err(|e| {
            tracing::error!(user_id = %ctx.user_id, error = %e, "failed to persist context");
            e
        })
    }

    /// Forgets a user in memory and in durable storage.
    pub async fn delete(&self, user_id: &str) -> anyhow::Result<bool> {
        let Some(mut guard) = self.lock_existing(user_id).await else {
            return self.persistence.delete(user_id);
        };
        *guard = ConversationContext::new(user_id);
        self.entries().remove(user_id);
        // Durable delete runs before the lock is released so a waiting
        // writer's save lands after it.
        self.persistence.delete(user_id)?;
        drop(guard);
        Ok(true)
    }

    /// Drops contexts idle past retention. Contexts in use are left alone.
    pub fn evict_idle(&self) -> anyhow::Result<usize> {
        let Some(cutoff) = self.cutoff() else {
            return Ok(0);
        };

        let evicted = {
            let mut entries = self.entries();
            let before = entries.len();
            entries.retain(|_, slot| match slot.try_lock() {
                Ok(ctx) => ctx.last_updated >= cutoff,
                Err(_) => true,
            });
            before - entries.len()
        };
        let durable = self.persistence.delete_idle_since(&cutoff)?;
        if evicted > 0 || durable > 0 {
            tracing::info!(evicted, durable, "evicted idle contexts");
        }
        Ok(evicted)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
