//! In-memory stand-in for the shared relational store.
//!
//! Rows are stamped with the wall clock in whole seconds, so a write landing
//! in the same second as a fetch is only seen again through the cache's
//! rollback window.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use meshsync::core::{
    BoxError, ChangeSource, FetchBatch, RawRecord, Revision, RevisionRecord, Timestamp,
};
use meshsync::resources::{ClientKind, ClientRow, RateLimitKind, RateLimitRow};
use parking_lot::RwLock;

fn now() -> Timestamp {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    Timestamp::from_secs(i64::try_from(secs).unwrap_or(i64::MAX))
}

struct Table<P> {
    rows: BTreeMap<String, RawRecord<P>>,
    revisions: BTreeMap<String, (Revision, Timestamp)>,
}

impl<P: Clone> Table<P> {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            revisions: BTreeMap::new(),
        }
    }

    fn put(&mut self, id: &str, parent: &str, payload: P) {
        let stamp = now();
        let row = RawRecord::new(id, parent, payload)
            .with_modify_time(stamp)
            .with_revision(format!("{id}-{}", stamp.as_secs()));
        self.rows.insert(id.to_string(), row);
    }

    fn delete(&mut self, id: &str) -> bool {
        match self.rows.get_mut(id) {
            Some(row) if row.valid => {
                row.valid = false;
                row.modify_time = now();
                true
            }
            _ => false,
        }
    }

    fn bump_revision(&mut self, parent: &str, token: String) {
        self.revisions
            .insert(parent.to_string(), (Revision::new(token), now()));
    }

    fn changed_since(&self, cursor: Timestamp, first_load: bool) -> FetchBatch<P> {
        let records = self
            .rows
            .values()
            .filter(|row| if first_load { row.valid } else { row.modify_time > cursor })
            .cloned()
            .collect();
        let revisions = self
            .revisions
            .iter()
            .filter(|(_, (_, touched))| first_load || *touched > cursor)
            .map(|(parent, (token, _))| RevisionRecord::new(parent.as_str(), token.clone()))
            .collect();
        FetchBatch::new(records, revisions)
    }

    fn live_ids_of(&self, parent: &str) -> Vec<String> {
        self.rows
            .values()
            .filter(|row| row.valid && row.parent == parent)
            .map(|row| row.id.clone())
            .collect()
    }
}

/// Rate-limit rules and client registrations.
pub struct MemoryStore {
    rate_limits: RwLock<Table<RateLimitRow>>,
    clients: RwLock<Table<ClientRow>>,
    next_rule: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rate_limits: RwLock::new(Table::new()),
            clients: RwLock::new(Table::new()),
            next_rule: AtomicU64::new(0),
        }
    }

    /// Add a rule to `service` and bump the service revision.
    pub fn add_rule(&self, service: &str, rule: RateLimitRow) -> String {
        let id = format!("rule-{}", self.next_rule.fetch_add(1, Ordering::Relaxed) + 1);
        let mut table = self.rate_limits.write();
        table.put(&id, service, rule);
        table.bump_revision(service, format!("{service}-{id}"));
        id
    }

    /// Delete one rule of `service`, if it has any.
    pub fn delete_some_rule(&self, service: &str, pick: usize) -> Option<String> {
        let mut table = self.rate_limits.write();
        let ids = table.live_ids_of(service);
        if ids.is_empty() {
            return None;
        }
        let id = ids[pick % ids.len()].clone();
        table.delete(&id);
        table.bump_revision(service, format!("{service}-del-{id}"));
        Some(id)
    }

    /// Register or re-register a client.
    pub fn register_client(&self, id: &str, row: ClientRow) {
        let host = row.host.clone();
        self.clients.write().put(id, &host, row);
    }

    /// Deregister a client.
    pub fn deregister_client(&self, id: &str) -> bool {
        self.clients.write().delete(id)
    }
}

#[async_trait]
impl ChangeSource<RateLimitKind> for MemoryStore {
    async fn fetch_changed(
        &self,
        cursor: Timestamp,
        first_load: bool,
    ) -> Result<FetchBatch<RateLimitRow>, BoxError> {
        Ok(self.rate_limits.read().changed_since(cursor, first_load))
    }

    async fn server_unix_time(&self) -> Result<Timestamp, BoxError> {
        Ok(now())
    }
}

#[async_trait]
impl ChangeSource<ClientKind> for MemoryStore {
    async fn fetch_changed(
        &self,
        cursor: Timestamp,
        first_load: bool,
    ) -> Result<FetchBatch<ClientRow>, BoxError> {
        Ok(self.clients.read().changed_since(cursor, first_load))
    }

    async fn server_unix_time(&self) -> Result<Timestamp, BoxError> {
        Ok(now())
    }
}
