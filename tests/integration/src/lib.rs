//! Shared harness for the cross-crate tests.
//!
//! [`TableStore`] behaves like a relational store behind a
//! [`ChangeSource`]: rows carry a store-assigned modification time, deletions
//! are soft, and "changed since" queries compare against that time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use meshsync::core::{
    BoxError, ChangeSource, DecodeError, FetchBatch, RawRecord, ResourceKind, Revision,
    RevisionRecord, Timestamp,
};
use parking_lot::Mutex;

/// Rows whose payload is a plain string. The empty string does not decode.
#[derive(Debug)]
pub struct PlainKind;

impl ResourceKind for PlainKind {
    const RESOURCE: &'static str = "plain";
    type Raw = String;
    type Payload = String;

    fn decode(raw: String) -> Result<String, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::MissingField("payload"));
        }
        Ok(raw)
    }
}

struct Tables<P> {
    rows: BTreeMap<String, RawRecord<P>>,
    revisions: BTreeMap<String, (Revision, Timestamp)>,
    clock: Timestamp,
}

/// An in-memory table with a store clock.
pub struct TableStore<K: ResourceKind> {
    tables: Mutex<Tables<K::Raw>>,
    offline: AtomicBool,
    fetches: AtomicUsize,
}

impl<K> Default for TableStore<K>
where
    K: ResourceKind,
    K::Raw: Clone,
{
    fn default() -> Self {
        Self::new(Timestamp::from_secs(1_000))
    }
}

impl<K> TableStore<K>
where
    K: ResourceKind,
    K::Raw: Clone,
{
    /// Create an empty store whose clock reads `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            tables: Mutex::new(Tables {
                rows: BTreeMap::new(),
                revisions: BTreeMap::new(),
                clock: now,
            }),
            offline: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Current store time.
    pub fn now(&self) -> Timestamp {
        self.tables.lock().clock
    }

    /// Move the store clock forward.
    pub fn tick(&self, secs: i64) -> Timestamp {
        let mut tables = self.tables.lock();
        tables.clock = Timestamp::from_secs(tables.clock.as_secs() + secs);
        tables.clock
    }

    /// Insert or overwrite a row, stamped with the current store time.
    pub fn put(&self, id: &str, parent: &str, payload: K::Raw) {
        let mut tables = self.tables.lock();
        let now = tables.clock;
        self.write_row(&mut tables, id, parent, payload, now);
    }

    /// Insert a row stamped with an older time, as a slow transaction that
    /// commits after newer ones would.
    pub fn put_at(&self, id: &str, parent: &str, payload: K::Raw, modify_time: Timestamp) {
        let mut tables = self.tables.lock();
        self.write_row(&mut tables, id, parent, payload, modify_time);
    }

    fn write_row(
        &self,
        tables: &mut Tables<K::Raw>,
        id: &str,
        parent: &str,
        payload: K::Raw,
        modify_time: Timestamp,
    ) {
        let row = RawRecord::new(id, parent, payload)
            .with_modify_time(modify_time)
            .with_revision(format!("{id}@{}", modify_time.as_secs()));
        tables.rows.insert(id.to_string(), row);
    }

    /// Soft-delete a row. Returns `false` if the row does not exist.
    pub fn delete(&self, id: &str) -> bool {
        let mut tables = self.tables.lock();
        let now = tables.clock;
        match tables.rows.get_mut(id) {
            Some(row) => {
                row.valid = false;
                row.modify_time = now;
                true
            }
            None => false,
        }
    }

    /// Set the aggregate revision of `parent`.
    pub fn set_revision(&self, parent: &str, token: &str) {
        let mut tables = self.tables.lock();
        let now = tables.clock;
        tables
            .revisions
            .insert(parent.to_string(), (Revision::new(token), now));
    }

    /// Make every call fail until [`restore`](Self::restore).
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    /// Undo [`go_offline`](Self::go_offline).
    pub fn restore(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    /// Number of `fetch_changed` calls served.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Valid rows currently in the table.
    pub fn valid_rows(&self) -> usize {
        self.tables.lock().rows.values().filter(|r| r.valid).count()
    }

    fn check_online(&self) -> Result<(), BoxError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }
        Ok(())
    }
}

#[async_trait]
impl<K> ChangeSource<K> for TableStore<K>
where
    K: ResourceKind,
    K::Raw: Clone,
{
    async fn fetch_changed(
        &self,
        cursor: Timestamp,
        first_load: bool,
    ) -> Result<FetchBatch<K::Raw>, BoxError> {
        self.check_online()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables.lock();

        let records = tables
            .rows
            .values()
            .filter(|row| {
                if first_load {
                    row.valid
                } else {
                    row.modify_time > cursor
                }
            })
            .cloned()
            .collect();
        let revisions = tables
            .revisions
            .iter()
            .filter(|(_, (_, touched))| first_load || *touched > cursor)
            .map(|(parent, (token, _))| RevisionRecord::new(parent.as_str(), token.clone()))
            .collect();

        Ok(FetchBatch::new(records, revisions))
    }

    async fn server_unix_time(&self) -> Result<Timestamp, BoxError> {
        self.check_online()?;
        Ok(self.now())
    }
}

/// Fill `store` with `parents` x `per_parent` rows named `id-{p}-{r}` under
/// `parent-{p}`, each parent with revision `last-revision-{p}`.
pub fn seed_grid<K, F>(store: &TableStore<K>, parents: usize, per_parent: usize, payload: F)
where
    K: ResourceKind,
    K::Raw: Clone,
    F: Fn(usize, usize) -> K::Raw,
{
    for p in 0..parents {
        let parent = format!("parent-{p}");
        for r in 0..per_parent {
            store.put(&format!("id-{p}-{r}"), &parent, payload(p, r));
        }
        store.set_revision(&parent, &format!("last-revision-{p}"));
    }
}
