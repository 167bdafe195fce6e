//! SQLite entry store with unit-of-work staging
//!
//! Mutations do not write immediately: they collect as staged operations
//! and execute when the repository flushes. Remove and update resolve
//! their target row at staging time by the entity type's own equality,
//! capturing the row id and version; the flush guards every write with
//! `WHERE version = ?` so a concurrent writer's win is detected rather
//! than silently overwritten.

use crate::ensure_identifier;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use stratum_core::{
    AnyStore, ConcurrentUpdateItem, Entity, Entry, EntryStore, Result, StratumError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RowRef {
    id: i64,
    version: i64,
}

#[derive(Clone)]
enum Staged<T> {
    Insert(T),
    Update { row: RowRef, entity: T },
    Delete { row: RowRef, entity: T },
}

/// Durable entry store for one entity type.
pub struct SqliteEntries<T: Entity> {
    conn: Arc<Mutex<Connection>>,
    table: &'static str,
    staged: Vec<Staged<T>>,
}

impl<T: Entity> Clone for SqliteEntries<T> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            table: self.table,
            staged: self.staged.clone(),
        }
    }
}

impl<T: Entity> SqliteEntries<T> {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        let table = T::store_name();
        ensure_identifier(table)?;
        {
            let guard = conn.lock().unwrap();
            Self::ensure_table(&guard, table)
                .map_err(|e| StratumError::Config(format!("cannot create table {table}: {e}")))?;
        }
        Ok(Self {
            conn,
            table,
            staged: Vec::new(),
        })
    }

    /// The create is re-issued before every read and flush: when the
    /// store was first opened inside an explicit transaction, the DDL
    /// joins that transaction and a rollback removes the table again.
    fn ensure_table(conn: &Connection, table: &str) -> rusqlite::Result<()> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    body TEXT NOT NULL,
                    version INTEGER NOT NULL DEFAULT 1
                )"
            ),
            [],
        )
        .map(|_| ())
    }

    fn select_sql(&self) -> String {
        format!("SELECT id, version, body FROM {} ORDER BY id", self.table)
    }

    /// Read every row with its reference. Saved data only; staged
    /// mutations are invisible until flushed.
    fn rows(&self) -> Result<Vec<(RowRef, T)>> {
        let sql = self.select_sql();
        let guard = self.conn.lock().unwrap();
        Self::ensure_table(&guard, self.table)
            .map_err(|e| StratumError::operation("scan", Some(sql.clone()), e))?;
        let mut stmt = guard
            .prepare(&sql)
            .map_err(|e| StratumError::operation("scan", Some(sql.clone()), e))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| StratumError::operation("scan", Some(sql.clone()), e))?;

        let mut out = Vec::new();
        loop {
            let row = rows
                .next()
                .map_err(|e| StratumError::operation("scan", Some(sql.clone()), e))?;
            let Some(row) = row else { break };
            let id: i64 = row
                .get(0)
                .map_err(|e| StratumError::operation("scan", Some(sql.clone()), e))?;
            let version: i64 = row
                .get(1)
                .map_err(|e| StratumError::operation("scan", Some(sql.clone()), e))?;
            let body: String = row
                .get(2)
                .map_err(|e| StratumError::operation("scan", Some(sql.clone()), e))?;
            let entity: T = serde_json::from_str(&body)
                .map_err(|e| StratumError::operation("scan", Some(sql.clone()), e))?;
            out.push((RowRef { id, version }, entity));
        }
        Ok(out)
    }

    fn locate(&self, entity: &T) -> Result<Option<RowRef>> {
        Ok(self
            .rows()?
            .into_iter()
            .find(|(_, stored)| stored == entity)
            .map(|(row, _)| row))
    }

    fn staged_delete_exists(&self, row: RowRef) -> bool {
        self.staged
            .iter()
            .any(|op| matches!(op, Staged::Delete { row: staged, .. } if staged.id == row.id))
    }

    fn staged_insert_position(&self, entity: &T) -> Option<usize> {
        self.staged
            .iter()
            .position(|op| matches!(op, Staged::Insert(staged) if staged == entity))
    }

    /// Build the conflict report for one row that lost a write race.
    fn conflict_item(&self, conn: &Connection, row: RowRef, entity: &T) -> Result<ConcurrentUpdateItem> {
        let attempted = serde_json::to_value(entity)
            .map_err(|e| StratumError::operation("save_changes", None, e))?;
        let body: Option<String> = conn
            .query_row(
                &format!("SELECT body FROM {} WHERE id = ?1", self.table),
                params![row.id],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| StratumError::operation("save_changes", None, e))?;
        let stored = match body {
            Some(body) => Some(
                serde_json::from_str(&body)
                    .map_err(|e| StratumError::operation("save_changes", None, e))?,
            ),
            None => None,
        };
        Ok(ConcurrentUpdateItem { attempted, stored })
    }

    #[cfg(test)]
    pub(crate) fn staged_len(&self) -> usize {
        self.staged.len()
    }
}

#[async_trait::async_trait]
impl<T: Entity> EntryStore<T> for SqliteEntries<T> {
    fn add(&mut self, entity: T) -> Result<Entry<T>> {
        // Duplicate detection is the backend's responsibility; staging
        // always appends.
        let entry = Entry::new(entity.clone());
        self.staged.push(Staged::Insert(entity));
        Ok(entry)
    }

    fn remove(&mut self, entity: &T) -> Result<Entry<T>> {
        if let Some(row) = self.locate(entity)? {
            if self.staged_delete_exists(row) {
                // Already leaving the set in this flush.
                return Err(StratumError::NotPresent);
            }
            // Drop a staged update pointing at the same row; the delete
            // supersedes it.
            self.staged
                .retain(|op| !matches!(op, Staged::Update { row: staged, .. } if staged.id == row.id));
            self.staged.push(Staged::Delete {
                row,
                entity: entity.clone(),
            });
            return Ok(Entry::new(entity.clone()));
        }
        // A not-yet-flushed insert can still be cancelled.
        if let Some(pos) = self.staged_insert_position(entity) {
            self.staged.remove(pos);
            return Ok(Entry::new(entity.clone()));
        }
        Err(StratumError::NotPresent)
    }

    fn update(&mut self, entity: T) -> Result<Entry<T>> {
        if let Some(row) = self.locate(&entity)? {
            if self.staged_delete_exists(row) {
                return Err(StratumError::NotPresent);
            }
            // Re-staging an update to the same row replaces the earlier
            // payload instead of racing its own version bump.
            if let Some(existing) = self.staged.iter_mut().find(
                |op| matches!(op, Staged::Update { row: staged, .. } if staged.id == row.id),
            ) {
                *existing = Staged::Update {
                    row,
                    entity: entity.clone(),
                };
            } else {
                self.staged.push(Staged::Update {
                    row,
                    entity: entity.clone(),
                });
            }
            return Ok(Entry::new(entity));
        }
        if let Some(pos) = self.staged_insert_position(&entity) {
            self.staged[pos] = Staged::Insert(entity.clone());
            return Ok(Entry::new(entity));
        }
        Err(StratumError::NotPresent)
    }

    fn scan(&self) -> Result<Vec<T>> {
        Ok(self.rows()?.into_iter().map(|(_, entity)| entity).collect())
    }

    fn select_text(&self) -> Option<String> {
        Some(self.select_sql())
    }
}

impl<T: Entity> AnyStore for SqliteEntries<T> {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn flush(&mut self) -> Result<usize> {
        if self.staged.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock().unwrap();
        Self::ensure_table(&conn, self.table)
            .map_err(|e| StratumError::operation("save_changes", None, e))?;
        let mut affected = 0usize;
        let mut conflicts: Vec<ConcurrentUpdateItem> = Vec::new();

        for op in &self.staged {
            match op {
                Staged::Insert(entity) => {
                    let body = serde_json::to_string(entity)
                        .map_err(|e| StratumError::operation("save_changes", None, e))?;
                    conn.execute(
                        &format!("INSERT INTO {} (body, version) VALUES (?1, 1)", self.table),
                        params![body],
                    )
                    .map_err(|e| StratumError::operation("save_changes", None, e))?;
                    affected += 1;
                }
                Staged::Update { row, entity } => {
                    let body = serde_json::to_string(entity)
                        .map_err(|e| StratumError::operation("save_changes", None, e))?;
                    let changed = conn
                        .execute(
                            &format!(
                                "UPDATE {} SET body = ?1, version = version + 1
                                 WHERE id = ?2 AND version = ?3",
                                self.table
                            ),
                            params![body, row.id, row.version],
                        )
                        .map_err(|e| StratumError::operation("save_changes", None, e))?;
                    if changed == 0 {
                        conflicts.push(self.conflict_item(&conn, *row, entity)?);
                    } else {
                        affected += changed;
                    }
                }
                Staged::Delete { row, entity } => {
                    let changed = conn
                        .execute(
                            &format!("DELETE FROM {} WHERE id = ?1 AND version = ?2", self.table),
                            params![row.id, row.version],
                        )
                        .map_err(|e| StratumError::operation("save_changes", None, e))?;
                    if changed == 0 {
                        conflicts.push(self.conflict_item(&conn, *row, entity)?);
                    } else {
                        affected += changed;
                    }
                }
            }
        }

        if !conflicts.is_empty() {
            tracing::warn!(
                table = self.table,
                conflicts = conflicts.len(),
                "optimistic concurrency conflict during flush"
            );
            return Err(StratumError::ConcurrentUpdate { items: conflicts });
        }
        Ok(affected)
    }

    fn clear_staged(&mut self) {
        self.staged.clear();
    }

    fn boxed_clone(&self) -> Box<dyn AnyStore> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqliteConfig;
    use crate::store::SqliteBackend;
    use serde::{Deserialize, Serialize};
    use stratum_core::Backend;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Character {
        id: u64,
        first_name: String,
        last_name: String,
    }

    // Identity equality: two characters are the same record when their
    // ids match, whatever the name fields say.
    impl PartialEq for Character {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl Entity for Character {
        fn store_name() -> &'static str {
            "characters"
        }
    }

    fn mickey() -> Character {
        Character {
            id: 1,
            first_name: "Mickey".into(),
            last_name: "Mouse".into(),
        }
    }

    fn open_store() -> (SqliteEntries<Character>, SqliteBackend, TempDir) {
        let temp = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(SqliteConfig::new(temp.path().join("test.db"))).unwrap();
        let store = backend.open_store::<Character>().unwrap();
        (store, backend, temp)
    }

    #[test]
    fn add_stages_without_writing() {
        let (mut store, _backend, _temp) = open_store();
        store.add(mickey()).unwrap();
        assert_eq!(store.staged_len(), 1);
        assert!(store.scan().unwrap().is_empty());
    }

    #[test]
    fn flush_inserts_and_clear_staged_resets() {
        let (mut store, _backend, _temp) = open_store();
        store.add(mickey()).unwrap();
        assert_eq!(store.flush().unwrap(), 1);
        store.clear_staged();
        assert_eq!(store.staged_len(), 0);
        assert_eq!(store.scan().unwrap(), vec![mickey()]);
    }

    #[test]
    fn remove_of_absent_entity_is_not_present() {
        let (mut store, _backend, _temp) = open_store();
        assert!(matches!(
            store.remove(&mickey()),
            Err(StratumError::NotPresent)
        ));
    }

    #[test]
    fn remove_cancels_staged_insert() {
        let (mut store, _backend, _temp) = open_store();
        store.add(mickey()).unwrap();
        store.remove(&mickey()).unwrap();
        assert_eq!(store.staged_len(), 0);
        assert_eq!(store.flush().unwrap(), 0);
    }

    #[test]
    fn update_replaces_row_body() {
        let (mut store, _backend, _temp) = open_store();
        store.add(mickey()).unwrap();
        store.flush().unwrap();
        store.clear_staged();

        let mut renamed = mickey();
        renamed.last_name = "Mause".into();
        store.update(renamed.clone()).unwrap();
        assert_eq!(store.flush().unwrap(), 1);
        store.clear_staged();

        let stored = store.scan().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].last_name, "Mause");
    }

    #[test]
    fn double_update_before_flush_coalesces() {
        let (mut store, _backend, _temp) = open_store();
        store.add(mickey()).unwrap();
        store.flush().unwrap();
        store.clear_staged();

        let mut first = mickey();
        first.last_name = "A".into();
        store.update(first).unwrap();
        let mut second = mickey();
        second.last_name = "B".into();
        store.update(second).unwrap();

        assert_eq!(store.staged_len(), 1);
        assert_eq!(store.flush().unwrap(), 1);
        store.clear_staged();
        assert_eq!(store.scan().unwrap()[0].last_name, "B");
    }

    #[test]
    fn stale_update_reports_conflict_with_both_sides() {
        let (mut store, backend, _temp) = open_store();
        store.add(mickey()).unwrap();
        store.flush().unwrap();
        store.clear_staged();

        let mut ours = mickey();
        ours.last_name = "Ours".into();
        store.update(ours).unwrap();

        // A second writer on the same database wins the race first.
        let mut rival = backend.open_store::<Character>().unwrap();
        let mut theirs = mickey();
        theirs.last_name = "Theirs".into();
        rival.update(theirs).unwrap();
        rival.flush().unwrap();
        rival.clear_staged();

        match store.flush() {
            Err(StratumError::ConcurrentUpdate { items }) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].attempted["last_name"], "Ours");
                let stored = items[0].stored.as_ref().unwrap();
                assert_eq!(stored["last_name"], "Theirs");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn conflict_after_concurrent_delete_has_no_stored_side() {
        let (mut store, backend, _temp) = open_store();
        store.add(mickey()).unwrap();
        store.flush().unwrap();
        store.clear_staged();

        let mut ours = mickey();
        ours.last_name = "Ours".into();
        store.update(ours).unwrap();

        let mut rival = backend.open_store::<Character>().unwrap();
        rival.remove(&mickey()).unwrap();
        rival.flush().unwrap();
        rival.clear_staged();

        match store.flush() {
            Err(StratumError::ConcurrentUpdate { items }) => {
                assert_eq!(items.len(), 1);
                assert!(items[0].stored.is_none());
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
