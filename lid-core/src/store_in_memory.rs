//! An in-process conditional store.
//!
//! Behaves like a single-node key-value service: every request evaluates its
//! condition and applies its write under one table-wide critical section.
//! Useful for tests and for running the conditional backend without a server.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::condition::Condition;
use crate::error::StoreError;
use crate::store::{ConditionalStore, CreateOutcome, TableProvisioner, TableStatus};
use crate::types::StoredRow;

#[derive(Default)]
struct Table {
    rows: HashMap<String, StoredRow>,
    ttl_enabled: bool,
    // Status polls left before a freshly created table reports Ready
    creating_polls: u32,
}

#[derive(Default)]
pub struct InMemoryTableStore {
    tables: Mutex<HashMap<String, Table>>,
    creation_polls: u32,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newly created tables report `Creating` for this many status polls.
    pub fn with_creation_polls(mut self, polls: u32) -> Self {
        self.creation_polls = polls;
        self
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    fn with_table<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Table) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut tables = self.tables.lock();
        match tables.get_mut(table) {
            Some(t) => f(t),
            None => Err(StoreError::TableNotFound(table.to_string())),
        }
    }
}

impl ConditionalStore for InMemoryTableStore {
    fn put_item(
        &self,
        table: &str,
        row: &StoredRow,
        condition: &Condition,
    ) -> Result<Option<StoredRow>, StoreError> {
        self.with_table(table, |t| {
            if !condition.evaluate(t.rows.get(&row.signature)) {
                return Err(StoreError::ConditionFailed);
            }
            Ok(t.rows.insert(row.signature.clone(), row.clone()))
        })
    }

    fn delete_item(
        &self,
        table: &str,
        signature: &str,
        condition: &Condition,
    ) -> Result<Option<StoredRow>, StoreError> {
        self.with_table(table, |t| {
            if !condition.evaluate(t.rows.get(signature)) {
                return Err(StoreError::ConditionFailed);
            }
            Ok(t.rows.remove(signature))
        })
    }

    fn get_item(&self, table: &str, signature: &str) -> Result<Option<StoredRow>, StoreError> {
        self.with_table(table, |t| Ok(t.rows.get(signature).cloned()))
    }

    fn purge_expired(&self, table: &str, now_epoch_seconds: i64) -> Result<usize, StoreError> {
        self.with_table(table, |t| {
            if !t.ttl_enabled {
                return Ok(0);
            }
            let before = t.rows.len();
            t.rows
                .retain(|_, row| !matches!(row.ttl_epoch_seconds, Some(ttl) if ttl < now_epoch_seconds));
            Ok(before - t.rows.len())
        })
    }
}

impl TableProvisioner for InMemoryTableStore {
    fn create_table(&self, table: &str) -> Result<CreateOutcome, StoreError> {
        let mut tables = self.tables.lock();
        if tables.contains_key(table) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        tables.insert(
            table.to_string(),
            Table {
                creating_polls: self.creation_polls,
                ..Table::default()
            },
        );
        Ok(CreateOutcome::Created)
    }

    fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        self.tables.lock().remove(table);
        Ok(())
    }

    fn table_status(&self, table: &str) -> Result<TableStatus, StoreError> {
        let mut tables = self.tables.lock();
        let Some(t) = tables.get_mut(table) else {
            return Ok(TableStatus::Missing);
        };
        if t.creating_polls > 0 {
            t.creating_polls -= 1;
            return Ok(TableStatus::Creating);
        }
        Ok(TableStatus::Ready)
    }

    fn enable_time_to_live(&self, table: &str) -> Result<(), StoreError> {
        self.with_table(table, |t| {
            t.ttl_enabled = true;
            Ok(())
        })
    }
}
