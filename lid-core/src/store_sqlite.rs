//! SQLite-backed `ConditionalStore`.
//! Lock rows live in a database file that any number of processes can share.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! lid-core = { path = "../lid-core", features = ["sqlite"] }
//! ```
//!
//! Each conditional write is a single `BEGIN IMMEDIATE` transaction: the prior
//! row is read, then an upsert (or delete) whose `WHERE` clause is the compiled
//! condition is applied. SQLite serializes writers on the database, so the
//! condition and the write are atomic across processes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};

use crate::condition::Condition;
use crate::error::StoreError;
use crate::store::{ConditionalStore, CreateOutcome, TableProvisioner, TableStatus};
use crate::types::{EXPIRES_ATTR, LEVEL_ATTR, SIGNATURE_ATTR, SIGNEE_ATTR, StoredRow, TTL_ATTR};

const CATALOG_TABLE: &str = "lid_tables";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_IDLE_CONNECTIONS: usize = 8;

/// A conditional store on a SQLite database file.
///
/// Uses WAL mode so readers never wait on the writer.
pub struct SqliteStore {
    path: PathBuf,
    // Idle connections; the mutex is only held to check one out or back in.
    idle: Mutex<Vec<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            idle: Mutex::new(Vec::new()),
        };
        store.with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {CATALOG_TABLE} (
                    name        TEXT PRIMARY KEY,
                    ttl_enabled INTEGER NOT NULL DEFAULT 0
                );"
            ))?;
            Ok(())
        })?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let pooled = self.idle.lock().pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => self.connect()?,
        };
        let result = f(&mut conn);
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
        result
    }

    fn select_row(conn: &Connection, table: &str, signature: &str) -> Result<Option<StoredRow>, StoreError> {
        let sql = format!(
            "SELECT {SIGNATURE_ATTR}, {SIGNEE_ATTR}, {LEVEL_ATTR}, {EXPIRES_ATTR}, {TTL_ATTR}
             FROM {table} WHERE {SIGNATURE_ATTR} = ?1"
        );
        let row = conn
            .query_row(&sql, params![signature], |row| {
                Ok(StoredRow {
                    signature: row.get(0)?,
                    signee: row.get(1)?,
                    level: row.get(2)?,
                    expires_epoch_nanos: row.get(3)?,
                    ttl_epoch_seconds: row.get(4)?,
                })
            })
            .optional()?;
        Ok(row)
    }
}

/// Double-quoted identifier for a table name following DynamoDB naming rules.
fn quote_table(table: &str) -> Result<String, StoreError> {
    let valid_chars = table
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    let reserved = table == CATALOG_TABLE || table.to_ascii_lowercase().starts_with("sqlite_");
    if !(3..=255).contains(&table.len()) || !valid_chars || reserved {
        return Err(StoreError::InvalidTable(table.to_string()));
    }
    Ok(format!("\"{table}\""))
}

/// Render the row clauses of a condition as SQL over `table`'s existing row.
///
/// Placeholders are numbered from `first_param`. `NotExists` is left out: it is
/// decided from the prior-row read in the same transaction.
fn condition_sql(table: &str, condition: &Condition, first_param: usize) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    for clause in condition.row_clauses() {
        let n = first_param + values.len();
        match clause {
            Condition::SigneeEquals(signee) => {
                clauses.push(format!("{table}.{SIGNEE_ATTR} = ?{n}"));
                values.push(Value::Text(signee.clone()));
            }
            Condition::LevelLessThan(level) => {
                clauses.push(format!("{table}.{LEVEL_ATTR} < ?{n}"));
                values.push(Value::Integer(*level));
            }
            Condition::ExpiresBefore(nanos) => {
                clauses.push(format!("{table}.{EXPIRES_ATTR} < ?{n}"));
                values.push(Value::Integer(*nanos));
            }
            Condition::NotExists | Condition::Or(_) => {}
        }
    }
    if clauses.is_empty() {
        return ("0".to_string(), values);
    }
    (format!("({})", clauses.join(" OR ")), values)
}

impl ConditionalStore for SqliteStore {
    fn put_item(
        &self,
        table: &str,
        row: &StoredRow,
        condition: &Condition,
    ) -> Result<Option<StoredRow>, StoreError> {
        let quoted = quote_table(table)?;
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let prior = Self::select_row(&tx, &quoted, &row.signature)?;
            if prior.is_none() && !condition.allows_absent() {
                return Err(StoreError::ConditionFailed);
            }

            let (guard, guard_values) = condition_sql(&quoted, condition, 6);
            let sql = format!(
                "INSERT INTO {quoted} ({SIGNATURE_ATTR}, {SIGNEE_ATTR}, {LEVEL_ATTR}, {EXPIRES_ATTR}, {TTL_ATTR})
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT({SIGNATURE_ATTR}) DO UPDATE SET
                    {SIGNEE_ATTR} = excluded.{SIGNEE_ATTR},
                    {LEVEL_ATTR} = excluded.{LEVEL_ATTR},
                    {EXPIRES_ATTR} = excluded.{EXPIRES_ATTR},
                    {TTL_ATTR} = excluded.{TTL_ATTR}
                 WHERE {guard}"
            );
            let mut values = vec![
                Value::Text(row.signature.clone()),
                Value::Text(row.signee.clone()),
                Value::Integer(row.level),
                Value::Integer(row.expires_epoch_nanos),
                row.ttl_epoch_seconds.map_or(Value::Null, Value::Integer),
            ];
            values.extend(guard_values);

            if tx.execute(&sql, params_from_iter(values))? == 0 {
                return Err(StoreError::ConditionFailed);
            }
            tx.commit()?;
            Ok(prior)
        })
    }

    fn delete_item(
        &self,
        table: &str,
        signature: &str,
        condition: &Condition,
    ) -> Result<Option<StoredRow>, StoreError> {
        let quoted = quote_table(table)?;
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(prior) = Self::select_row(&tx, &quoted, signature)? else {
                return if condition.allows_absent() {
                    Ok(None)
                } else {
                    Err(StoreError::ConditionFailed)
                };
            };

            let (guard, guard_values) = condition_sql(&quoted, condition, 2);
            let sql = format!("DELETE FROM {quoted} WHERE {SIGNATURE_ATTR} = ?1 AND {guard}");
            let mut values = vec![Value::Text(signature.to_string())];
            values.extend(guard_values);

            if tx.execute(&sql, params_from_iter(values))? == 0 {
                return Err(StoreError::ConditionFailed);
            }
            tx.commit()?;
            Ok(Some(prior))
        })
    }

    fn get_item(&self, table: &str, signature: &str) -> Result<Option<StoredRow>, StoreError> {
        let quoted = quote_table(table)?;
        self.with_conn(|conn| Self::select_row(conn, &quoted, signature))
    }

    fn purge_expired(&self, table: &str, now_epoch_seconds: i64) -> Result<usize, StoreError> {
        let quoted = quote_table(table)?;
        self.with_conn(|conn| {
            let enabled: Option<bool> = conn
                .query_row(
                    &format!("SELECT ttl_enabled FROM {CATALOG_TABLE} WHERE name = ?1"),
                    params![table],
                    |row| row.get(0),
                )
                .optional()?;
            match enabled {
                None => Err(StoreError::TableNotFound(table.to_string())),
                Some(false) => Ok(0),
                Some(true) => Ok(conn.execute(
                    &format!("DELETE FROM {quoted} WHERE {TTL_ATTR} IS NOT NULL AND {TTL_ATTR} < ?1"),
                    params![now_epoch_seconds],
                )?),
            }
        })
    }
}

impl TableProvisioner for SqliteStore {
    fn create_table(&self, table: &str) -> Result<CreateOutcome, StoreError> {
        let quoted = quote_table(table)?;
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let known = tx
                .query_row(
                    &format!("SELECT 1 FROM {CATALOG_TABLE} WHERE name = ?1"),
                    params![table],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if known {
                return Ok(CreateOutcome::AlreadyExists);
            }
            tx.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {quoted} (
                    {SIGNATURE_ATTR} TEXT PRIMARY KEY NOT NULL,
                    {SIGNEE_ATTR}    TEXT NOT NULL,
                    {LEVEL_ATTR}     INTEGER NOT NULL DEFAULT 0,
                    {EXPIRES_ATTR}   INTEGER NOT NULL,
                    {TTL_ATTR}       INTEGER
                );"
            ))?;
            tx.execute(
                &format!("INSERT INTO {CATALOG_TABLE} (name, ttl_enabled) VALUES (?1, 0)"),
                params![table],
            )?;
            tx.commit()?;
            Ok(CreateOutcome::Created)
        })
    }

    fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        let quoted = quote_table(table)?;
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {quoted};"))?;
            tx.execute(
                &format!("DELETE FROM {CATALOG_TABLE} WHERE name = ?1"),
                params![table],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn table_status(&self, table: &str) -> Result<TableStatus, StoreError> {
        quote_table(table)?;
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    &format!("SELECT 1 FROM {CATALOG_TABLE} WHERE name = ?1"),
                    params![table],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(if found.is_some() {
                TableStatus::Ready
            } else {
                TableStatus::Missing
            })
        })
    }

    fn enable_time_to_live(&self, table: &str) -> Result<(), StoreError> {
        quote_table(table)?;
        self.with_conn(|conn| {
            let updated = conn.execute(
                &format!("UPDATE {CATALOG_TABLE} SET ttl_enabled = 1 WHERE name = ?1"),
                params![table],
            )?;
            if updated == 0 {
                return Err(StoreError::TableNotFound(table.to_string()));
            }
            Ok(())
        })
    }
}
