//! The contract a key-value store must offer to back `ConditionalLockService`.
//!
//! Every call names its table, as a DynamoDB request would. Implementations
//! must apply `put_item` and `delete_item` atomically with their condition and
//! must not hold any caller-visible lock across their own I/O.

use crate::condition::Condition;
use crate::error::StoreError;
use crate::types::StoredRow;

pub trait ConditionalStore: Send + Sync {
    /// Write the full row if `condition` holds. Returns the prior row, if any.
    ///
    /// Fails with `StoreError::ConditionFailed` and changes nothing otherwise.
    fn put_item(
        &self,
        table: &str,
        row: &StoredRow,
        condition: &Condition,
    ) -> Result<Option<StoredRow>, StoreError>;

    /// Delete the row for `signature` if `condition` holds. Returns the prior row, if any.
    fn delete_item(
        &self,
        table: &str,
        signature: &str,
        condition: &Condition,
    ) -> Result<Option<StoredRow>, StoreError>;

    /// Plain read, no consistency guarantee relative to concurrent writes.
    fn get_item(&self, table: &str, signature: &str) -> Result<Option<StoredRow>, StoreError>;

    /// Drop rows whose `lttl` is before `now_epoch_seconds`. Returns how many.
    fn purge_expired(&self, table: &str, now_epoch_seconds: i64) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// The table does not exist
    Missing,
    /// The table is being created
    Creating,
    /// The table is ready
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Table lifecycle, kept apart from the data path.
pub trait TableProvisioner: Send + Sync {
    fn create_table(&self, table: &str) -> Result<CreateOutcome, StoreError>;

    fn delete_table(&self, table: &str) -> Result<(), StoreError>;

    fn table_status(&self, table: &str) -> Result<TableStatus, StoreError>;

    /// Turn on the store's passive expiry for the `lttl` attribute.
    fn enable_time_to_live(&self, table: &str) -> Result<(), StoreError>;
}
