//! Bringing a lock table up (and down) before the service uses it.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{InfraError, LockError};
use crate::store::{CreateOutcome, TableProvisioner, TableStatus};

/// Overall deadline for a table to reach the wanted status.
pub const WAIT_DEADLINE: Duration = Duration::from_secs(120);
/// Pause between status polls.
pub const WAIT_INTERVAL: Duration = Duration::from_millis(10);

/// Poll `table_status` until it reports `wanted`, or fail with a timeout.
pub fn wait_for_status<P: TableProvisioner + ?Sized>(
    provisioner: &P,
    table: &str,
    wanted: TableStatus,
    deadline: Duration,
    interval: Duration,
) -> Result<(), LockError> {
    let started = Instant::now();
    loop {
        if provisioner.table_status(table)? == wanted {
            return Ok(());
        }
        if started.elapsed() >= deadline {
            return Err(InfraError::Timeout(deadline, table.to_string()).into());
        }
        thread::sleep(interval);
    }
}

/// Create the table if needed, wait for it to be ready, then enable TTL if asked.
///
/// A table that already exists counts as success.
pub fn ensure_table<P: TableProvisioner + ?Sized>(
    provisioner: &P,
    table: &str,
    time_to_live: bool,
) -> Result<(), LockError> {
    if provisioner.create_table(table)? == CreateOutcome::Created {
        tracing::info!(table, "Lock table created");
    }
    wait_for_status(provisioner, table, TableStatus::Ready, WAIT_DEADLINE, WAIT_INTERVAL)?;
    if time_to_live {
        provisioner.enable_time_to_live(table)?;
        tracing::info!(table, "Time to live enabled");
    }
    Ok(())
}

/// Delete the table and wait until it is gone. Destroys every lock in it.
pub fn drop_table<P: TableProvisioner + ?Sized>(provisioner: &P, table: &str) -> Result<(), LockError> {
    provisioner.delete_table(table)?;
    wait_for_status(provisioner, table, TableStatus::Missing, WAIT_DEADLINE, WAIT_INTERVAL)?;
    tracing::info!(table, "Lock table deleted");
    Ok(())
}
