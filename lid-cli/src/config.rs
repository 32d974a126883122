use std::path::PathBuf;

use clap::Args;

use lid_core::LidClient;
use lid_core::error::LockError;
use lid_core::types::{ServiceOptions, duration_from_millis, duration_from_secs};

/// Where locks live and how long they last.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Storage backend: "memory" or "sqlite:<path>"
    #[arg(long, default_value = "memory", env = "LID_STORAGE")]
    pub storage: String,

    /// Lock table name (sqlite backend)
    #[arg(long, default_value = "lid_locks", env = "LID_TABLE")]
    pub table: String,

    /// Lease duration in milliseconds
    #[arg(long, default_value_t = 30_000, env = "LID_DURATION_MS")]
    pub duration_ms: i64,

    /// Storage TTL hint in seconds; enables passive expiry
    #[arg(long, env = "LID_TTL_SECS")]
    pub ttl_secs: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Sqlite(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown storage backend '{0}', use 'memory' or 'sqlite:<path>'")]
    UnknownBackend(String),
    #[error("sqlite storage requested but the `sqlite` feature is not enabled")]
    SqliteDisabled,
    #[error("lease duration must be positive, got {0} ms")]
    InvalidDuration(i64),
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl StorageArgs {
    pub fn backend(&self) -> Result<Backend, ConfigError> {
        if self.storage == "memory" {
            return Ok(Backend::Memory);
        }
        match self.storage.strip_prefix("sqlite:") {
            Some(path) if !path.is_empty() => Ok(Backend::Sqlite(PathBuf::from(path))),
            _ => Err(ConfigError::UnknownBackend(self.storage.clone())),
        }
    }

    pub fn backend_name(&self) -> String {
        match self.backend() {
            Ok(Backend::Memory) => "memory".to_string(),
            Ok(Backend::Sqlite(_)) => "sqlite".to_string(),
            Err(_) => "unknown".to_string(),
        }
    }

    pub fn service_options(&self) -> Result<ServiceOptions, ConfigError> {
        if self.duration_ms <= 0 {
            return Err(ConfigError::InvalidDuration(self.duration_ms));
        }
        let mut options =
            ServiceOptions::new(duration_from_millis(self.duration_ms)?).with_table(&self.table);
        if let Some(secs) = self.ttl_secs.filter(|s| *s > 0) {
            options = options.with_time_to_live(duration_from_secs(secs)?);
        }
        Ok(options)
    }

    /// Open the configured backend, provisioning its table if needed.
    pub fn open_client(&self) -> Result<LidClient, ConfigError> {
        let options = self.service_options()?;
        match self.backend()? {
            Backend::Memory => {
                tracing::info!("Storage backend: in-memory (locks will not persist)");
                Ok(LidClient::in_memory(options))
            }
            Backend::Sqlite(path) => open_sqlite(path, options),
        }
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(path: PathBuf, options: ServiceOptions) -> Result<LidClient, ConfigError> {
    tracing::info!(path = %path.display(), table = %options.table, "Storage backend: SQLite");
    let store = lid_core::store_sqlite::SqliteStore::open(&path).map_err(LockError::from)?;
    Ok(LidClient::conditional(std::sync::Arc::new(store), options)?)
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_path: PathBuf, _options: ServiceOptions) -> Result<LidClient, ConfigError> {
    Err(ConfigError::SqliteDisabled)
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn args(storage: &str) -> StorageArgs {
        StorageArgs {
            storage: storage.to_string(),
            table: "lid_locks".to_string(),
            duration_ms: 30_000,
            ttl_secs: None,
        }
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!(args("memory").backend().unwrap(), Backend::Memory);
        assert_eq!(
            args("sqlite:/tmp/lid.db").backend().unwrap(),
            Backend::Sqlite(PathBuf::from("/tmp/lid.db"))
        );
        assert!(matches!(args("sqlite:").backend(), Err(ConfigError::UnknownBackend(_))));
        assert!(matches!(args("redis://x").backend(), Err(ConfigError::UnknownBackend(_))));
    }

    #[test]
    fn test_service_options() {
        let mut a = args("memory");
        a.ttl_secs = Some(90);
        let options = a.service_options().unwrap();
        assert_eq!(options.duration, TimeDelta::seconds(30));
        assert_eq!(options.time_to_live, Some(TimeDelta::seconds(90)));
        assert_eq!(options.table, "lid_locks");

        a.duration_ms = 0;
        assert!(matches!(a.service_options(), Err(ConfigError::InvalidDuration(0))));
    }

    #[test]
    fn test_out_of_range_ttl_is_rejected() {
        let mut a = args("memory");
        a.ttl_secs = Some(i64::MAX);
        assert!(matches!(
            a.service_options(),
            Err(ConfigError::Lock(LockError::BadRequest(_)))
        ));

        a.ttl_secs = None;
        a.duration_ms = i64::MAX;
        assert_eq!(a.service_options().unwrap().duration, TimeDelta::milliseconds(i64::MAX));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_invalid_table_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut a = args(&format!("sqlite:{}", dir.path().join("locks.db").display()));
        a.table = "x".to_string();
        assert!(matches!(a.open_client(), Err(ConfigError::Lock(_))));
    }
}
