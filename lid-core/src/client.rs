//! High-level client that validates requests and hands them to a backend.
//! The CLI server and the JS / Python bindings all go through this.

use std::sync::Arc;

use chrono::TimeDelta;

use crate::error::LockError;
use crate::infrastructure::{LockService, LockServiceExt};
use crate::infrastructure_conditional::ConditionalLockService;
use crate::infrastructure_in_memory::InMemoryLockService;
use crate::store::{ConditionalStore, TableProvisioner};
use crate::types::*;

/// The main entry point: one validated front over any backend.
#[derive(Clone)]
pub struct LidClient {
    service: Arc<dyn LockServiceExt>,
}

impl LidClient {
    pub fn new(service: Arc<dyn LockServiceExt>) -> Self {
        Self { service }
    }

    /// A client over a fresh process-local lock table.
    pub fn in_memory(options: ServiceOptions) -> Self {
        Self::new(Arc::new(InMemoryLockService::new(options)))
    }

    /// A client over a conditional store. Provisions the table first.
    pub fn conditional<S>(store: Arc<S>, options: ServiceOptions) -> Result<Self, LockError>
    where
        S: ConditionalStore + TableProvisioner + 'static,
    {
        let service = ConditionalLockService::new(store, options)?;
        Ok(Self::new(Arc::new(service)))
    }

    /// A client backed by SQLite at the given path.
    /// Locks persist across restarts and are shared with other processes.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite(path: &str, options: ServiceOptions) -> Result<Self, LockError> {
        let store = crate::store_sqlite::SqliteStore::open(path)?;
        Self::conditional(Arc::new(store), options)
    }

    pub fn service(&self) -> &Arc<dyn LockServiceExt> {
        &self.service
    }
}

impl LockService for LidClient {
    fn lock(
        &self,
        req: &LockRequest,
        opts: Option<&LockOptions>,
    ) -> Result<LockResponse, LockError> {
        if let Err(e) = req.validate() {
            tracing::debug!(error = %e, "Lock request rejected");
            return Err(e);
        }
        self.service.lock(req, opts)
    }

    fn unlock(
        &self,
        req: &UnlockRequest,
        opts: Option<&UnlockOptions>,
    ) -> Result<UnlockResponse, LockError> {
        if let Err(e) = req.validate() {
            tracing::debug!(error = %e, "Unlock request rejected");
            return Err(e);
        }
        self.service.unlock(req, opts)
    }

    #[allow(deprecated)]
    fn check(&self, signature: &str) -> Result<CheckResponse, LockError> {
        if signature.is_empty() {
            return Err(LockError::BadRequest("signature is required".into()));
        }
        self.service.check(signature)
    }
}

impl LockServiceExt for LidClient {
    fn set_duration(&self, duration: TimeDelta) {
        tracing::debug!(duration_ms = duration.num_milliseconds(), "Lease duration overridden");
        self.service.set_duration(duration);
    }

    fn duration(&self) -> TimeDelta {
        self.service.duration()
    }

    fn purge_expired(&self) -> Result<usize, LockError> {
        self.service.purge_expired()
    }
}
