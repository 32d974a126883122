//! A `LockService` over a store with atomic conditional writes.
//!
//! Each lock is one conditional put and each unlock one conditional delete.
//! The store evaluates the compiled rule and either applies the whole write or
//! nothing, so this side holds no locks across store I/O.

use std::sync::Arc;

use chrono::TimeDelta;
use parking_lot::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::condition::Condition;
use crate::error::{InfraError, LockError, StoreError};
use crate::infrastructure::{LockService, LockServiceExt};
use crate::provision;
use crate::store::{ConditionalStore, TableProvisioner};
use crate::types::{
    CheckResponse, LockOptions, LockRecord, LockRequest, LockResponse, ServiceOptions, StoredRow,
    UnlockOptions, UnlockRequest, UnlockResponse, to_epoch_nanos,
};

pub struct ConditionalLockService<S: ?Sized> {
    store: Arc<S>,
    table: String,
    options: RwLock<ServiceOptions>,
    clock: Arc<dyn Clock>,
}

pub struct ConditionalLockServiceBuilder<S: ?Sized> {
    store: Option<Arc<S>>,
    options: ServiceOptions,
    clock: Arc<dyn Clock>,
}

impl<S: ConditionalStore + TableProvisioner + ?Sized> ConditionalLockService<S> {
    pub fn builder(options: ServiceOptions) -> ConditionalLockServiceBuilder<S> {
        ConditionalLockServiceBuilder {
            store: None,
            options,
            clock: Arc::new(SystemClock),
        }
    }

    /// Shorthand for `builder(options).store(store).build()`.
    pub fn new(store: Arc<S>, options: ServiceOptions) -> Result<Self, LockError> {
        Self::builder(options).store(store).build()
    }
}

impl<S: ConditionalStore + TableProvisioner + ?Sized> ConditionalLockServiceBuilder<S> {
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration, then make sure the table exists and is ready.
    ///
    /// Configuration errors are reported before the store is touched.
    pub fn build(self) -> Result<ConditionalLockService<S>, LockError> {
        let store = self.store.ok_or(InfraError::MissingStore)?;
        if self.options.table.is_empty() {
            return Err(InfraError::MissingTable.into());
        }
        if self.options.duration.is_zero() {
            return Err(InfraError::MissingDuration.into());
        }

        let table = self.options.table.clone();
        provision::ensure_table(&*store, &table, self.options.time_to_live.is_some())?;

        Ok(ConditionalLockService {
            store,
            table,
            options: RwLock::new(self.options),
            clock: self.clock,
        })
    }
}

impl<S: ConditionalStore + ?Sized> ConditionalLockService<S> {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn store_error(&self, op: &'static str, err: StoreError) -> LockError {
        tracing::warn!(table = %self.table, op, error = %err, "Lock store request failed");
        err.into()
    }
}

impl<S: ConditionalStore + ?Sized> LockService for ConditionalLockService<S> {
    fn lock(
        &self,
        req: &LockRequest,
        opts: Option<&LockOptions>,
    ) -> Result<LockResponse, LockError> {
        req.validate()?;

        let now = self.clock.now();
        let (expires_at, ttl) = {
            let options = self.options.read();
            (options.expires_at(opts, now), options.ttl_epoch_seconds(opts, now))
        };
        let record = LockRecord::new(&req.signature, &req.signee, req.level, expires_at);
        let row = StoredRow::from_record(&record, ttl);
        let condition = Condition::acquire(req, to_epoch_nanos(now));

        let prior = match self.store.put_item(&self.table, &row, &condition) {
            Ok(prior) => prior,
            // Someone else holds a valid lock at an equal or higher level.
            Err(StoreError::ConditionFailed) => {
                tracing::debug!(signature = %req.signature, signee = %req.signee, "Lock condition failed");
                return Err(LockError::Forbidden);
            }
            Err(e) => return Err(self.store_error("put_item", e)),
        };

        let response = match prior {
            Some(prior) if !prior.signee.is_empty() => {
                if prior.signee == req.signee {
                    LockResponse::renewed()
                } else {
                    LockResponse::transferred(prior.signee)
                }
            }
            _ => LockResponse::ok(),
        };
        tracing::debug!(
            signature = %req.signature,
            signee = %req.signee,
            status = ?response.status,
            "Lock granted"
        );
        Ok(response)
    }

    fn unlock(
        &self,
        req: &UnlockRequest,
        _opts: Option<&UnlockOptions>,
    ) -> Result<UnlockResponse, LockError> {
        req.validate()?;

        let condition = Condition::release(req);
        match self.store.delete_item(&self.table, &req.signature, &condition) {
            Ok(Some(_)) => Ok(UnlockResponse::ok()),
            Ok(None) => Ok(UnlockResponse::no_lock()),
            Err(StoreError::ConditionFailed) => {
                tracing::debug!(signature = %req.signature, signee = %req.signee, "Unlock condition failed");
                Err(LockError::Forbidden)
            }
            Err(e) => Err(self.store_error("delete_item", e)),
        }
    }

    fn check(&self, signature: &str) -> Result<CheckResponse, LockError> {
        if signature.is_empty() {
            return Err(LockError::BadRequest("signature is required".into()));
        }
        match self.store.get_item(&self.table, signature) {
            Ok(Some(row)) if !row.signee.is_empty() => Ok(CheckResponse {
                signee: row.signee,
                level: row.level,
            }),
            Ok(_) => Err(LockError::NotFound),
            Err(e) => Err(self.store_error("get_item", e)),
        }
    }
}

impl<S: ConditionalStore + ?Sized> LockServiceExt for ConditionalLockService<S> {
    fn set_duration(&self, duration: TimeDelta) {
        self.options.write().duration = duration;
    }

    fn duration(&self) -> TimeDelta {
        self.options.read().duration
    }

    /// Remove rows whose `lttl` has passed. Only reclaims space; the lock
    /// rules never depend on it.
    fn purge_expired(&self) -> Result<usize, LockError> {
        let now = self.clock.now().timestamp();
        let purged = self
            .store
            .purge_expired(&self.table, now)
            .map_err(|e| self.store_error("purge_expired", e))?;
        tracing::debug!(table = %self.table, purged, "Passive expiry sweep");
        Ok(purged)
    }
}
