//! A process-local `LockService`.
//!
//! Two levels of mutual exclusion stand in for the store's conditional write:
//! a reader/writer lock over the set of signatures (insert and delete take it
//! exclusively) and a mutex per record (field updates). Lookups take the table
//! lock only briefly, so work on one signature never blocks another.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::TimeDelta;
use parking_lot::{Mutex, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::error::LockError;
use crate::infrastructure::{LockService, LockServiceExt};
use crate::protocol::{LockProtocol, LockVerdict, UnlockVerdict};
use crate::types::{
    CheckResponse, LockOptions, LockRecord, LockRequest, LockResponse, ServiceOptions,
    UnlockOptions, UnlockRequest, UnlockResponse,
};

struct Slot {
    record: LockRecord,
    // Set under the slot mutex when the slot leaves the table. A caller that
    // looked the slot up earlier must start over.
    removed: bool,
}

type SharedSlot = Arc<Mutex<Slot>>;

pub struct InMemoryLockService {
    options: RwLock<ServiceOptions>,
    clock: Arc<dyn Clock>,
    records: RwLock<HashMap<String, SharedSlot>>,
}

impl InMemoryLockService {
    pub fn new(options: ServiceOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    pub fn with_clock(options: ServiceOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            options: RwLock::new(options),
            clock,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of signatures currently held (expired leases included).
    pub fn held_count(&self) -> usize {
        self.records.read().len()
    }

    /// Copies of every held record.
    pub fn records(&self) -> Vec<LockRecord> {
        let slots: Vec<SharedSlot> = self.records.read().values().cloned().collect();
        slots
            .iter()
            .filter_map(|slot| {
                let slot = slot.lock();
                (!slot.removed).then(|| slot.record.clone())
            })
            .collect()
    }

    fn find(&self, signature: &str) -> Option<SharedSlot> {
        self.records.read().get(signature).cloned()
    }

    /// Apply the held-state rules under the slot's own lock.
    ///
    /// `None` means the slot was removed after it was looked up.
    fn lock_slot(
        slot: &SharedSlot,
        req: &LockRequest,
        verdict: impl FnOnce(&LockRecord) -> LockVerdict,
    ) -> Option<Result<LockResponse, LockError>> {
        let mut slot = slot.lock();
        if slot.removed {
            return None;
        }
        let outcome = match verdict(&slot.record) {
            LockVerdict::Grant { record, response } => {
                slot.record = record;
                Ok(response)
            }
            LockVerdict::Deny => Err(LockError::Forbidden),
        };
        tracing::debug!(
            signature = %req.signature,
            signee = %req.signee,
            holder = %slot.record.signee,
            granted = outcome.is_ok(),
            "In-memory lock decided"
        );
        Some(outcome)
    }
}

impl LockService for InMemoryLockService {
    fn lock(
        &self,
        req: &LockRequest,
        opts: Option<&LockOptions>,
    ) -> Result<LockResponse, LockError> {
        req.validate()?;

        let now = self.clock.now();
        let expires_at = self.options.read().expires_at(opts, now);
        let decide = |held: &LockRecord| LockProtocol::decide_lock(Some(held), req, now, expires_at);

        loop {
            // Common case: the record exists, only its own lock is needed.
            if let Some(slot) = self.find(&req.signature) {
                match Self::lock_slot(&slot, req, &decide) {
                    Some(outcome) => return outcome,
                    None => continue,
                }
            }

            let mut records = self.records.write();
            // Someone may have inserted it since the read above.
            if let Some(slot) = records.get(&req.signature).cloned() {
                drop(records);
                match Self::lock_slot(&slot, req, &decide) {
                    Some(outcome) => return outcome,
                    None => continue,
                }
            }

            let LockVerdict::Grant { record, response } =
                LockProtocol::decide_lock(None, req, now, expires_at)
            else {
                return Err(LockError::Forbidden);
            };
            records.insert(
                req.signature.clone(),
                Arc::new(Mutex::new(Slot {
                    record,
                    removed: false,
                })),
            );
            tracing::debug!(signature = %req.signature, signee = %req.signee, "In-memory lock created");
            return Ok(response);
        }
    }

    fn unlock(
        &self,
        req: &UnlockRequest,
        _opts: Option<&UnlockOptions>,
    ) -> Result<UnlockResponse, LockError> {
        req.validate()?;

        let Some(slot) = self.find(&req.signature) else {
            return Ok(UnlockResponse::no_lock());
        };
        {
            let slot = slot.lock();
            if slot.removed {
                return Ok(UnlockResponse::no_lock());
            }
            if LockProtocol::decide_unlock(Some(&slot.record), req) == UnlockVerdict::Deny {
                return Err(LockError::Forbidden);
            }
        }

        // Ownership may have changed since the check above; verify again
        // while nobody else can insert or delete.
        let mut records = self.records.write();
        let Some(current) = records.get(&req.signature).cloned() else {
            return Ok(UnlockResponse::no_lock());
        };
        let mut held = current.lock();
        let verdict = LockProtocol::decide_unlock(Some(&held.record), req);
        if verdict == UnlockVerdict::Release {
            held.removed = true;
            records.remove(&req.signature);
        }
        tracing::debug!(signature = %req.signature, signee = %req.signee, ?verdict, "In-memory unlock decided");
        verdict.into_result()
    }

    fn check(&self, signature: &str) -> Result<CheckResponse, LockError> {
        if signature.is_empty() {
            return Err(LockError::BadRequest("signature is required".into()));
        }
        let slot = self.find(signature).ok_or(LockError::NotFound)?;
        let slot = slot.lock();
        if slot.removed {
            return Err(LockError::NotFound);
        }
        Ok(CheckResponse {
            signee: slot.record.signee.clone(),
            level: slot.record.level,
        })
    }
}

impl LockServiceExt for InMemoryLockService {
    fn set_duration(&self, duration: TimeDelta) {
        self.options.write().duration = duration;
    }

    fn duration(&self) -> TimeDelta {
        self.options.read().duration
    }
}
