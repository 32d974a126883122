use chrono::TimeDelta;

use crate::error::LockError;
use crate::types::{
    CheckResponse, LockOptions, LockRequest, LockResponse, UnlockOptions, UnlockRequest,
    UnlockResponse,
};

/// The contract every lock backend implements.
///
/// Lock rules:
/// * A free lock is taken (`Ok`).
/// * The current signee always renews, overwriting level and expiry (`Renewed`).
/// * Another signee takes it over with a strictly higher level, or once it has
///   expired (`Transferred`, with the previous signee).
/// * Anything else fails with `LockError::Forbidden` and changes nothing.
///
/// Unlock rules: a missing lock answers `NoLock`, the owner releases it (`Ok`),
/// anyone else gets `LockError::Forbidden`.
pub trait LockService: Send + Sync {
    fn lock(
        &self,
        req: &LockRequest,
        opts: Option<&LockOptions>,
    ) -> Result<LockResponse, LockError>;

    fn unlock(
        &self,
        req: &UnlockRequest,
        opts: Option<&UnlockOptions>,
    ) -> Result<UnlockResponse, LockError>;

    /// Current owner and level, or `LockError::NotFound`.
    ///
    /// Read-only and not atomic with concurrent lock/unlock calls.
    #[deprecated(note = "read-only snapshot, not atomic with lock/unlock")]
    fn check(&self, signature: &str) -> Result<CheckResponse, LockError>;
}

/// Debug controls used by the scenario harness.
pub trait LockServiceExt: LockService {
    /// Replace the default lease duration. Negative values produce leases that
    /// are already expired.
    fn set_duration(&self, duration: TimeDelta);

    fn duration(&self) -> TimeDelta;

    /// Reclaim storage for rows past their TTL hint. Backends without one do nothing.
    fn purge_expired(&self) -> Result<usize, LockError> {
        Ok(0)
    }
}
