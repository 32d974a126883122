//! The acquisition / release rules, as pure functions.
//!
//! Both backends realize exactly these transitions; only their atomicity
//! mechanism differs.

use chrono::{DateTime, Utc};

use crate::error::LockError;
use crate::types::{LockRecord, LockRequest, LockResponse, UnlockRequest, UnlockResponse};

/// What a `lock` call does to one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockVerdict {
    /// Write `record` and answer `response`.
    Grant {
        record: LockRecord,
        response: LockResponse,
    },
    /// Leave the current record untouched.
    Deny,
}

impl LockVerdict {
    pub fn into_result(self) -> Result<LockResponse, LockError> {
        match self {
            LockVerdict::Grant { response, .. } => Ok(response),
            LockVerdict::Deny => Err(LockError::Forbidden),
        }
    }
}

/// What an `unlock` call does to one signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockVerdict {
    /// Nothing to release; succeeds.
    NoLock,
    /// Delete the record.
    Release,
    /// Owned by someone else; leave it.
    Deny,
}

impl UnlockVerdict {
    pub fn into_result(self) -> Result<UnlockResponse, LockError> {
        match self {
            UnlockVerdict::NoLock => Ok(UnlockResponse::no_lock()),
            UnlockVerdict::Release => Ok(UnlockResponse::ok()),
            UnlockVerdict::Deny => Err(LockError::Forbidden),
        }
    }
}

pub struct LockProtocol;

impl LockProtocol {
    /// Decide a lock request against the current record (if any).
    ///
    /// `expires_at` is the expiry the new record gets when granted.
    pub fn decide_lock(
        current: Option<&LockRecord>,
        req: &LockRequest,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> LockVerdict {
        let record = LockRecord::new(&req.signature, &req.signee, req.level, expires_at);

        let Some(held) = current else {
            return LockVerdict::Grant {
                record,
                response: LockResponse::ok(),
            };
        };

        // The owner can never be locked out of its own lock.
        if held.signee == req.signee {
            return LockVerdict::Grant {
                record,
                response: LockResponse::renewed(),
            };
        }

        if req.level > held.level || held.is_expired(now) {
            return LockVerdict::Grant {
                record,
                response: LockResponse::transferred(&held.signee),
            };
        }

        LockVerdict::Deny
    }

    /// Decide an unlock request against the current record (if any).
    pub fn decide_unlock(current: Option<&LockRecord>, req: &UnlockRequest) -> UnlockVerdict {
        match current {
            None => UnlockVerdict::NoLock,
            Some(held) if held.signee == req.signee => UnlockVerdict::Release,
            Some(_) => UnlockVerdict::Deny,
        }
    }
}
