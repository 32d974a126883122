use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockStatus {
    /// Someone else owns the lock
    Failed,
    /// The lock was free, now I own it
    Ok,
    /// Someone else held it (outranked or expired), now I own it
    Transferred,
    /// I already owned it and still do
    Renewed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockResponse {
    pub status: LockStatus,
    /// Former owner when the lock was transferred
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_signee: Option<String>,
}

impl LockResponse {
    pub fn ok() -> Self {
        Self {
            status: LockStatus::Ok,
            previous_signee: None,
        }
    }

    pub fn renewed() -> Self {
        Self {
            status: LockStatus::Renewed,
            previous_signee: None,
        }
    }

    pub fn transferred(previous: impl Into<String>) -> Self {
        Self {
            status: LockStatus::Transferred,
            previous_signee: Some(previous.into()),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: LockStatus::Failed,
            previous_signee: None,
        }
    }

    /// True if the requester holds the lock, whatever the previous state.
    pub fn is_ok(&self) -> bool {
        self.status != LockStatus::Failed
    }

    /// True if this call took the lock rather than renewing it.
    pub fn created(&self) -> bool {
        matches!(self.status, LockStatus::Ok | LockStatus::Transferred)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnlockStatus {
    /// Someone else owns the lock
    Failed,
    /// The lock was released, no one owns it
    Ok,
    /// There was nothing to release
    NoLock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub status: UnlockStatus,
}

impl UnlockResponse {
    pub fn ok() -> Self {
        Self { status: UnlockStatus::Ok }
    }

    pub fn no_lock() -> Self {
        Self { status: UnlockStatus::NoLock }
    }

    pub fn failed() -> Self {
        Self { status: UnlockStatus::Failed }
    }

    pub fn is_ok(&self) -> bool {
        self.status != UnlockStatus::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub signee: String,
    pub level: i64,
}
