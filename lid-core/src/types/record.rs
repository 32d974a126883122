use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The held state of one lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Lock identity and store key
    pub signature: String,
    /// Current owner
    pub signee: String,
    /// Priority; a strictly higher level preempts
    pub level: i64,
    /// Reclaimable by anyone once `now > expires_at`
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn new(
        signature: impl Into<String>,
        signee: impl Into<String>,
        level: i64,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            signature: signature.into(),
            signee: signee.into(),
            level,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Epoch nanoseconds as stored in the `lexpires` attribute.
///
/// Instants past the `i64` nanosecond range (year 2262) saturate.
pub fn to_epoch_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(if at.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

pub fn from_epoch_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

/// One row of a conditional-store table.
///
/// Attribute names are the on-disk names; `lsig` is the partition key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRow {
    #[serde(rename = "lsig")]
    pub signature: String,
    #[serde(rename = "lsignee")]
    pub signee: String,
    #[serde(rename = "llevel")]
    pub level: i64,
    #[serde(rename = "lexpires")]
    pub expires_epoch_nanos: i64,
    /// Epoch seconds for the store's own expiry reaper
    #[serde(rename = "lttl", default, skip_serializing_if = "Option::is_none")]
    pub ttl_epoch_seconds: Option<i64>,
}

impl StoredRow {
    pub fn from_record(record: &LockRecord, ttl_epoch_seconds: Option<i64>) -> Self {
        Self {
            signature: record.signature.clone(),
            signee: record.signee.clone(),
            level: record.level,
            expires_epoch_nanos: to_epoch_nanos(record.expires_at),
            ttl_epoch_seconds,
        }
    }

    pub fn to_record(&self) -> LockRecord {
        LockRecord {
            signature: self.signature.clone(),
            signee: self.signee.clone(),
            level: self.level,
            expires_at: from_epoch_nanos(self.expires_epoch_nanos),
        }
    }
}

pub const SIGNATURE_ATTR: &str = "lsig";
pub const SIGNEE_ATTR: &str = "lsignee";
pub const LEVEL_ATTR: &str = "llevel";
pub const EXPIRES_ATTR: &str = "lexpires";
pub const TTL_ATTR: &str = "lttl";
