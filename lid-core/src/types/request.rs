use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LockError;

/// Ask for `signature` on behalf of `signee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    pub signature: String,
    pub signee: String,
    /// Leave at 0 unless levels are needed.
    #[serde(default)]
    pub level: i64,
}

impl LockRequest {
    pub fn new(signature: impl Into<String>, signee: impl Into<String>, level: i64) -> Self {
        Self {
            signature: signature.into(),
            signee: signee.into(),
            level,
        }
    }

    pub fn validate(&self) -> Result<(), LockError> {
        validate_identity(&self.signature, &self.signee)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub signature: String,
    pub signee: String,
}

impl UnlockRequest {
    pub fn new(signature: impl Into<String>, signee: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            signee: signee.into(),
        }
    }

    pub fn validate(&self) -> Result<(), LockError> {
        validate_identity(&self.signature, &self.signee)
    }
}

fn validate_identity(signature: &str, signee: &str) -> Result<(), LockError> {
    if signature.is_empty() {
        return Err(LockError::BadRequest("signature is required".into()));
    }
    if signee.is_empty() {
        return Err(LockError::BadRequest("signee is required".into()));
    }
    Ok(())
}

/// Per-call lock options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOptions {
    /// Reserved. No acquisition rule reads it.
    #[serde(default)]
    pub force: bool,
    /// Overrides the service lease duration for this call
    #[serde(default, rename = "duration_ms", with = "millis", skip_serializing_if = "Option::is_none")]
    pub duration: Option<TimeDelta>,
    /// Overrides the service storage TTL hint for this call
    #[serde(default, rename = "ttl_ms", with = "millis", skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<TimeDelta>,
}

impl LockOptions {
    pub fn with_duration(mut self, duration: TimeDelta) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_time_to_live(mut self, ttl: TimeDelta) -> Self {
        self.time_to_live = Some(ttl);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockOptions {}

/// Backend-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Lock table name. Only the conditional-store backend uses it.
    pub table: String,
    /// Added to now to compute `expires_at` on acquisition and renewal
    pub duration: TimeDelta,
    /// Storage expiry hint, independent of the protocol's own expiry check
    pub time_to_live: Option<TimeDelta>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            table: String::new(),
            duration: TimeDelta::zero(),
            time_to_live: None,
        }
    }
}

impl ServiceOptions {
    pub fn new(duration: TimeDelta) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_time_to_live(mut self, ttl: TimeDelta) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Expiry for a lease taken at `now`, applying any per-call override.
    pub fn expires_at(&self, opts: Option<&LockOptions>, now: DateTime<Utc>) -> DateTime<Utc> {
        let duration = opts
            .and_then(|o| o.duration)
            .filter(|d| !d.is_zero())
            .unwrap_or(self.duration);
        saturating_add(now, duration)
    }

    /// `lttl` value for a row written at `now`, if any TTL applies.
    pub fn ttl_epoch_seconds(&self, opts: Option<&LockOptions>, now: DateTime<Utc>) -> Option<i64> {
        opts.and_then(|o| o.time_to_live)
            .filter(|d| !d.is_zero())
            .or(self.time_to_live.filter(|d| !d.is_zero()))
            .map(|ttl| saturating_add(now, ttl).timestamp())
    }
}

/// Caller-supplied milliseconds as a `TimeDelta`.
pub fn duration_from_millis(ms: i64) -> Result<TimeDelta, LockError> {
    TimeDelta::try_milliseconds(ms)
        .ok_or_else(|| LockError::BadRequest(format!("duration of {ms} ms is out of range")))
}

/// Caller-supplied seconds as a `TimeDelta`.
pub fn duration_from_secs(secs: i64) -> Result<TimeDelta, LockError> {
    TimeDelta::try_seconds(secs)
        .ok_or_else(|| LockError::BadRequest(format!("duration of {secs} s is out of range")))
}

fn saturating_add(at: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    at.checked_add_signed(delta).unwrap_or(if delta < TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Optional `TimeDelta` as signed integer milliseconds.
pub(crate) mod millis {
    use chrono::TimeDelta;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<TimeDelta>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.num_milliseconds()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<TimeDelta>, D::Error> {
        match Option::<i64>::deserialize(d)? {
            Some(ms) => TimeDelta::try_milliseconds(ms)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("{ms} ms is out of range"))),
            None => Ok(None),
        }
    }
}
