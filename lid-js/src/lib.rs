#![deny(clippy::all)]

use chrono::TimeDelta;
use napi::{Error, Result, Status};
use napi_derive::napi;
use serde::Serialize;

use lid_core::client::LidClient as RustClient;
use lid_core::error::{ErrorKind, LockError};
use lid_core::infrastructure::{LockService, LockServiceExt};
use lid_core::script::run_script;
use lid_core::types::{
    LockOptions, LockRequest, LockStatus, ServiceOptions, UnlockRequest, UnlockStatus,
    duration_from_millis,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LockOutcome {
    success: bool,
    status: LockStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_signee: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnlockOutcome {
    success: bool,
    status: UnlockStatus,
}

fn to_napi(err: LockError) -> Error {
    let status = match err.kind() {
        ErrorKind::BadRequest => Status::InvalidArg,
        _ => Status::GenericFailure,
    };
    Error::new(status, err.to_string())
}

/// JS numbers are f64; `as` saturates, so infinities land on the i64 bounds
/// and are rejected there.
fn millis_arg(ms: f64) -> Result<TimeDelta> {
    if ms.is_nan() {
        return Err(Error::new(Status::InvalidArg, "duration is not a number".to_string()));
    }
    duration_from_millis(ms as i64).map_err(to_napi)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::new(Status::GenericFailure, e.to_string()))
}

// ─── JS-facing LidClient ────────────────────────────────────────────────────

#[napi]
pub struct LidClient {
    inner: RustClient,
}

#[napi]
impl LidClient {
    /// Create a client over a process-local lock table.
    /// Leases last `durationMs` (default 30 s) unless a call overrides it.
    #[napi(constructor)]
    pub fn new(duration_ms: Option<f64>) -> Result<Self> {
        let duration = millis_arg(duration_ms.unwrap_or(30_000.0))?;
        Ok(Self {
            inner: RustClient::in_memory(ServiceOptions::new(duration)),
        })
    }

    /// Take or renew a lock.
    /// Returns a JSON string: `{success, status, previousSignee?}`.
    #[napi]
    pub fn lock(
        &self,
        signature: String,
        signee: String,
        level: Option<f64>,
        duration_ms: Option<f64>,
    ) -> Result<String> {
        let req = LockRequest::new(signature, signee, level.unwrap_or(0.0) as i64);
        let mut opts = LockOptions::default();
        if let Some(ms) = duration_ms {
            opts = opts.with_duration(millis_arg(ms)?);
        }

        let outcome = match self.inner.lock(&req, Some(&opts)) {
            Ok(resp) => LockOutcome {
                success: true,
                status: resp.status,
                previous_signee: resp.previous_signee,
            },
            Err(LockError::Forbidden) => LockOutcome {
                success: false,
                status: LockStatus::Failed,
                previous_signee: None,
            },
            Err(e) => return Err(to_napi(e)),
        };
        to_json(&outcome)
    }

    /// Release a lock. Returns a JSON string: `{success, status}`.
    #[napi]
    pub fn unlock(&self, signature: String, signee: String) -> Result<String> {
        let outcome = match self.inner.unlock(&UnlockRequest::new(signature, signee), None) {
            Ok(resp) => UnlockOutcome {
                success: true,
                status: resp.status,
            },
            Err(LockError::Forbidden) => UnlockOutcome {
                success: false,
                status: UnlockStatus::Failed,
            },
            Err(e) => return Err(to_napi(e)),
        };
        to_json(&outcome)
    }

    /// Current holder as a JSON string `{signee, level}`, or null when unlocked.
    #[napi]
    pub fn check(&self, signature: String) -> Result<Option<String>> {
        #[allow(deprecated)]
        let result = self.inner.check(&signature);
        match result {
            Ok(held) => to_json(&held).map(Some),
            Err(LockError::NotFound) => Ok(None),
            Err(e) => Err(to_napi(e)),
        }
    }

    /// Change the default lease duration for later locks.
    #[napi]
    pub fn set_duration_ms(&self, duration_ms: f64) -> Result<()> {
        self.inner.set_duration(millis_arg(duration_ms)?);
        Ok(())
    }

    /// Run a JSON lock script. Returns the history as a JSON string.
    #[napi]
    pub fn run_script(&self, script: String) -> Result<String> {
        let response = run_script(&script, &self.inner)
            .map_err(|e| Error::new(Status::InvalidArg, e.to_string()))?;
        to_json(&response)
    }
}
