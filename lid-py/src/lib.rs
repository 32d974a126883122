use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use ::lid_core::client::LidClient as RustClient;
use ::lid_core::error::{ErrorKind, LockError};
use ::lid_core::infrastructure::{LockService, LockServiceExt};
use ::lid_core::script::run_script;
use ::lid_core::types::{
    LockOptions, LockRequest, LockStatus, ServiceOptions, UnlockRequest, UnlockStatus,
    duration_from_millis,
};

fn status_str(status: LockStatus) -> &'static str {
    match status {
        LockStatus::Failed => "FAILED",
        LockStatus::Ok => "OK",
        LockStatus::Transferred => "TRANSFERRED",
        LockStatus::Renewed => "RENEWED",
    }
}

fn unlock_status_str(status: UnlockStatus) -> &'static str {
    match status {
        UnlockStatus::Failed => "FAILED",
        UnlockStatus::Ok => "OK",
        UnlockStatus::NoLock => "NO_LOCK",
    }
}

/// Forbidden is an ordinary outcome; everything else becomes an exception.
fn raise(err: LockError) -> PyErr {
    match err.kind() {
        ErrorKind::BadRequest => PyValueError::new_err(err.to_string()),
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

/// The lid lock client for Python, over a process-local lock table.
#[pyclass]
pub struct LidClient {
    inner: RustClient,
}

#[pymethods]
impl LidClient {
    /// Create a client whose leases last `duration_ms` by default.
    #[new]
    #[pyo3(signature = (duration_ms = 30_000))]
    pub fn new(duration_ms: i64) -> PyResult<Self> {
        let duration = duration_from_millis(duration_ms).map_err(raise)?;
        Ok(Self {
            inner: RustClient::in_memory(ServiceOptions::new(duration)),
        })
    }

    /// Take or renew a lock.
    /// Returns a dict with 'success', 'status' and, on transfer, 'previous_signee'.
    #[pyo3(signature = (signature, signee, level = 0, duration_ms = None))]
    pub fn lock<'py>(
        &self,
        py: Python<'py>,
        signature: &str,
        signee: &str,
        level: i64,
        duration_ms: Option<i64>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let req = LockRequest::new(signature, signee, level);
        let mut opts = LockOptions::default();
        if let Some(ms) = duration_ms {
            opts = opts.with_duration(duration_from_millis(ms).map_err(raise)?);
        }

        let dict = PyDict::new(py);
        match self.inner.lock(&req, Some(&opts)) {
            Ok(resp) => {
                dict.set_item("success", true)?;
                dict.set_item("status", status_str(resp.status))?;
                dict.set_item("previous_signee", resp.previous_signee)?;
            }
            Err(LockError::Forbidden) => {
                dict.set_item("success", false)?;
                dict.set_item("status", status_str(LockStatus::Failed))?;
            }
            Err(e) => return Err(raise(e)),
        }
        Ok(dict)
    }

    /// Release a lock held by `signee`.
    /// Returns a dict with 'success' and 'status' ("OK", "NO_LOCK" or "FAILED").
    pub fn unlock<'py>(
        &self,
        py: Python<'py>,
        signature: &str,
        signee: &str,
    ) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        match self.inner.unlock(&UnlockRequest::new(signature, signee), None) {
            Ok(resp) => {
                dict.set_item("success", true)?;
                dict.set_item("status", unlock_status_str(resp.status))?;
            }
            Err(LockError::Forbidden) => {
                dict.set_item("success", false)?;
                dict.set_item("status", unlock_status_str(UnlockStatus::Failed))?;
            }
            Err(e) => return Err(raise(e)),
        }
        Ok(dict)
    }

    /// Current holder as {'signee', 'level'}, or None when unlocked.
    pub fn check<'py>(&self, py: Python<'py>, signature: &str) -> PyResult<Option<Bound<'py, PyDict>>> {
        #[allow(deprecated)]
        let result = self.inner.check(signature);
        match result {
            Ok(held) => {
                let dict = PyDict::new(py);
                dict.set_item("signee", held.signee)?;
                dict.set_item("level", held.level)?;
                Ok(Some(dict))
            }
            Err(LockError::NotFound) => Ok(None),
            Err(e) => Err(raise(e)),
        }
    }

    /// Change the default lease duration for later locks. Negative values
    /// produce leases that are already expired.
    pub fn set_duration_ms(&self, duration_ms: i64) -> PyResult<()> {
        self.inner.set_duration(duration_from_millis(duration_ms).map_err(raise)?);
        Ok(())
    }

    /// Run a JSON lock script and return its history as a JSON string.
    pub fn run_script(&self, script: &str) -> PyResult<String> {
        let response = run_script(script, &self.inner).map_err(|e| PyValueError::new_err(e.to_string()))?;
        serde_json::to_string(&response).map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }
}

/// The lid Python module.
#[pymodule]
fn lid(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<LidClient>()?;
    Ok(())
}
