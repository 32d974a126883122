//! The scenario suite every `LockService` backend must pass.
//!
//! Available to this crate's tests and, with the `testing` feature, to anyone
//! writing a new backend: implement `ServiceBootstrap` and call
//! `run_service_suite`.

use std::sync::Arc;

use chrono::TimeDelta;

use crate::error::ErrorKind;
use crate::infrastructure::LockServiceExt;
use crate::infrastructure_conditional::ConditionalLockService;
use crate::infrastructure_in_memory::InMemoryLockService;
use crate::provision;
use crate::script::{ScriptCommand, ScriptEntry, run_commands};
use crate::store::{ConditionalStore, TableProvisioner};
use crate::types::*;

/// Lease duration every suite service starts with.
pub const SUITE_DURATION: TimeDelta = TimeDelta::seconds(10);

/// Sets up and tears down one fresh service per scenario.
pub trait ServiceBootstrap {
    fn name(&self) -> String;
    fn open_service(&mut self) -> Arc<dyn LockServiceExt>;
    fn close_service(&mut self);
}

pub struct InMemoryBootstrap;

impl ServiceBootstrap for InMemoryBootstrap {
    fn name(&self) -> String {
        "in-memory".to_string()
    }

    fn open_service(&mut self) -> Arc<dyn LockServiceExt> {
        Arc::new(InMemoryLockService::new(ServiceOptions::new(SUITE_DURATION)))
    }

    fn close_service(&mut self) {}
}

/// Opens a `ConditionalLockService` on a randomly named table and drops the
/// table afterwards.
pub struct ConditionalBootstrap<S> {
    label: String,
    store: Arc<S>,
    table: Option<String>,
}

impl<S> ConditionalBootstrap<S> {
    pub fn new(label: impl Into<String>, store: Arc<S>) -> Self {
        Self {
            label: label.into(),
            store,
            table: None,
        }
    }
}

pub fn random_table_name() -> String {
    let alphabet: Vec<char> = ('a'..='z').chain('0'..='9').collect();
    format!("lidtest_{}", nanoid::nanoid!(12, &alphabet))
}

impl<S: ConditionalStore + TableProvisioner + 'static> ServiceBootstrap for ConditionalBootstrap<S> {
    fn name(&self) -> String {
        self.label.clone()
    }

    fn open_service(&mut self) -> Arc<dyn LockServiceExt> {
        let table = random_table_name();
        let options = ServiceOptions::new(SUITE_DURATION).with_table(&table);
        let service = ConditionalLockService::new(Arc::clone(&self.store), options)
            .unwrap_or_else(|e| panic!("{}: opening table {table}: {e}", self.label));
        self.table = Some(table);
        Arc::new(service)
    }

    fn close_service(&mut self) {
        if let Some(table) = self.table.take() {
            provision::drop_table(&*self.store, &table)
                .unwrap_or_else(|e| panic!("{}: dropping table {table}: {e}", self.label));
        }
    }
}

pub struct ScenarioCase {
    pub name: &'static str,
    pub script: Vec<ScriptCommand>,
    pub want: Vec<ScriptEntry>,
}

fn ok() -> ScriptEntry {
    ScriptEntry::lock(LockResponse::ok(), None)
}

fn renewed() -> ScriptEntry {
    ScriptEntry::lock(LockResponse::renewed(), None)
}

fn transferred(from: &str) -> ScriptEntry {
    ScriptEntry::lock(LockResponse::transferred(from), None)
}

fn lock_failed(kind: ErrorKind) -> ScriptEntry {
    ScriptEntry::lock(LockResponse::failed(), Some(kind))
}

fn unlocked(status: UnlockStatus, error: Option<ErrorKind>) -> ScriptEntry {
    ScriptEntry::unlock(UnlockResponse { status }, error)
}

fn held_by(signee: &str, level: i64) -> ScriptEntry {
    ScriptEntry::Check {
        response: Some(CheckResponse {
            signee: signee.to_string(),
            level,
        }),
        error: None,
    }
}

fn not_found() -> ScriptEntry {
    ScriptEntry::Check {
        response: None,
        error: Some(ErrorKind::NotFound),
    }
}

pub fn standard_cases() -> Vec<ScenarioCase> {
    use ScriptCommand as C;
    vec![
        ScenarioCase {
            name: "acquire empty lock",
            script: vec![C::lock("a", "0", 0)],
            want: vec![ok()],
        },
        ScenarioCase {
            name: "acquire existing lock through higher level",
            script: vec![C::lock("a", "0", 0), C::lock("a", "1", 1)],
            want: vec![ok(), transferred("0")],
        },
        ScenarioCase {
            name: "renew my expired lock",
            script: vec![
                C::duration_secs(-20),
                C::lock("a", "0", 0),
                C::duration_secs(10),
                C::lock("a", "0", 1),
            ],
            want: vec![ok(), renewed()],
        },
        ScenarioCase {
            name: "acquire someone else's expired lock",
            script: vec![
                C::duration_secs(-20),
                C::lock("a", "0", 0),
                C::duration_secs(10),
                C::lock("a", "1", 0),
            ],
            want: vec![ok(), transferred("0")],
        },
        ScenarioCase {
            name: "fail acquiring existing valid lock at equal level",
            script: vec![C::lock("a", "0", 0), C::lock("a", "1", 0), C::check("a")],
            want: vec![ok(), lock_failed(ErrorKind::Forbidden), held_by("0", 0)],
        },
        ScenarioCase {
            name: "fail acquiring with lower level",
            script: vec![C::lock("a", "0", 3), C::lock("a", "1", 2)],
            want: vec![ok(), lock_failed(ErrorKind::Forbidden)],
        },
        ScenarioCase {
            name: "renewal may lower the level",
            script: vec![
                C::lock("a", "0", 5),
                C::lock("a", "0", 1),
                C::lock("a", "1", 2),
            ],
            want: vec![ok(), renewed(), transferred("0")],
        },
        ScenarioCase {
            name: "unlock a missing lock",
            script: vec![C::unlock("a", "0")],
            want: vec![unlocked(UnlockStatus::NoLock, None)],
        },
        ScenarioCase {
            name: "unlock an existing lock",
            script: vec![C::lock("a", "0", 0), C::unlock("a", "0"), C::check("a")],
            want: vec![ok(), unlocked(UnlockStatus::Ok, None), not_found()],
        },
        ScenarioCase {
            name: "fail unlocking someone else's lock",
            script: vec![C::lock("a", "0", 0), C::unlock("a", "1"), C::check("a")],
            want: vec![
                ok(),
                unlocked(UnlockStatus::Failed, Some(ErrorKind::Forbidden)),
                held_by("0", 0),
            ],
        },
        ScenarioCase {
            name: "relock after unlock",
            script: vec![
                C::lock("a", "0", 0),
                C::unlock("a", "0"),
                C::lock("a", "1", 0),
            ],
            want: vec![ok(), unlocked(UnlockStatus::Ok, None), ok()],
        },
        ScenarioCase {
            name: "signatures are independent",
            script: vec![C::lock("a", "0", 0), C::lock("b", "1", 0), C::unlock("b", "0")],
            want: vec![
                ok(),
                ok(),
                unlocked(UnlockStatus::Failed, Some(ErrorKind::Forbidden)),
            ],
        },
        ScenarioCase {
            name: "reject empty signature and signee",
            script: vec![C::lock("", "0", 0), C::lock("a", "", 0), C::unlock("a", "")],
            want: vec![
                lock_failed(ErrorKind::BadRequest),
                lock_failed(ErrorKind::BadRequest),
                unlocked(UnlockStatus::Failed, Some(ErrorKind::BadRequest)),
            ],
        },
    ]
}

/// Run every standard case against every bootstrap, one fresh service per case.
pub fn run_service_suite(bootstraps: &mut [Box<dyn ServiceBootstrap>]) {
    for case in standard_cases() {
        for bootstrap in bootstraps.iter_mut() {
            let service = bootstrap.open_service();
            let have = run_commands(&case.script, &*service)
                .unwrap_or_else(|e| panic!("[{}] {}: {e}", bootstrap.name(), case.name));
            bootstrap.close_service();
            assert_eq!(
                have.history,
                case.want,
                "[{}] {}",
                bootstrap.name(),
                case.name
            );
        }
    }
}
