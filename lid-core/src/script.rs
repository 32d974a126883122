//! JSON scenario scripts.
//!
//! A script is a stream of JSON objects, each holding exactly one command:
//!
//! ```json
//! {"d": -20000}
//! {"l": {"req": {"signature": "a", "signee": "0", "level": 0}}}
//! {"d": 10000}
//! {"l": {"req": {"signature": "a", "signee": "1"}, "opts": {"force": false}}}
//! {"u": {"req": {"signature": "a", "signee": "1"}}}
//! {"c": {"signature": "a"}}
//! ```
//!
//! `d` replaces the service's lease duration (milliseconds, may be negative) and
//! leaves no history entry. Every other command records its response and error
//! kind; command failures never abort the script, only malformed input does.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::infrastructure::LockServiceExt;
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptCommand {
    #[serde(rename = "l")]
    Lock {
        req: LockRequest,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        opts: Option<LockOptions>,
    },
    #[serde(rename = "u")]
    Unlock {
        req: UnlockRequest,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        opts: Option<UnlockOptions>,
    },
    #[serde(rename = "c")]
    Check { signature: String },
    /// New lease duration in milliseconds
    #[serde(rename = "d")]
    Duration(i64),
}

impl ScriptCommand {
    pub fn lock(signature: &str, signee: &str, level: i64) -> Self {
        ScriptCommand::Lock {
            req: LockRequest::new(signature, signee, level),
            opts: None,
        }
    }

    pub fn unlock(signature: &str, signee: &str) -> Self {
        ScriptCommand::Unlock {
            req: UnlockRequest::new(signature, signee),
            opts: None,
        }
    }

    pub fn check(signature: &str) -> Self {
        ScriptCommand::Check {
            signature: signature.to_string(),
        }
    }

    pub fn duration_secs(secs: i64) -> Self {
        ScriptCommand::Duration(secs.saturating_mul(1000))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptEntry {
    Lock {
        response: LockResponse,
        error: Option<ErrorKind>,
    },
    Unlock {
        response: UnlockResponse,
        error: Option<ErrorKind>,
    },
    Check {
        response: Option<CheckResponse>,
        error: Option<ErrorKind>,
    },
}

impl ScriptEntry {
    pub fn lock(response: LockResponse, error: Option<ErrorKind>) -> Self {
        ScriptEntry::Lock { response, error }
    }

    pub fn unlock(response: UnlockResponse, error: Option<ErrorKind>) -> Self {
        ScriptEntry::Unlock { response, error }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptResponse {
    pub history: Vec<ScriptEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("malformed script: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("lease duration of {0} ms is out of range")]
    InvalidDuration(i64),
}

/// Parse a whole script up front, so a malformed one runs nothing.
pub fn parse_script(script: &str) -> Result<Vec<ScriptCommand>, ScriptError> {
    serde_json::Deserializer::from_str(script)
        .into_iter::<ScriptCommand>()
        .map(|cmd| cmd.map_err(ScriptError::from))
        .collect()
}

/// Serialize commands into the script format.
pub fn build_script(commands: &[ScriptCommand]) -> Result<String, ScriptError> {
    let mut script = String::new();
    for cmd in commands {
        script.push_str(&serde_json::to_string(cmd)?);
        script.push('\n');
    }
    Ok(script)
}

pub fn run_script<S: LockServiceExt + ?Sized>(
    script: &str,
    service: &S,
) -> Result<ScriptResponse, ScriptError> {
    let commands = parse_script(script)?;
    run_commands(&commands, service)
}

/// Run already-parsed commands. Out-of-range `d` values are rejected before
/// any command runs.
pub fn run_commands<S: LockServiceExt + ?Sized>(
    commands: &[ScriptCommand],
    service: &S,
) -> Result<ScriptResponse, ScriptError> {
    let out_of_range = commands.iter().find_map(|cmd| match cmd {
        ScriptCommand::Duration(ms) if TimeDelta::try_milliseconds(*ms).is_none() => Some(*ms),
        _ => None,
    });
    if let Some(ms) = out_of_range {
        return Err(ScriptError::InvalidDuration(ms));
    }

    let mut response = ScriptResponse::default();
    for cmd in commands {
        match cmd {
            ScriptCommand::Lock { req, opts } => {
                let entry = match service.lock(req, opts.as_ref()) {
                    Ok(resp) => ScriptEntry::lock(resp, None),
                    Err(e) => ScriptEntry::lock(LockResponse::failed(), Some(e.kind())),
                };
                response.history.push(entry);
            }
            ScriptCommand::Unlock { req, opts } => {
                let entry = match service.unlock(req, opts.as_ref()) {
                    Ok(resp) => ScriptEntry::unlock(resp, None),
                    Err(e) => ScriptEntry::unlock(UnlockResponse::failed(), Some(e.kind())),
                };
                response.history.push(entry);
            }
            ScriptCommand::Check { signature } => {
                #[allow(deprecated)]
                let result = service.check(signature);
                let entry = match result {
                    Ok(resp) => ScriptEntry::Check {
                        response: Some(resp),
                        error: None,
                    },
                    Err(e) => ScriptEntry::Check {
                        response: None,
                        error: Some(e.kind()),
                    },
                };
                response.history.push(entry);
            }
            ScriptCommand::Duration(ms) => {
                if let Some(duration) = TimeDelta::try_milliseconds(*ms) {
                    service.set_duration(duration);
                }
            }
        }
    }
    Ok(response)
}
