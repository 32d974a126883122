//! Conditions that a conditional store evaluates atomically with a write.
//!
//! The acquisition rule compiles to a single `Or` of four clauses; the release
//! rule to a single `Or` of two. A store must reject the write, and leave the
//! prior row untouched, whenever the condition does not hold.

use crate::types::{
    EXPIRES_ATTR, LEVEL_ATTR, LockRequest, SIGNATURE_ATTR, SIGNEE_ATTR, StoredRow, UnlockRequest,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// No row exists for the key
    NotExists,
    /// Stored `lsignee` equals the value
    SigneeEquals(String),
    /// Stored `llevel` is strictly less than the value
    LevelLessThan(i64),
    /// Stored `lexpires` is strictly before the value (epoch nanos)
    ExpiresBefore(i64),
    Or(Vec<Condition>),
}

impl Condition {
    /// `NOT EXISTS OR signee = :se OR level < :lv OR expires < :ex`
    pub fn acquire(req: &LockRequest, now_epoch_nanos: i64) -> Self {
        Condition::Or(vec![
            Condition::NotExists,
            Condition::SigneeEquals(req.signee.clone()),
            Condition::LevelLessThan(req.level),
            Condition::ExpiresBefore(now_epoch_nanos),
        ])
    }

    /// `NOT EXISTS OR signee = :se`
    pub fn release(req: &UnlockRequest) -> Self {
        Condition::Or(vec![
            Condition::NotExists,
            Condition::SigneeEquals(req.signee.clone()),
        ])
    }

    /// Evaluate against the stored row. Comparisons on an absent row are false.
    pub fn evaluate(&self, row: Option<&StoredRow>) -> bool {
        match (self, row) {
            (Condition::NotExists, row) => row.is_none(),
            (Condition::Or(branches), row) => branches.iter().any(|c| c.evaluate(row)),
            (_, None) => false,
            (Condition::SigneeEquals(signee), Some(r)) => r.signee == *signee,
            (Condition::LevelLessThan(level), Some(r)) => r.level < *level,
            (Condition::ExpiresBefore(nanos), Some(r)) => r.expires_epoch_nanos < *nanos,
        }
    }

    /// True if the condition holds when no row exists.
    pub fn allows_absent(&self) -> bool {
        self.evaluate(None)
    }

    /// The clauses that inspect an existing row, i.e. everything but `NotExists`.
    pub fn row_clauses(&self) -> Vec<&Condition> {
        match self {
            Condition::NotExists => Vec::new(),
            Condition::Or(branches) => branches.iter().flat_map(|c| c.row_clauses()).collect(),
            other => vec![other],
        }
    }

    /// Render in DynamoDB condition-expression syntax, with named placeholders.
    pub fn to_expression(&self) -> String {
        match self {
            Condition::NotExists => format!("attribute_not_exists({SIGNATURE_ATTR})"),
            Condition::SigneeEquals(_) => format!("{SIGNEE_ATTR} = :se"),
            Condition::LevelLessThan(_) => format!("{LEVEL_ATTR} < :lv"),
            Condition::ExpiresBefore(_) => format!("{EXPIRES_ATTR} < :ex"),
            Condition::Or(branches) => branches
                .iter()
                .map(Condition::to_expression)
                .collect::<Vec<_>>()
                .join(" OR "),
        }
    }
}
