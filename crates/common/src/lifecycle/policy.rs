//! Access policy
//!
//! A single table mapping `(role, relationship to the owning student)` to the
//! operations allowed on an achievement. Stateless; every engine operation
//! consults it before touching a store.

use crate::auth::Role;
use serde::Serialize;
use std::fmt;

/// How the acting user relates to the student who owns an achievement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relationship {
    /// Actor is the owning student
    SelfOwned,
    /// Actor is the owning student's current advisor
    Advisee,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Update,
    Submit,
    Delete,
    Verify,
    Reject,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Read,
        Operation::Update,
        Operation::Submit,
        Operation::Delete,
        Operation::Verify,
        Operation::Reject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Submit => "submit",
            Operation::Delete => "delete",
            Operation::Verify => "verify",
            Operation::Reject => "reject",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const NOTHING: &[Operation] = &[];
const OWNER: &[Operation] = &[
    Operation::Read,
    Operation::Update,
    Operation::Submit,
    Operation::Delete,
];
const ADVISOR: &[Operation] = &[Operation::Read, Operation::Verify, Operation::Reject];

/// Operations `role` may perform given `relationship`.
///
/// Draft-only restrictions on update/delete are state checks, not policy,
/// and are enforced by the engine afterwards.
pub fn allowed_operations(role: Role, relationship: Relationship) -> &'static [Operation] {
    match (role, relationship) {
        (Role::Admin, _) => &Operation::ALL,
        (Role::Student, Relationship::SelfOwned) => OWNER,
        (Role::Advisor, Relationship::Advisee) => ADVISOR,
        _ => NOTHING,
    }
}

pub fn can_access(role: Role, relationship: Relationship, operation: Operation) -> bool {
    allowed_operations(role, relationship).contains(&operation)
}

/// Creation is role-gated only: students create for themselves, admins for anyone
pub fn can_create(role: Role) -> bool {
    matches!(role, Role::Admin | Role::Student)
}
