//! Achievement workflow state machine
//!
//! ```text
//! draft --submit--> submitted --verify--> verified (terminal)
//!                   submitted --reject--> rejected (terminal)
//! draft --delete--> deleted (terminal, soft)
//! ```
//!
//! Each state carries exactly the audit fields its invariants require, so a
//! submitted reference without `submitted_at` cannot be built.

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Flat status tag, as stored in the reference table and used in filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementStatus {
    Draft,
    Submitted,
    Verified,
    Rejected,
    Deleted,
}

impl AchievementStatus {
    pub const ALL: [AchievementStatus; 5] = [
        AchievementStatus::Draft,
        AchievementStatus::Submitted,
        AchievementStatus::Verified,
        AchievementStatus::Rejected,
        AchievementStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementStatus::Draft => "draft",
            AchievementStatus::Submitted => "submitted",
            AchievementStatus::Verified => "verified",
            AchievementStatus::Rejected => "rejected",
            AchievementStatus::Deleted => "deleted",
        }
    }

    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AchievementStatus::Verified | AchievementStatus::Rejected | AchievementStatus::Deleted
        )
    }
}

impl fmt::Display for AchievementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(AchievementStatus::Draft),
            "submitted" => Ok(AchievementStatus::Submitted),
            "verified" => Ok(AchievementStatus::Verified),
            "rejected" => Ok(AchievementStatus::Rejected),
            "deleted" => Ok(AchievementStatus::Deleted),
            other => Err(AppError::validation(
                format!("unknown status '{}'", other),
                Some("status"),
            )),
        }
    }
}

/// Fixed enumeration of achievement kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementType {
    Academic,
    Competition,
    Organization,
    Publication,
    Certification,
    Other,
}

impl AchievementType {
    pub const ALL: [AchievementType; 6] = [
        AchievementType::Academic,
        AchievementType::Competition,
        AchievementType::Organization,
        AchievementType::Publication,
        AchievementType::Certification,
        AchievementType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementType::Academic => "academic",
            AchievementType::Competition => "competition",
            AchievementType::Organization => "organization",
            AchievementType::Publication => "publication",
            AchievementType::Certification => "certification",
            AchievementType::Other => "other",
        }
    }
}

impl fmt::Display for AchievementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        AchievementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = AchievementType::ALL.iter().map(|t| t.as_str()).collect();
                AppError::validation(
                    format!(
                        "invalid achievement type '{}'; valid types: {}",
                        s,
                        valid.join(", ")
                    ),
                    Some("achievement_type"),
                )
            })
    }
}

/// Workflow state of one reference, with the audit fields each state owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowState {
    Draft,
    Submitted {
        submitted_at: DateTime<Utc>,
    },
    Verified {
        submitted_at: DateTime<Utc>,
        verified_at: DateTime<Utc>,
        verified_by: Uuid,
    },
    Rejected {
        submitted_at: DateTime<Utc>,
        verified_at: DateTime<Utc>,
        verified_by: Uuid,
        rejection_note: String,
    },
    Deleted,
}

/// Column-shaped view of a state, for persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateColumns {
    pub status: AchievementStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
    pub rejection_note: Option<String>,
}

/// A requested move through the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Submit,
    Verify { by: Uuid },
    Reject { by: Uuid, note: String },
    Delete,
}

impl Transition {
    /// The only state this transition may start from
    pub fn required_state(&self) -> AchievementStatus {
        match self {
            Transition::Submit | Transition::Delete => AchievementStatus::Draft,
            Transition::Verify { .. } | Transition::Reject { .. } => AchievementStatus::Submitted,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Submit => "submit",
            Transition::Verify { .. } => "verify",
            Transition::Reject { .. } => "reject",
            Transition::Delete => "delete",
        }
    }
}

impl WorkflowState {
    pub fn status(&self) -> AchievementStatus {
        match self {
            WorkflowState::Draft => AchievementStatus::Draft,
            WorkflowState::Submitted { .. } => AchievementStatus::Submitted,
            WorkflowState::Verified { .. } => AchievementStatus::Verified,
            WorkflowState::Rejected { .. } => AchievementStatus::Rejected,
            WorkflowState::Deleted => AchievementStatus::Deleted,
        }
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            WorkflowState::Submitted { submitted_at }
            | WorkflowState::Verified { submitted_at, .. }
            | WorkflowState::Rejected { submitted_at, .. } => Some(*submitted_at),
            WorkflowState::Draft | WorkflowState::Deleted => None,
        }
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        match self {
            WorkflowState::Verified { verified_at, .. }
            | WorkflowState::Rejected { verified_at, .. } => Some(*verified_at),
            _ => None,
        }
    }

    pub fn verified_by(&self) -> Option<Uuid> {
        match self {
            WorkflowState::Verified { verified_by, .. }
            | WorkflowState::Rejected { verified_by, .. } => Some(*verified_by),
            _ => None,
        }
    }

    pub fn rejection_note(&self) -> Option<&str> {
        match self {
            WorkflowState::Rejected { rejection_note, .. } => Some(rejection_note),
            _ => None,
        }
    }

    /// Apply a transition, producing the next state.
    ///
    /// Fails with `InvalidStateTransition` when the current state is not the
    /// transition's source, and with `Validation` for a blank rejection note.
    pub fn apply(&self, transition: &Transition, now: DateTime<Utc>) -> Result<WorkflowState> {
        let required = transition.required_state();
        if self.status() != required {
            return Err(AppError::InvalidStateTransition {
                current: self.status(),
                required,
            });
        }

        let next = match (self, transition) {
            (WorkflowState::Draft, Transition::Submit) => {
                WorkflowState::Submitted { submitted_at: now }
            }
            (WorkflowState::Draft, Transition::Delete) => WorkflowState::Deleted,
            (WorkflowState::Submitted { submitted_at }, Transition::Verify { by }) => {
                WorkflowState::Verified {
                    submitted_at: *submitted_at,
                    verified_at: now,
                    verified_by: *by,
                }
            }
            (WorkflowState::Submitted { submitted_at }, Transition::Reject { by, note }) => {
                let note = note.trim();
                if note.is_empty() {
                    return Err(AppError::validation(
                        "rejection note is required",
                        Some("rejection_note"),
                    ));
                }
                WorkflowState::Rejected {
                    submitted_at: *submitted_at,
                    verified_at: now,
                    verified_by: *by,
                    rejection_note: note.to_string(),
                }
            }
            // Source-state check above makes every other pairing impossible
            (state, transition) => {
                return Err(AppError::Internal {
                    message: format!(
                        "unhandled transition {} from {}",
                        transition.name(),
                        state.status()
                    ),
                })
            }
        };

        Ok(next)
    }

    pub fn to_columns(&self) -> StateColumns {
        StateColumns {
            status: self.status(),
            submitted_at: self.submitted_at(),
            verified_at: self.verified_at(),
            verified_by: self.verified_by(),
            rejection_note: self.rejection_note().map(String::from),
        }
    }

    /// Rebuild a state from stored columns, rejecting rows that break the
    /// per-status invariants.
    pub fn from_columns(columns: StateColumns) -> Result<WorkflowState> {
        let StateColumns {
            status,
            submitted_at,
            verified_at,
            verified_by,
            rejection_note,
        } = columns;

        let state = match (status, submitted_at, verified_at, verified_by, rejection_note) {
            (AchievementStatus::Draft, None, None, None, None) => WorkflowState::Draft,
            (AchievementStatus::Deleted, None, None, None, None) => WorkflowState::Deleted,
            (AchievementStatus::Submitted, Some(submitted_at), None, None, None) => {
                WorkflowState::Submitted { submitted_at }
            }
            (
                AchievementStatus::Verified,
                Some(submitted_at),
                Some(verified_at),
                Some(verified_by),
                None,
            ) => {
                WorkflowState::Verified {
                    submitted_at,
                    verified_at,
                    verified_by,
                }
            }
            (
                AchievementStatus::Rejected,
                Some(submitted_at),
                Some(verified_at),
                Some(verified_by),
                Some(rejection_note),
            ) => WorkflowState::Rejected {
                submitted_at,
                verified_at,
                verified_by,
                rejection_note,
            },
            (status, ..) => {
                return Err(AppError::Integrity {
                    message: format!("reference columns inconsistent with status '{}'", status),
                })
            }
        };

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted() -> WorkflowState {
        WorkflowState::Draft.apply(&Transition::Submit, Utc::now()).unwrap()
    }

    #[test]
    fn test_happy_path_verify() {
        let verifier = Uuid::new_v4();
        let state = submitted();
        assert_eq!(state.status(), AchievementStatus::Submitted);
        assert!(state.submitted_at().is_some());

        let verified = state.apply(&Transition::Verify { by: verifier }, Utc::now()).unwrap();
        assert_eq!(verified.status(), AchievementStatus::Verified);
        assert_eq!(verified.verified_by(), Some(verifier));
        assert_eq!(verified.submitted_at(), state.submitted_at());
        assert!(verified.rejection_note().is_none());
    }

    #[test]
    fn test_submit_twice_fails() {
        let err = submitted().apply(&Transition::Submit, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidStateTransition {
                current: AchievementStatus::Submitted,
                required: AchievementStatus::Draft,
            }
        ));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        let by = Uuid::new_v4();
        let verified = submitted().apply(&Transition::Verify { by }, Utc::now()).unwrap();
        let rejected = submitted()
            .apply(&Transition::Reject { by, note: "blurry scan".into() }, Utc::now())
            .unwrap();
        let deleted = WorkflowState::Draft.apply(&Transition::Delete, Utc::now()).unwrap();

        let all = [
            Transition::Submit,
            Transition::Verify { by },
            Transition::Reject { by, note: "x".into() },
            Transition::Delete,
        ];
        for state in [verified, rejected, deleted] {
            assert!(state.status().is_terminal());
            for transition in &all {
                assert!(state.apply(transition, Utc::now()).is_err());
            }
        }
    }

    #[test]
    fn test_reject_requires_note() {
        let by = Uuid::new_v4();
        let err = submitted()
            .apply(&Transition::Reject { by, note: "   ".into() }, Utc::now())
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_columns_round_trip_rejected() {
        let by = Uuid::new_v4();
        let rejected = submitted()
            .apply(&Transition::Reject { by, note: " missing signature ".into() }, Utc::now())
            .unwrap();
        let columns = rejected.to_columns();
        assert_eq!(columns.rejection_note.as_deref(), Some("missing signature"));
        assert_eq!(WorkflowState::from_columns(columns).unwrap(), rejected);
    }

    #[test]
    fn test_inconsistent_columns_are_integrity_errors() {
        let err = WorkflowState::from_columns(StateColumns {
            status: AchievementStatus::Submitted,
            submitted_at: None,
            verified_at: None,
            verified_by: None,
            rejection_note: None,
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Integrity { .. }));

        let err = WorkflowState::from_columns(StateColumns {
            status: AchievementStatus::Draft,
            submitted_at: None,
            verified_at: None,
            verified_by: None,
            rejection_note: Some("stale".into()),
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Integrity { .. }));
    }

    #[test]
    fn test_parse_type_and_status() {
        assert_eq!("competition".parse::<AchievementType>().unwrap(), AchievementType::Competition);
        assert!("sports".parse::<AchievementType>().is_err());
        assert_eq!("rejected".parse::<AchievementStatus>().unwrap(), AchievementStatus::Rejected);
        assert!("Rejected".parse::<AchievementStatus>().is_err());
    }

    #[test]
    fn test_state_serializes_flat() {
        let json = serde_json::to_value(submitted()).unwrap();
        assert_eq!(json["status"], "submitted");
        assert!(json["submitted_at"].is_string());
    }
}
