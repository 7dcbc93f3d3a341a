//! Achievement reference entity

use crate::errors::{self, AppError};
use crate::lifecycle::{AchievementReference, StateColumns, WorkflowState};
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "achievement_references")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub student_id: Uuid,

    /// Id of the document in the content store
    #[sea_orm(unique)]
    pub content_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub submitted_at: Option<DateTimeWithTimeZone>,

    pub verified_at: Option<DateTimeWithTimeZone>,

    pub verified_by: Option<Uuid>,

    #[sea_orm(column_type = "Text", nullable)]
    pub rejection_note: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Rebuild the domain record, rejecting rows whose columns contradict
    /// their status
    pub fn into_domain(self) -> errors::Result<AchievementReference> {
        let status = self.status.parse().map_err(|_| AppError::Integrity {
            message: format!("reference {} has unknown status '{}'", self.id, self.status),
        })?;

        let state = WorkflowState::from_columns(StateColumns {
            status,
            submitted_at: self.submitted_at.map(|t| t.with_timezone(&Utc)),
            verified_at: self.verified_at.map(|t| t.with_timezone(&Utc)),
            verified_by: self.verified_by,
            rejection_note: self.rejection_note,
        })?;

        Ok(AchievementReference {
            id: self.id,
            student_id: self.student_id,
            content_id: self.content_id,
            state,
            created_at: self.created_at.with_timezone(&Utc),
            updated_at: self.updated_at.with_timezone(&Utc),
        })
    }
}

/// Columns a status change writes. Identity and ownership are left unset.
pub fn state_changes(reference: &AchievementReference) -> ActiveModel {
    let columns = reference.state.to_columns();
    ActiveModel {
        status: Set(columns.status.as_str().to_string()),
        submitted_at: Set(columns.submitted_at.map(Into::into)),
        verified_at: Set(columns.verified_at.map(Into::into)),
        verified_by: Set(columns.verified_by),
        rejection_note: Set(columns.rejection_note),
        updated_at: Set(reference.updated_at.into()),
        ..Default::default()
    }
}

/// Full row for inserts
pub fn new_row(reference: &AchievementReference) -> ActiveModel {
    ActiveModel {
        id: Set(reference.id),
        student_id: Set(reference.student_id),
        content_id: Set(reference.content_id),
        created_at: Set(reference.created_at.into()),
        ..state_changes(reference)
    }
}
