//! Student entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "students")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub user_id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub student_number: String,

    #[sea_orm(column_type = "Text")]
    pub program_study: String,

    #[sea_orm(column_type = "Text")]
    pub academic_year: String,

    /// Current advisor (lecturer id)
    pub advisor_id: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,

    #[sea_orm(
        belongs_to = "super::lecturer::Entity",
        from = "Column::AdvisorId",
        to = "super::lecturer::Column::Id"
    )]
    Advisor,

    #[sea_orm(has_many = "super::achievement_reference::Entity")]
    AchievementReferences,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::lecturer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Advisor.def()
    }
}

impl Related<super::achievement_reference::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AchievementReferences.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::store::Student {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            student_number: model.student_number,
            program_study: model.program_study,
            academic_year: model.academic_year,
            advisor_id: model.advisor_id,
        }
    }
}
