//! Lecturer entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "lecturers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub user_id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub lecturer_number: String,

    #[sea_orm(column_type = "Text")]
    pub department: String,

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

    #[sea_orm(has_many = "super::student::Entity")]
    Advisees,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Advisees.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::store::Lecturer {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            lecturer_number: model.lecturer_number,
            department: model.department,
        }
    }
}
