//! Achievement content entity
//!
//! The document side. Nested structures (details, attachments, tags) are
//! JSONB so their shape can grow without schema changes.

use crate::errors::{self, AppError};
use crate::lifecycle::{AchievementContent, NewContent};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "achievement_contents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owner copy for search; the reference is authoritative
    pub student_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub achievement_type: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub details: Json,

    #[sea_orm(column_type = "JsonBinary")]
    pub attachments: Json,

    #[sea_orm(column_type = "JsonBinary")]
    pub tags: Json,

    pub points: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn into_domain(self) -> errors::Result<AchievementContent> {
        let achievement_type = self.achievement_type.parse().map_err(|_| AppError::Integrity {
            message: format!(
                "content {} has unknown type '{}'",
                self.id, self.achievement_type
            ),
        })?;

        Ok(AchievementContent {
            id: self.id,
            student_id: self.student_id,
            achievement_type,
            title: self.title,
            description: self.description,
            details: serde_json::from_value(self.details)?,
            attachments: serde_json::from_value(self.attachments)?,
            tags: serde_json::from_value(self.tags)?,
            points: self.points,
            created_at: self.created_at.with_timezone(&Utc),
            updated_at: self.updated_at.with_timezone(&Utc),
        })
    }
}

pub fn new_row(
    id: Uuid,
    content: NewContent,
    now: DateTime<Utc>,
) -> errors::Result<ActiveModel> {
    Ok(ActiveModel {
        id: Set(id),
        student_id: Set(content.student_id),
        achievement_type: Set(content.achievement_type.as_str().to_string()),
        title: Set(content.title),
        description: Set(content.description),
        details: Set(serde_json::to_value(content.details)?),
        attachments: Set(serde_json::json!([])),
        tags: Set(serde_json::to_value(content.tags)?),
        points: Set(content.points),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    })
}

/// Mutable columns only; attachments have their own statements
pub fn changes(content: &AchievementContent) -> errors::Result<ActiveModel> {
    Ok(ActiveModel {
        achievement_type: Set(content.achievement_type.as_str().to_string()),
        title: Set(content.title.clone()),
        description: Set(content.description.clone()),
        details: Set(serde_json::to_value(&content.details)?),
        tags: Set(serde_json::to_value(&content.tags)?),
        points: Set(content.points),
        updated_at: Set(content.updated_at.into()),
        ..Default::default()
    })
}
