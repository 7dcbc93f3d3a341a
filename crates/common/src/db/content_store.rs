//! PostgreSQL content store
//!
//! Documents live in one JSONB-heavy table. Attachment edits are single
//! statements so concurrent uploads never overwrite each other.

use super::models::{achievement_content, ContentColumn, ContentEntity};
use crate::errors::Result;
use crate::lifecycle::{
    AchievementContent, Attachment, ContentQuery, NewContent, SortField, SortOrder,
};
use crate::store::ContentStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    Order, PaginatorTrait, QueryFilter, QueryOrder, Statement,
};
use uuid::Uuid;

const APPEND_ATTACHMENT: &str = r#"
    UPDATE achievement_contents
    SET attachments = attachments || $2::jsonb,
        updated_at = $3
    WHERE id = $1
      AND NOT EXISTS (
            SELECT 1
            FROM jsonb_array_elements(attachments) AS a
            WHERE a->>'file_name' = $4)
"#;

const REMOVE_ATTACHMENT: &str = r#"
    UPDATE achievement_contents
    SET attachments = COALESCE(
            (SELECT jsonb_agg(a)
             FROM jsonb_array_elements(attachments) AS a
             WHERE a->>'file_name' <> $2),
            '[]'::jsonb),
        updated_at = $3
    WHERE id = $1
      AND EXISTS (
            SELECT 1
            FROM jsonb_array_elements(attachments) AS a
            WHERE a->>'file_name' = $2)
"#;

/// Escape LIKE wildcards so user text matches literally
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn sort_column(field: SortField) -> ContentColumn {
    match field {
        SortField::CreatedAt => ContentColumn::CreatedAt,
        SortField::UpdatedAt => ContentColumn::UpdatedAt,
        SortField::Points => ContentColumn::Points,
        SortField::Title => ContentColumn::Title,
    }
}

fn sort_order(order: SortOrder) -> Order {
    match order {
        SortOrder::Asc => Order::Asc,
        SortOrder::Desc => Order::Desc,
    }
}

#[derive(Clone)]
pub struct PgContentStore {
    conn: DatabaseConnection,
}

impl PgContentStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn create(&self, content: NewContent) -> Result<AchievementContent> {
        let row = achievement_content::new_row(Uuid::new_v4(), content, Utc::now())?
            .insert(&self.conn)
            .await?;
        row.into_domain()
    }

    async fn get(&self, id: Uuid) -> Result<Option<AchievementContent>> {
        ContentEntity::find_by_id(id)
            .one(&self.conn)
            .await?
            .map(achievement_content::Model::into_domain)
            .transpose()
    }

    async fn update(&self, content: &AchievementContent) -> Result<bool> {
        let result = ContentEntity::update_many()
            .set(achievement_content::changes(content)?)
            .filter(ContentColumn::Id.eq(content.id))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = ContentEntity::delete_by_id(id).exec(&self.conn).await?;
        Ok(result.rows_affected == 1)
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<AchievementContent>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        ContentEntity::find()
            .filter(ContentColumn::Id.is_in(ids.iter().copied()))
            .all(&self.conn)
            .await?
            .into_iter()
            .map(achievement_content::Model::into_domain)
            .collect()
    }

    async fn add_attachment(
        &self,
        id: Uuid,
        attachment: &Attachment,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let appended = serde_json::to_value([attachment])?;
        let result = self
            .conn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                APPEND_ATTACHMENT,
                [
                    id.into(),
                    appended.into(),
                    at.into(),
                    attachment.file_name.clone().into(),
                ],
            ))
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_attachment(
        &self,
        id: Uuid,
        file_name: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = self
            .conn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                REMOVE_ATTACHMENT,
                [id.into(), file_name.into(), at.into()],
            ))
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn search(&self, query: &ContentQuery) -> Result<(Vec<AchievementContent>, u64)> {
        let mut select = ContentEntity::find();

        if let Some(ref ids) = query.student_ids {
            if ids.is_empty() {
                return Ok((Vec::new(), 0));
            }
            select = select.filter(ContentColumn::StudentId.is_in(ids.iter().copied()));
        }

        if let Some(achievement_type) = query.achievement_type {
            select = select.filter(ContentColumn::AchievementType.eq(achievement_type.as_str()));
        }

        if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = like_pattern(text);
            select = select.filter(Expr::cust_with_values(
                "(title ILIKE $1 OR description ILIKE $2 OR CAST(tags AS TEXT) ILIKE $3)",
                [pattern.clone(), pattern.clone(), pattern],
            ));
        }

        let paginator = select
            .order_by(sort_column(query.sort), sort_order(query.order))
            .order_by_asc(ContentColumn::Id)
            .paginate(&self.conn, query.page.limit);

        let total = paginator.num_items().await?;
        if query.page.offset() >= total {
            return Ok((Vec::new(), total));
        }
        let rows = paginator.fetch_page(query.page.page.saturating_sub(1)).await?;

        let items = rows
            .into_iter()
            .map(achievement_content::Model::into_domain)
            .collect::<Result<Vec<_>>>()?;

        Ok((items, total))
    }

    async fn ping(&self) -> Result<()> {
        super::ping_connection(&self.conn, "Content store").await
    }
}
