//! PostgreSQL reference store
//!
//! Single-row reads go to the primary so transitions never start from a
//! lagging replica. List queries may use the replica.

use super::models::{
    achievement_reference, ReferenceColumn, ReferenceEntity, StudentColumn, StudentEntity,
};
use super::DbPool;
use crate::errors::Result;
use crate::lifecycle::{AchievementReference, AchievementStatus, PageRequest, StatusFilter};
use crate::store::ReferenceStore;
use async_trait::async_trait;
use sea_orm::sea_query::{Query, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

fn status_condition(filter: StatusFilter) -> SimpleExpr {
    match filter {
        StatusFilter::Visible => ReferenceColumn::Status.ne(AchievementStatus::Deleted.as_str()),
        StatusFilter::Exactly(status) => ReferenceColumn::Status.eq(status.as_str()),
    }
}

fn into_domain(rows: Vec<achievement_reference::Model>) -> Result<Vec<AchievementReference>> {
    rows.into_iter().map(achievement_reference::Model::into_domain).collect()
}

#[derive(Clone)]
pub struct PgReferenceStore {
    pool: DbPool,
}

impl PgReferenceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

#[async_trait]
impl ReferenceStore for PgReferenceStore {
    async fn create(&self, reference: &AchievementReference) -> Result<()> {
        achievement_reference::new_row(reference)
            .insert(self.write_conn())
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AchievementReference>> {
        ReferenceEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .map(achievement_reference::Model::into_domain)
            .transpose()
    }

    async fn get_by_content_id(&self, content_id: Uuid) -> Result<Option<AchievementReference>> {
        ReferenceEntity::find()
            .filter(ReferenceColumn::ContentId.eq(content_id))
            .one(self.write_conn())
            .await?
            .map(achievement_reference::Model::into_domain)
            .transpose()
    }

    async fn update(
        &self,
        reference: &AchievementReference,
        expected: AchievementStatus,
    ) -> Result<bool> {
        // Compare-and-swap on status
        let result = ReferenceEntity::update_many()
            .set(achievement_reference::state_changes(reference))
            .filter(ReferenceColumn::Id.eq(reference.id))
            .filter(ReferenceColumn::Status.eq(expected.as_str()))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn list_by_student(
        &self,
        student_id: Uuid,
        filter: StatusFilter,
    ) -> Result<Vec<AchievementReference>> {
        let rows = ReferenceEntity::find()
            .filter(ReferenceColumn::StudentId.eq(student_id))
            .filter(status_condition(filter))
            .order_by_desc(ReferenceColumn::CreatedAt)
            .all(self.read_conn())
            .await?;

        into_domain(rows)
    }

    async fn list_by_advisor(
        &self,
        lecturer_id: Uuid,
        filter: StatusFilter,
    ) -> Result<Vec<AchievementReference>> {
        let advisees = Query::select()
            .column(StudentColumn::Id)
            .from(StudentEntity)
            .and_where(StudentColumn::AdvisorId.eq(lecturer_id))
            .to_owned();

        let rows = ReferenceEntity::find()
            .filter(ReferenceColumn::StudentId.in_subquery(advisees))
            .filter(status_condition(filter))
            .order_by_desc(ReferenceColumn::CreatedAt)
            .all(self.read_conn())
            .await?;

        into_domain(rows)
    }

    async fn list_all(
        &self,
        filter: StatusFilter,
        page: PageRequest,
    ) -> Result<(Vec<AchievementReference>, u64)> {
        let paginator = ReferenceEntity::find()
            .filter(status_condition(filter))
            .order_by_desc(ReferenceColumn::CreatedAt)
            .order_by_asc(ReferenceColumn::Id)
            .paginate(self.read_conn(), page.limit);

        let total = paginator.num_items().await?;
        if page.offset() >= total {
            return Ok((Vec::new(), total));
        }
        let rows = paginator.fetch_page(page.page.saturating_sub(1)).await?;

        Ok((into_domain(rows)?, total))
    }

    async fn is_owned_by(&self, id: Uuid, student_id: Uuid) -> Result<bool> {
        let count = ReferenceEntity::find()
            .filter(ReferenceColumn::Id.eq(id))
            .filter(ReferenceColumn::StudentId.eq(student_id))
            .count(self.write_conn())
            .await?;

        Ok(count > 0)
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}
