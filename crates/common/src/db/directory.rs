//! PostgreSQL directory
//!
//! Always reads the primary: advisor reassignment and account deactivation
//! must take effect on the very next request.

use super::models::{
    LecturerColumn, LecturerEntity, RoleEntity, StudentColumn, StudentEntity, UserEntity,
};
use super::DbPool;
use crate::errors::{AppError, Result};
use crate::store::{Directory, Lecturer, Student, UserProfile};
use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgDirectory {
    pool: DbPool,
}

impl PgDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn user_by_id(&self, id: Uuid) -> Result<Option<UserProfile>> {
        let Some((user, role)) = UserEntity::find_by_id(id)
            .find_also_related(RoleEntity)
            .one(self.conn())
            .await?
        else {
            return Ok(None);
        };

        let role = role.ok_or_else(|| AppError::Integrity {
            message: format!("user {} references a missing role", user.id),
        })?;

        Ok(Some(UserProfile {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            role_name: role.name,
            is_active: user.is_active,
        }))
    }

    async fn student_by_user_id(&self, user_id: Uuid) -> Result<Option<Student>> {
        Ok(StudentEntity::find()
            .filter(StudentColumn::UserId.eq(user_id))
            .one(self.conn())
            .await?
            .map(Student::from))
    }

    async fn student_by_id(&self, id: Uuid) -> Result<Option<Student>> {
        Ok(StudentEntity::find_by_id(id)
            .one(self.conn())
            .await?
            .map(Student::from))
    }

    async fn lecturer_by_user_id(&self, user_id: Uuid) -> Result<Option<Lecturer>> {
        Ok(LecturerEntity::find()
            .filter(LecturerColumn::UserId.eq(user_id))
            .one(self.conn())
            .await?
            .map(Lecturer::from))
    }

    async fn lecturer_by_id(&self, id: Uuid) -> Result<Option<Lecturer>> {
        Ok(LecturerEntity::find_by_id(id)
            .one(self.conn())
            .await?
            .map(Lecturer::from))
    }

    async fn is_advisor_of(&self, lecturer_id: Uuid, student_id: Uuid) -> Result<bool> {
        let count = StudentEntity::find()
            .filter(StudentColumn::Id.eq(student_id))
            .filter(StudentColumn::AdvisorId.eq(lecturer_id))
            .count(self.conn())
            .await?;

        Ok(count > 0)
    }

    async fn advisee_ids(&self, lecturer_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = StudentEntity::find()
            .select_only()
            .column(StudentColumn::Id)
            .filter(StudentColumn::AdvisorId.eq(lecturer_id))
            .into_tuple::<Uuid>()
            .all(self.conn())
            .await?;

        Ok(ids)
    }

    async fn assign_advisor(&self, student_id: Uuid, lecturer_id: Option<Uuid>) -> Result<bool> {
        let result = StudentEntity::update_many()
            .col_expr(StudentColumn::AdvisorId, Expr::value(lecturer_id))
            .filter(StudentColumn::Id.eq(student_id))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected == 1)
    }
}
