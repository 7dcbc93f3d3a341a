//! Store and collaborator contracts
//!
//! The engine only sees these traits. PostgreSQL implementations live in
//! [`crate::db`], in-memory ones in [`memory`].

pub mod memory;

use crate::errors::Result;
use crate::lifecycle::{
    AchievementContent, AchievementReference, AchievementStatus, Attachment, ContentQuery,
    NewContent, PageRequest, StatusFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Relational store of workflow records.
///
/// Lookups return `Ok(None)` for absent rows; `Err` is reserved for store
/// failures.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn create(&self, reference: &AchievementReference) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<AchievementReference>>;

    async fn get_by_content_id(&self, content_id: Uuid) -> Result<Option<AchievementReference>>;

    /// Replace the mutable fields of `reference` only if the stored status is
    /// still `expected`. Returns `false` when the guard fails or the row is gone.
    async fn update(
        &self,
        reference: &AchievementReference,
        expected: AchievementStatus,
    ) -> Result<bool>;

    async fn list_by_student(
        &self,
        student_id: Uuid,
        filter: StatusFilter,
    ) -> Result<Vec<AchievementReference>>;

    /// References of every student whose advisor is `lecturer_id`
    async fn list_by_advisor(
        &self,
        lecturer_id: Uuid,
        filter: StatusFilter,
    ) -> Result<Vec<AchievementReference>>;

    /// Newest first, with the total count across pages
    async fn list_all(
        &self,
        filter: StatusFilter,
        page: PageRequest,
    ) -> Result<(Vec<AchievementReference>, u64)>;

    async fn is_owned_by(&self, id: Uuid, student_id: Uuid) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

/// Document store of achievement content
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Persist new content, assigning its id and timestamps
    async fn create(&self, content: NewContent) -> Result<AchievementContent>;

    async fn get(&self, id: Uuid) -> Result<Option<AchievementContent>>;

    /// Replace the mutable fields. `false` when the document is gone.
    async fn update(&self, content: &AchievementContent) -> Result<bool>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Documents that exist among `ids`, in no particular order
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<AchievementContent>>;

    /// `false` when the document is missing or already holds an attachment
    /// with the same file name
    async fn add_attachment(
        &self,
        id: Uuid,
        attachment: &Attachment,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// `false` when the document or an attachment named `file_name` is missing
    async fn remove_attachment(
        &self,
        id: Uuid,
        file_name: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn search(&self, query: &ContentQuery) -> Result<(Vec<AchievementContent>, u64)>;

    async fn ping(&self) -> Result<()>;
}

/// Account record, as the directory knows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub user_id: Uuid,
    pub student_number: String,
    pub program_study: String,
    pub academic_year: String,
    pub advisor_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lecturer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lecturer_number: String,
    pub department: String,
}

/// Users, students, lecturers and the advisor relationship.
///
/// Every call reads current state; nothing here may be cached by callers.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn user_by_id(&self, id: Uuid) -> Result<Option<UserProfile>>;

    async fn student_by_user_id(&self, user_id: Uuid) -> Result<Option<Student>>;

    async fn student_by_id(&self, id: Uuid) -> Result<Option<Student>>;

    async fn lecturer_by_user_id(&self, user_id: Uuid) -> Result<Option<Lecturer>>;

    async fn lecturer_by_id(&self, id: Uuid) -> Result<Option<Lecturer>>;

    async fn is_advisor_of(&self, lecturer_id: Uuid, student_id: Uuid) -> Result<bool>;

    async fn advisee_ids(&self, lecturer_id: Uuid) -> Result<Vec<Uuid>>;

    /// Set or clear a student's advisor. `false` when the student is unknown.
    async fn assign_advisor(&self, student_id: Uuid, lecturer_id: Option<Uuid>) -> Result<bool>;
}

/// Metadata accompanying stored file bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_name: String,
    pub mime_type: String,
}

/// Blob storage for attachments. Size and type checks are the caller's job.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store the bytes and return the public URL
    async fn store(&self, bytes: &[u8], metadata: &FileMetadata) -> Result<String>;
}
