//! In-memory stores
//!
//! Backed by `tokio::sync::RwLock` maps. Used by the test suites of both
//! crates, with a few failure knobs for exercising the compensation paths.

use super::{ContentStore, Directory, Lecturer, ReferenceStore, Student, UserProfile};
use crate::errors::{AppError, Result};
use crate::lifecycle::{
    AchievementContent, AchievementReference, AchievementStatus, Attachment, ContentQuery,
    NewContent, PageRequest, SortField, SortOrder, StatusFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

fn newest_first(a: &AchievementReference, b: &AchievementReference) -> CmpOrdering {
    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
}

// ============================================================================
// Directory
// ============================================================================

#[derive(Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<Uuid, UserProfile>>,
    students: RwLock<HashMap<Uuid, Student>>,
    lecturers: RwLock<HashMap<Uuid, Lecturer>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: UserProfile) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn add_student(&self, student: Student) {
        self.students.write().await.insert(student.id, student);
    }

    pub async fn add_lecturer(&self, lecturer: Lecturer) {
        self.lecturers.write().await.insert(lecturer.id, lecturer);
    }

    pub async fn set_user_active(&self, user_id: Uuid, active: bool) {
        if let Some(user) = self.users.write().await.get_mut(&user_id) {
            user.is_active = active;
        }
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn user_by_id(&self, id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn student_by_user_id(&self, user_id: Uuid) -> Result<Option<Student>> {
        Ok(self
            .students
            .read()
            .await
            .values()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn student_by_id(&self, id: Uuid) -> Result<Option<Student>> {
        Ok(self.students.read().await.get(&id).cloned())
    }

    async fn lecturer_by_user_id(&self, user_id: Uuid) -> Result<Option<Lecturer>> {
        Ok(self
            .lecturers
            .read()
            .await
            .values()
            .find(|l| l.user_id == user_id)
            .cloned())
    }

    async fn lecturer_by_id(&self, id: Uuid) -> Result<Option<Lecturer>> {
        Ok(self.lecturers.read().await.get(&id).cloned())
    }

    async fn is_advisor_of(&self, lecturer_id: Uuid, student_id: Uuid) -> Result<bool> {
        Ok(self
            .students
            .read()
            .await
            .get(&student_id)
            .is_some_and(|s| s.advisor_id == Some(lecturer_id)))
    }

    async fn advisee_ids(&self, lecturer_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .students
            .read()
            .await
            .values()
            .filter(|s| s.advisor_id == Some(lecturer_id))
            .map(|s| s.id)
            .collect())
    }

    async fn assign_advisor(&self, student_id: Uuid, lecturer_id: Option<Uuid>) -> Result<bool> {
        match self.students.write().await.get_mut(&student_id) {
            Some(student) => {
                student.advisor_id = lecturer_id;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// Reference store
// ============================================================================

pub struct InMemoryReferenceStore {
    rows: RwLock<HashMap<Uuid, AchievementReference>>,
    directory: Arc<InMemoryDirectory>,
    fail_next_create: AtomicBool,
    creates: AtomicUsize,
}

impl InMemoryReferenceStore {
    /// The directory backs `list_by_advisor`, like the student join in SQL
    pub fn new(directory: Arc<InMemoryDirectory>) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            directory,
            fail_next_create: AtomicBool::new(false),
            creates: AtomicUsize::new(0),
        }
    }

    /// Make the next `create` fail with an upstream error
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    /// Successful creates so far
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl ReferenceStore for InMemoryReferenceStore {
    async fn create(&self, reference: &AchievementReference) -> Result<()> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(AppError::Upstream {
                message: "reference store unavailable".to_string(),
            });
        }

        let mut rows = self.rows.write().await;
        if rows.contains_key(&reference.id) {
            return Err(AppError::Integrity {
                message: format!("reference {} already exists", reference.id),
            });
        }
        rows.insert(reference.id, reference.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AchievementReference>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn get_by_content_id(&self, content_id: Uuid) -> Result<Option<AchievementReference>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|r| r.content_id == content_id)
            .cloned())
    }

    async fn update(
        &self,
        reference: &AchievementReference,
        expected: AchievementStatus,
    ) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&reference.id) {
            Some(current) if current.status() == expected => {
                current.state = reference.state.clone();
                current.updated_at = reference.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_student(
        &self,
        student_id: Uuid,
        filter: StatusFilter,
    ) -> Result<Vec<AchievementReference>> {
        let mut refs: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.student_id == student_id && filter.matches(r.status()))
            .cloned()
            .collect();
        refs.sort_by(newest_first);
        Ok(refs)
    }

    async fn list_by_advisor(
        &self,
        lecturer_id: Uuid,
        filter: StatusFilter,
    ) -> Result<Vec<AchievementReference>> {
        let advisees = self.directory.advisee_ids(lecturer_id).await?;
        let mut refs: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|r| advisees.contains(&r.student_id) && filter.matches(r.status()))
            .cloned()
            .collect();
        refs.sort_by(newest_first);
        Ok(refs)
    }

    async fn list_all(
        &self,
        filter: StatusFilter,
        page: PageRequest,
    ) -> Result<(Vec<AchievementReference>, u64)> {
        let mut refs: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|r| filter.matches(r.status()))
            .cloned()
            .collect();
        refs.sort_by(newest_first);
        let total = refs.len() as u64;
        Ok((page.slice(refs), total))
    }

    async fn is_owned_by(&self, id: Uuid, student_id: Uuid) -> Result<bool> {
        Ok(self
            .rows
            .read()
            .await
            .get(&id)
            .is_some_and(|r| r.student_id == student_id))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Content store
// ============================================================================

#[derive(Default)]
pub struct InMemoryContentStore {
    rows: RwLock<HashMap<Uuid, AchievementContent>>,
    fail_deletes: AtomicBool,
    delete_attempts: AtomicUsize,
    creates: AtomicUsize,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `delete` fail with an upstream error
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Delete calls so far, failed ones included
    pub fn delete_attempts(&self) -> usize {
        self.delete_attempts.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Insert a document as-is, bypassing id assignment
    pub async fn insert(&self, content: AchievementContent) {
        self.rows.write().await.insert(content.id, content);
    }

    pub async fn remove(&self, id: Uuid) {
        self.rows.write().await.remove(&id);
    }
}

fn compare(a: &AchievementContent, b: &AchievementContent, sort: SortField) -> CmpOrdering {
    match sort {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Points => a.points.cmp(&b.points),
        SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn create(&self, content: NewContent) -> Result<AchievementContent> {
        let now = Utc::now();
        let doc = AchievementContent {
            id: Uuid::new_v4(),
            student_id: content.student_id,
            achievement_type: content.achievement_type,
            title: content.title,
            description: content.description,
            details: content.details,
            attachments: Vec::new(),
            tags: content.tags,
            points: content.points,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.insert(doc.id, doc.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(doc)
    }

    async fn get(&self, id: Uuid) -> Result<Option<AchievementContent>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn update(&self, content: &AchievementContent) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&content.id) {
            Some(current) => {
                // id, owner, attachments and created_at are not replaceable here
                current.achievement_type = content.achievement_type;
                current.title = content.title.clone();
                current.description = content.description.clone();
                current.details = content.details.clone();
                current.tags = content.tags.clone();
                current.points = content.points;
                current.updated_at = content.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.delete_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Upstream {
                message: "content store unavailable".to_string(),
            });
        }
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<AchievementContent>> {
        let rows = self.rows.read().await;
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn add_attachment(
        &self,
        id: Uuid,
        attachment: &Attachment,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        match self.rows.write().await.get_mut(&id) {
            Some(doc) if doc.attachments.iter().any(|a| a.file_name == attachment.file_name) => {
                Ok(false)
            }
            Some(doc) => {
                doc.attachments.push(attachment.clone());
                doc.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_attachment(
        &self,
        id: Uuid,
        file_name: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        match self.rows.write().await.get_mut(&id) {
            Some(doc) => {
                let before = doc.attachments.len();
                doc.attachments.retain(|a| a.file_name != file_name);
                if doc.attachments.len() == before {
                    return Ok(false);
                }
                doc.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn search(&self, query: &ContentQuery) -> Result<(Vec<AchievementContent>, u64)> {
        let text = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let mut hits: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|c| {
                query
                    .student_ids
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&c.student_id))
            })
            .filter(|c| query.achievement_type.map_or(true, |t| c.achievement_type == t))
            .filter(|c| text.map_or(true, |t| c.matches_text(t)))
            .cloned()
            .collect();

        hits.sort_by(|a, b| {
            let ord = compare(a, b, query.sort);
            match query.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = hits.len() as u64;
        Ok((query.page.slice(hits), total))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
