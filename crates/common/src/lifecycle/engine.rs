//! Achievement lifecycle engine
//!
//! Mediates every operation on achievements: checks the access policy,
//! enforces the state machine, and coordinates the two stores. Holds no state
//! of its own beyond store handles, so every call re-reads what it needs.
//!
//! Store ordering on create is content first, then reference. A failed
//! reference write triggers one best-effort delete of the new content; if that
//! fails too, the content is left orphaned and the original error is returned.

use super::model::*;
use super::policy::{self, Operation, Relationship};
use super::status::{AchievementStatus, Transition, WorkflowState};
use crate::auth::{Actor, Role};
use crate::config::PaginationConfig;
use crate::errors::{AppError, Result};
use crate::metrics::{record_access_denied, record_compensation, record_transition};
use crate::store::{ContentStore, Directory, ReferenceStore, Student};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Metric outcome label for an operation result
fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(AppError::Forbidden { .. }) => "denied",
        Err(AppError::InvalidStateTransition { .. } | AppError::OnlyDraftMutable { .. }) => {
            "conflict"
        }
        Err(AppError::Validation { .. }) => "invalid",
        Err(_) => "error",
    }
}

fn require_draft(reference: &AchievementReference) -> Result<()> {
    match reference.status() {
        AchievementStatus::Draft => Ok(()),
        current => Err(AppError::OnlyDraftMutable { current }),
    }
}

/// Soft-deleted references stay invisible to non-admins, even on request
fn hides_deleted(actor: &Actor, filter: StatusFilter) -> bool {
    !actor.is_admin() && filter == StatusFilter::Exactly(AchievementStatus::Deleted)
}

fn missing_content(reference: &AchievementReference) -> AppError {
    error!(
        reference_id = %reference.id,
        content_id = %reference.content_id,
        "Reference points at missing content"
    );
    AppError::Integrity {
        message: format!(
            "content {} of achievement {} is missing",
            reference.content_id, reference.id
        ),
    }
}

/// Attachment names identify files for removal, so they stay unique per
/// document: `cert.pdf` becomes `cert-2.pdf` when taken.
fn unique_file_name(existing: &[Attachment], wanted: &str) -> String {
    let taken = |name: &str| existing.iter().any(|a| a.file_name == name);
    if !taken(wanted) {
        return wanted.to_string();
    }

    let (stem, extension) = match wanted.rfind('.') {
        Some(dot) if dot > 0 => wanted.split_at(dot),
        _ => (wanted, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}{extension}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Lifecycle engine over injected stores
#[derive(Clone)]
pub struct AchievementEngine {
    references: Arc<dyn ReferenceStore>,
    contents: Arc<dyn ContentStore>,
    directory: Arc<dyn Directory>,
    pagination: PaginationConfig,
}

impl AchievementEngine {
    pub fn new(
        references: Arc<dyn ReferenceStore>,
        contents: Arc<dyn ContentStore>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            references,
            contents,
            directory,
            pagination: PaginationConfig::default(),
        }
    }

    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    /// Clamp raw page parameters to the configured bounds
    pub fn page_request(&self, page: Option<i64>, limit: Option<i64>) -> PageRequest {
        PageRequest::with_bounds(
            page,
            limit,
            self.pagination.default_limit,
            self.pagination.max_limit,
        )
    }

    /// Readiness of both stores
    pub async fn ping(&self) -> Result<()> {
        tokio::try_join!(self.references.ping(), self.contents.ping())?;
        Ok(())
    }

    // ========================================================================
    // Authorization
    // ========================================================================

    fn deny(&self, actor: &Actor, operation: &str, reference_id: Option<Uuid>) -> AppError {
        warn!(
            user_id = %actor.user_id,
            role = %actor.role_name,
            operation,
            reference_id = ?reference_id,
            "Access denied"
        );
        record_access_denied(operation);
        AppError::access_denied()
    }

    async fn relationship(&self, actor: &Actor, student_id: Uuid) -> Result<Relationship> {
        match actor.role {
            Role::Student => {
                let own = self.directory.student_by_user_id(actor.user_id).await?;
                Ok(match own {
                    Some(student) if student.id == student_id => Relationship::SelfOwned,
                    _ => Relationship::None,
                })
            }
            Role::Advisor => {
                let Some(lecturer) = self.directory.lecturer_by_user_id(actor.user_id).await? else {
                    return Ok(Relationship::None);
                };
                if self.directory.is_advisor_of(lecturer.id, student_id).await? {
                    Ok(Relationship::Advisee)
                } else {
                    Ok(Relationship::None)
                }
            }
            Role::Admin | Role::Other => Ok(Relationship::None),
        }
    }

    /// Load a reference the actor may perform `operation` on.
    ///
    /// Admins see "not found" for missing references. Everyone else gets the
    /// same denial for missing, deleted and foreign references.
    async fn load_authorized(
        &self,
        actor: &Actor,
        id: Uuid,
        operation: Operation,
    ) -> Result<AchievementReference> {
        let Some(reference) = self.references.get(id).await? else {
            if actor.is_admin() {
                return Err(AppError::AchievementNotFound { id: id.to_string() });
            }
            return Err(self.deny(actor, operation.as_str(), Some(id)));
        };

        if !actor.is_admin() && reference.status() == AchievementStatus::Deleted {
            return Err(self.deny(actor, operation.as_str(), Some(id)));
        }

        let relationship = self.relationship(actor, reference.student_id).await?;
        if !policy::can_access(actor.role, relationship, operation) {
            return Err(self.deny(actor, operation.as_str(), Some(id)));
        }

        Ok(reference)
    }

    async fn own_student(&self, actor: &Actor) -> Result<Student> {
        self.directory
            .student_by_user_id(actor.user_id)
            .await?
            .ok_or_else(|| AppError::Forbidden {
                message: "no student profile is linked to this account".to_string(),
            })
    }

    async fn own_lecturer_id(&self, actor: &Actor) -> Result<Uuid> {
        self.directory
            .lecturer_by_user_id(actor.user_id)
            .await?
            .map(|l| l.id)
            .ok_or_else(|| AppError::Forbidden {
                message: "no lecturer profile is linked to this account".to_string(),
            })
    }

    // ========================================================================
    // Store helpers
    // ========================================================================

    async fn load_content(&self, reference: &AchievementReference) -> Result<AchievementContent> {
        self.contents
            .get(reference.content_id)
            .await?
            .ok_or_else(|| missing_content(reference))
    }

    /// Explain a failed conditional write using the row as it is now
    async fn lost_race(&self, id: Uuid, required: AchievementStatus, draft_edit: bool) -> AppError {
        match self.references.get(id).await {
            Ok(Some(current)) if draft_edit => AppError::OnlyDraftMutable {
                current: current.status(),
            },
            Ok(Some(current)) => AppError::InvalidStateTransition {
                current: current.status(),
                required,
            },
            Ok(None) => AppError::AchievementNotFound { id: id.to_string() },
            Err(err) => err,
        }
    }

    /// Refresh `updated_at` on a draft, failing if it stopped being one
    async fn touch_draft(
        &self,
        reference: AchievementReference,
        now: DateTime<Utc>,
    ) -> Result<AchievementReference> {
        let touched = AchievementReference {
            updated_at: now,
            ..reference
        };
        if !self
            .references
            .update(&touched, AchievementStatus::Draft)
            .await?
        {
            return Err(self
                .lost_race(touched.id, AchievementStatus::Draft, true)
                .await);
        }
        Ok(touched)
    }

    async fn compensate_content(&self, content_id: Uuid, cause: &AppError) {
        warn!(
            content_id = %content_id,
            error = %cause,
            "Reference write failed, deleting new content"
        );
        match self.contents.delete(content_id).await {
            Ok(true) => record_compensation("deleted"),
            Ok(false) => {
                warn!(content_id = %content_id, "Content to compensate was already gone");
                record_compensation("missing");
            }
            Err(err) => {
                error!(
                    content_id = %content_id,
                    error = %err,
                    "Compensating delete failed, content is orphaned"
                );
                record_compensation("failed");
            }
        }
    }

    async fn student_brief(&self, student_id: Uuid) -> Result<Option<StudentBrief>> {
        match self.directory.student_by_id(student_id).await? {
            Some(student) => Ok(Some(self.brief_of(&student).await?)),
            None => Ok(None),
        }
    }

    async fn brief_of(&self, student: &Student) -> Result<StudentBrief> {
        let full_name = self
            .directory
            .user_by_id(student.user_id)
            .await?
            .map(|u| u.full_name)
            .unwrap_or_default();
        Ok(StudentBrief {
            id: student.id,
            student_number: student.student_number.clone(),
            full_name,
            program_study: student.program_study.clone(),
        })
    }

    async fn advisee_row(&self, student: Student) -> Result<Advisee> {
        let brief = self.brief_of(&student).await?;
        let verified = self
            .references
            .list_by_student(
                student.id,
                StatusFilter::Exactly(AchievementStatus::Verified),
            )
            .await?;
        Ok(Advisee {
            student: brief,
            academic_year: student.academic_year,
            verified_achievements: verified.len() as u64,
        })
    }

    async fn student_briefs(
        &self,
        student_ids: HashSet<Uuid>,
    ) -> Result<HashMap<Uuid, StudentBrief>> {
        let briefs = try_join_all(student_ids.into_iter().map(|id| self.student_brief(id))).await?;
        Ok(briefs.into_iter().flatten().map(|b| (b.id, b)).collect())
    }

    /// Join references with their content and, optionally, student briefs
    async fn summaries(
        &self,
        references: Vec<AchievementReference>,
        with_students: bool,
    ) -> Result<Vec<AchievementSummary>> {
        let content_ids: Vec<Uuid> = references.iter().map(|r| r.content_id).collect();
        let mut contents: HashMap<Uuid, AchievementContent> = self
            .contents
            .get_many(&content_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let students = if with_students {
            self.student_briefs(references.iter().map(|r| r.student_id).collect())
                .await?
        } else {
            HashMap::new()
        };

        Ok(references
            .into_iter()
            .map(|reference| {
                let content = contents.remove(&reference.content_id);
                if content.is_none() {
                    warn!(
                        reference_id = %reference.id,
                        content_id = %reference.content_id,
                        "Listed reference has no content"
                    );
                }
                let student = students.get(&reference.student_id).cloned();
                AchievementSummary {
                    reference,
                    content,
                    student,
                }
            })
            .collect())
    }

    /// Paginate a reference list, filtering by free text first when asked
    async fn page_of(
        &self,
        references: Vec<AchievementReference>,
        search: Option<&str>,
        page: PageRequest,
        with_students: bool,
    ) -> Result<Paginated<AchievementSummary>> {
        match search.map(str::trim).filter(|s| !s.is_empty()) {
            None => {
                let total = references.len() as u64;
                let rows = self.summaries(page.slice(references), with_students).await?;
                Ok(Paginated::new(rows, page, total))
            }
            Some(needle) => {
                let rows: Vec<_> = self
                    .summaries(references, with_students)
                    .await?
                    .into_iter()
                    .filter(|row| row.content.as_ref().is_some_and(|c| c.matches_text(needle)))
                    .collect();
                let total = rows.len() as u64;
                Ok(Paginated::new(page.slice(rows), page, total))
            }
        }
    }

    // ========================================================================
    // Create / read / update
    // ========================================================================

    #[instrument(skip(self, payload), fields(user_id = %actor.user_id, role = ?actor.role))]
    pub async fn create(
        &self,
        actor: &Actor,
        payload: CreateAchievement,
    ) -> Result<AchievementView> {
        let result = self.create_inner(actor, payload).await;
        record_transition("create", outcome(&result));
        result
    }

    async fn create_inner(
        &self,
        actor: &Actor,
        payload: CreateAchievement,
    ) -> Result<AchievementView> {
        if !policy::can_create(actor.role) {
            return Err(self.deny(actor, "create", None));
        }
        let achievement_type = payload.validate()?;

        let student = match actor.role {
            Role::Admin => {
                let id = payload.student_id.ok_or_else(|| {
                    AppError::validation("student_id is required", Some("student_id"))
                })?;
                self.directory
                    .student_by_id(id)
                    .await?
                    .ok_or_else(|| AppError::StudentNotFound { id: id.to_string() })?
            }
            _ => {
                let own = self.own_student(actor).await?;
                if payload.student_id.is_some_and(|requested| requested != own.id) {
                    return Err(self.deny(actor, "create", None));
                }
                own
            }
        };

        if let Some(reference_id) = payload.reference_id {
            if self.references.is_owned_by(reference_id, student.id).await? {
                let existing = self.references.get(reference_id).await?.ok_or_else(|| {
                    AppError::AchievementNotFound {
                        id: reference_id.to_string(),
                    }
                })?;
                debug!(
                    reference_id = %reference_id,
                    "Create replayed, returning existing achievement"
                );
                let content = self.load_content(&existing).await?;
                return Ok(AchievementView {
                    reference: existing,
                    content,
                });
            }
            if self.references.get(reference_id).await?.is_some() {
                return Err(AppError::validation(
                    "reference_id is already in use",
                    Some("reference_id"),
                ));
            }
        }

        let reference_id = payload.reference_id.unwrap_or_else(Uuid::new_v4);
        let content = self
            .contents
            .create(payload.into_content(student.id, achievement_type))
            .await?;

        let reference =
            AchievementReference::draft(reference_id, student.id, content.id, Utc::now());
        if let Err(err) = self.references.create(&reference).await {
            self.compensate_content(content.id, &err).await;
            return Err(err);
        }

        info!(
            reference_id = %reference.id,
            content_id = %content.id,
            student_id = %student.id,
            achievement_type = %content.achievement_type,
            "Achievement created"
        );

        Ok(AchievementView { reference, content })
    }

    #[instrument(skip(self), fields(user_id = %actor.user_id, reference_id = %id))]
    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<AchievementView> {
        let reference = self.load_authorized(actor, id, Operation::Read).await?;
        let content = self.load_content(&reference).await?;
        Ok(AchievementView { reference, content })
    }

    #[instrument(skip(self, patch), fields(user_id = %actor.user_id, reference_id = %id))]
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        patch: AchievementPatch,
    ) -> Result<AchievementView> {
        let result = self.update_inner(actor, id, patch).await;
        record_transition("update", outcome(&result));
        result
    }

    async fn update_inner(
        &self,
        actor: &Actor,
        id: Uuid,
        patch: AchievementPatch,
    ) -> Result<AchievementView> {
        let reference = self.load_authorized(actor, id, Operation::Update).await?;
        require_draft(&reference)?;

        let mut content = self.load_content(&reference).await?;
        content.apply_patch(patch)?;

        let now = Utc::now();
        let reference = self.touch_draft(reference, now).await?;
        content.updated_at = now;
        if !self.contents.update(&content).await? {
            return Err(missing_content(&reference));
        }

        info!(reference_id = %id, content_id = %content.id, "Achievement updated");
        Ok(AchievementView { reference, content })
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    async fn apply_transition(
        &self,
        actor: &Actor,
        id: Uuid,
        transition: Transition,
        operation: Operation,
    ) -> Result<AchievementReference> {
        let name = transition.name();
        let result = self.transition_inner(actor, id, transition, operation).await;
        record_transition(name, outcome(&result));
        result
    }

    async fn transition_inner(
        &self,
        actor: &Actor,
        id: Uuid,
        transition: Transition,
        operation: Operation,
    ) -> Result<AchievementReference> {
        let reference = self.load_authorized(actor, id, operation).await?;
        let from = reference.status();
        let now = Utc::now();
        let state = reference.state.apply(&transition, now)?;

        let updated = AchievementReference {
            state,
            updated_at: now,
            ..reference
        };

        // Status-guarded write: a concurrent transition makes this return false
        if !self.references.update(&updated, from).await? {
            return Err(self
                .lost_race(id, transition.required_state(), false)
                .await);
        }

        info!(
            reference_id = %id,
            transition = transition.name(),
            from = %from,
            to = %updated.status(),
            user_id = %actor.user_id,
            "Achievement transitioned"
        );

        Ok(updated)
    }

    #[instrument(skip(self), fields(user_id = %actor.user_id, reference_id = %id))]
    pub async fn submit(&self, actor: &Actor, id: Uuid) -> Result<AchievementReference> {
        self.apply_transition(actor, id, Transition::Submit, Operation::Submit)
            .await
    }

    #[instrument(skip(self), fields(user_id = %actor.user_id, reference_id = %id))]
    pub async fn verify(&self, actor: &Actor, id: Uuid) -> Result<AchievementReference> {
        self.apply_transition(
            actor,
            id,
            Transition::Verify { by: actor.user_id },
            Operation::Verify,
        )
        .await
    }

    /// The note is checked before anything is read
    #[instrument(skip(self, note), fields(user_id = %actor.user_id, reference_id = %id))]
    pub async fn reject(
        &self,
        actor: &Actor,
        id: Uuid,
        note: &str,
    ) -> Result<AchievementReference> {
        let note = note.trim();
        if note.is_empty() {
            record_transition("reject", "invalid");
            return Err(AppError::validation(
                "rejection note is required",
                Some("rejection_note"),
            ));
        }

        self.apply_transition(
            actor,
            id,
            Transition::Reject {
                by: actor.user_id,
                note: note.to_string(),
            },
            Operation::Reject,
        )
        .await
    }

    /// Soft delete: the reference becomes `deleted`, content stays in place
    #[instrument(skip(self), fields(user_id = %actor.user_id, reference_id = %id))]
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<AchievementReference> {
        self.apply_transition(actor, id, Transition::Delete, Operation::Delete)
            .await
    }

    // ========================================================================
    // History
    // ========================================================================

    async fn review_event(
        &self,
        kind: HistoryKind,
        at: DateTime<Utc>,
        by: Uuid,
        note: Option<String>,
    ) -> Result<HistoryEvent> {
        let actor_name = self.directory.user_by_id(by).await?.map(|u| u.full_name);
        Ok(HistoryEvent {
            kind,
            at,
            actor_id: Some(by),
            actor_name,
            note,
        })
    }

    /// Ordered events derived from the reference's timestamps
    #[instrument(skip(self), fields(user_id = %actor.user_id, reference_id = %id))]
    pub async fn history(&self, actor: &Actor, id: Uuid) -> Result<Vec<HistoryEvent>> {
        let reference = self.load_authorized(actor, id, Operation::Read).await?;

        let mut events = vec![HistoryEvent::at(HistoryKind::Created, reference.created_at)];
        if let Some(submitted_at) = reference.state.submitted_at() {
            events.push(HistoryEvent::at(HistoryKind::Submitted, submitted_at));
        }

        match &reference.state {
            WorkflowState::Verified {
                verified_at,
                verified_by,
                ..
            } => {
                events.push(
                    self.review_event(HistoryKind::Verified, *verified_at, *verified_by, None)
                        .await?,
                );
            }
            WorkflowState::Rejected {
                verified_at,
                verified_by,
                rejection_note,
                ..
            } => {
                events.push(
                    self.review_event(
                        HistoryKind::Rejected,
                        *verified_at,
                        *verified_by,
                        Some(rejection_note.clone()),
                    )
                    .await?,
                );
            }
            WorkflowState::Deleted => {
                events.push(HistoryEvent::at(HistoryKind::Deleted, reference.updated_at));
            }
            WorkflowState::Draft | WorkflowState::Submitted { .. } => {}
        }

        Ok(events)
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    /// Fails unless the actor could currently edit the achievement. Callers
    /// use this before storing uploaded bytes.
    pub async fn check_mutable(&self, actor: &Actor, id: Uuid) -> Result<AchievementReference> {
        let reference = self.load_authorized(actor, id, Operation::Update).await?;
        require_draft(&reference)?;
        Ok(reference)
    }

    #[instrument(
        skip(self, attachment),
        fields(user_id = %actor.user_id, reference_id = %id, file = %attachment.file_name)
    )]
    pub async fn add_attachment(
        &self,
        actor: &Actor,
        id: Uuid,
        attachment: Attachment,
    ) -> Result<AchievementContent> {
        let reference = self.check_mutable(actor, id).await?;
        let content = self.load_content(&reference).await?;
        let attachment = Attachment {
            file_name: unique_file_name(&content.attachments, &attachment.file_name),
            ..attachment
        };

        let now = Utc::now();
        let reference = self.touch_draft(reference, now).await?;
        if !self
            .contents
            .add_attachment(reference.content_id, &attachment, now)
            .await?
        {
            // Either the document vanished or a concurrent upload took the name
            self.load_content(&reference).await?;
            return Err(AppError::validation(
                format!("attachment '{}' already exists", attachment.file_name),
                Some("file_name"),
            ));
        }

        info!(reference_id = %id, file = %attachment.file_name, "Attachment added");
        self.load_content(&reference).await
    }

    #[instrument(skip(self), fields(user_id = %actor.user_id, reference_id = %id))]
    pub async fn remove_attachment(
        &self,
        actor: &Actor,
        id: Uuid,
        file_name: &str,
    ) -> Result<AchievementContent> {
        let reference = self.check_mutable(actor, id).await?;
        let content = self.load_content(&reference).await?;
        let not_found = || AppError::NotFound {
            resource_type: "attachment".to_string(),
            id: file_name.to_string(),
        };
        if !content.attachments.iter().any(|a| a.file_name == file_name) {
            return Err(not_found());
        }

        let now = Utc::now();
        let reference = self.touch_draft(reference, now).await?;
        if !self
            .contents
            .remove_attachment(reference.content_id, file_name, now)
            .await?
        {
            return Err(not_found());
        }

        info!(reference_id = %id, file = %file_name, "Attachment removed");
        self.load_content(&reference).await
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// The calling student's own achievements
    #[instrument(skip(self, query), fields(user_id = %actor.user_id))]
    pub async fn list_mine(
        &self,
        actor: &Actor,
        query: ListQuery,
    ) -> Result<Paginated<AchievementSummary>> {
        if actor.role != Role::Student {
            return Err(self.deny(actor, "list_mine", None));
        }
        let filter = StatusFilter::parse(query.status.as_deref())?;
        let page = self.page_request(query.page, query.limit);
        if hides_deleted(actor, filter) {
            return Ok(Paginated::empty(page));
        }

        let student = self.own_student(actor).await?;
        let references = self.references.list_by_student(student.id, filter).await?;
        self.page_of(references, query.search.as_deref(), page, false)
            .await
    }

    /// Achievements of the calling advisor's current advisees
    #[instrument(skip(self, query), fields(user_id = %actor.user_id))]
    pub async fn list_for_advisees(
        &self,
        actor: &Actor,
        query: ListQuery,
    ) -> Result<Paginated<AchievementSummary>> {
        if actor.role != Role::Advisor {
            return Err(self.deny(actor, "list_for_advisees", None));
        }
        let filter = StatusFilter::parse(query.status.as_deref())?;
        let page = self.page_request(query.page, query.limit);
        if hides_deleted(actor, filter) {
            return Ok(Paginated::empty(page));
        }

        let lecturer_id = self.own_lecturer_id(actor).await?;
        let references = self.references.list_by_advisor(lecturer_id, filter).await?;
        self.page_of(references, query.search.as_deref(), page, true)
            .await
    }

    /// One student's achievements, for whoever may read that student's
    /// records: the student, their current advisor, or an admin
    #[instrument(skip(self, query), fields(user_id = %actor.user_id, student_id = %student_id))]
    pub async fn list_for_student(
        &self,
        actor: &Actor,
        student_id: Uuid,
        query: ListQuery,
    ) -> Result<Paginated<AchievementSummary>> {
        let filter = StatusFilter::parse(query.status.as_deref())?;
        let page = self.page_request(query.page, query.limit);

        if self.directory.student_by_id(student_id).await?.is_none() {
            if actor.is_admin() {
                return Err(AppError::StudentNotFound {
                    id: student_id.to_string(),
                });
            }
            return Err(self.deny(actor, "list_for_student", None));
        }

        let relationship = self.relationship(actor, student_id).await?;
        if !policy::can_access(actor.role, relationship, Operation::Read) {
            return Err(self.deny(actor, "list_for_student", None));
        }
        if hides_deleted(actor, filter) {
            return Ok(Paginated::empty(page));
        }

        let references = self.references.list_by_student(student_id, filter).await?;
        self.page_of(references, query.search.as_deref(), page, true)
            .await
    }

    /// A lecturer's current advisees, ordered by student number. Admins may
    /// ask about any lecturer, advisors only about themselves.
    #[instrument(skip(self), fields(user_id = %actor.user_id, lecturer_id = %lecturer_id))]
    pub async fn advisees(
        &self,
        actor: &Actor,
        lecturer_id: Uuid,
        page: PageRequest,
    ) -> Result<Paginated<Advisee>> {
        match actor.role {
            Role::Admin => {
                self.directory
                    .lecturer_by_id(lecturer_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound {
                        resource_type: "lecturer".to_string(),
                        id: lecturer_id.to_string(),
                    })?;
            }
            Role::Advisor => {
                let own = self.directory.lecturer_by_user_id(actor.user_id).await?;
                if own.map(|l| l.id) != Some(lecturer_id) {
                    return Err(self.deny(actor, "advisees", None));
                }
            }
            Role::Student | Role::Other => return Err(self.deny(actor, "advisees", None)),
        }

        let ids = self.directory.advisee_ids(lecturer_id).await?;
        let mut students: Vec<Student> =
            try_join_all(ids.into_iter().map(|id| self.directory.student_by_id(id)))
                .await?
                .into_iter()
                .flatten()
                .collect();
        students.sort_by(|a, b| a.student_number.cmp(&b.student_number));

        let total = students.len() as u64;
        let rows = try_join_all(
            page.slice(students)
                .into_iter()
                .map(|student| self.advisee_row(student)),
        )
        .await?;
        Ok(Paginated::new(rows, page, total))
    }

    /// Admins page through every reference at the store. Advisors get their
    /// advisee list.
    #[instrument(skip(self, query), fields(user_id = %actor.user_id))]
    pub async fn list_all(
        &self,
        actor: &Actor,
        query: ListQuery,
    ) -> Result<Paginated<AchievementSummary>> {
        match actor.role {
            Role::Admin => {
                if query.search.as_deref().is_some_and(|s| !s.trim().is_empty()) {
                    return Err(AppError::validation(
                        "free-text search across all students goes through the search endpoint",
                        Some("search"),
                    ));
                }
                let filter = StatusFilter::parse(query.status.as_deref())?;
                let page = self.page_request(query.page, query.limit);
                let (references, total) = self.references.list_all(filter, page).await?;
                let rows = self.summaries(references, true).await?;
                Ok(Paginated::new(rows, page, total))
            }
            Role::Advisor => self.list_for_advisees(actor, query).await,
            Role::Student | Role::Other => Err(self.deny(actor, "list_all", None)),
        }
    }

    /// Content search scoped to the students the actor may see.
    ///
    /// Content without a reference is skipped, as are soft-deleted
    /// achievements for non-admins, so a page may hold fewer rows than `total`
    /// suggests.
    #[instrument(skip(self, query), fields(user_id = %actor.user_id))]
    pub async fn search(
        &self,
        actor: &Actor,
        query: ContentQuery,
    ) -> Result<Paginated<AchievementSummary>> {
        let scope = match actor.role {
            Role::Admin => query.student_ids.clone(),
            Role::Advisor => {
                let lecturer_id = self.own_lecturer_id(actor).await?;
                let advisees = self.directory.advisee_ids(lecturer_id).await?;
                Some(match &query.student_ids {
                    Some(requested) => advisees
                        .into_iter()
                        .filter(|id| requested.contains(id))
                        .collect(),
                    None => advisees,
                })
            }
            Role::Student => {
                let own = self.own_student(actor).await?;
                Some(match &query.student_ids {
                    Some(requested) if !requested.contains(&own.id) => Vec::new(),
                    _ => vec![own.id],
                })
            }
            Role::Other => return Err(self.deny(actor, "search", None)),
        };

        let page = query.page;
        if scope.as_ref().is_some_and(Vec::is_empty) {
            return Ok(Paginated::empty(page));
        }

        let scoped = ContentQuery {
            student_ids: scope,
            ..query
        };
        let (documents, total) = self.contents.search(&scoped).await?;
        let references = try_join_all(
            documents
                .iter()
                .map(|doc| self.references.get_by_content_id(doc.id)),
        )
        .await?;

        let mut rows = Vec::with_capacity(documents.len());
        for (content, reference) in documents.into_iter().zip(references) {
            match reference {
                None => debug!(content_id = %content.id, "Skipping content without a reference"),
                Some(reference)
                    if reference.status() == AchievementStatus::Deleted && !actor.is_admin() => {}
                Some(reference) => rows.push((reference, content)),
            }
        }

        let students = if actor.role == Role::Student {
            HashMap::new()
        } else {
            self.student_briefs(rows.iter().map(|(r, _)| r.student_id).collect())
                .await?
        };

        let items = rows
            .into_iter()
            .map(|(reference, content)| AchievementSummary {
                student: students.get(&reference.student_id).cloned(),
                reference,
                content: Some(content),
            })
            .collect();

        Ok(Paginated::new(items, page, total))
    }

    // ========================================================================
    // Advisor assignment
    // ========================================================================

    /// Set or clear a student's advisor. Takes effect on the next
    /// authorization decision.
    #[instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn assign_advisor(
        &self,
        actor: &Actor,
        student_id: Uuid,
        lecturer_id: Option<Uuid>,
    ) -> Result<Student> {
        if !actor.is_admin() {
            return Err(self.deny(actor, "assign_advisor", None));
        }

        let student_not_found = || AppError::StudentNotFound {
            id: student_id.to_string(),
        };

        self.directory
            .student_by_id(student_id)
            .await?
            .ok_or_else(student_not_found)?;

        if let Some(lecturer_id) = lecturer_id {
            self.directory
                .lecturer_by_id(lecturer_id)
                .await?
                .ok_or_else(|| AppError::NotFound {
                    resource_type: "lecturer".to_string(),
                    id: lecturer_id.to_string(),
                })?;
        }

        if !self.directory.assign_advisor(student_id, lecturer_id).await? {
            return Err(student_not_found());
        }

        info!(student_id = %student_id, advisor_id = ?lecturer_id, "Advisor assigned");

        self.directory
            .student_by_id(student_id)
            .await?
            .ok_or_else(student_not_found)
    }
}
