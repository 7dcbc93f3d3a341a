//! Achievement records and the request/response shapes built around them

use super::status::{AchievementStatus, AchievementType, WorkflowState};
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default page size for list surfaces
pub const DEFAULT_PAGE_LIMIT: u64 = 10;

/// Upper bound for page size
pub const MAX_PAGE_LIMIT: u64 = 100;

/// Authoritative workflow record for one achievement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementReference {
    pub id: Uuid,
    pub student_id: Uuid,
    pub content_id: Uuid,
    #[serde(flatten)]
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AchievementReference {
    pub fn draft(id: Uuid, student_id: Uuid, content_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            student_id,
            content_id,
            state: WorkflowState::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> AchievementStatus {
        self.state.status()
    }
}

/// Start/end of an organizational role or similar span
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Period {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

/// Type-specific sub-document. Every field is optional; which ones are used
/// depends on the achievement type.
///
/// The same shape doubles as the patch for updates, see [`AchievementDetails::merge`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AchievementDetails {
    // Competition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medal_type: Option<String>,

    // Publication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issn: Option<String>,

    // Organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,

    // Certification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,

    // Event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Empty strings leave the current value alone
fn merge_text(target: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        *target = Some(value);
    }
}

fn merge_value<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

impl AchievementDetails {
    /// Sparse merge. Text fields ignore empty strings, numbers and dates
    /// replace when present, `authors` replaces only when non-empty and
    /// `custom_fields` replaces wholesale.
    pub fn merge(&mut self, patch: AchievementDetails) {
        merge_text(&mut self.competition_name, patch.competition_name);
        merge_text(&mut self.competition_level, patch.competition_level);
        merge_value(&mut self.rank, patch.rank);
        merge_text(&mut self.medal_type, patch.medal_type);

        merge_text(&mut self.publication_type, patch.publication_type);
        merge_text(&mut self.publication_title, patch.publication_title);
        if !patch.authors.is_empty() {
            self.authors = patch.authors;
        }
        merge_text(&mut self.publisher, patch.publisher);
        merge_text(&mut self.issn, patch.issn);

        merge_text(&mut self.organization_name, patch.organization_name);
        merge_text(&mut self.position, patch.position);
        merge_value(&mut self.period, patch.period);

        merge_text(&mut self.certification_name, patch.certification_name);
        merge_text(&mut self.issued_by, patch.issued_by);
        merge_text(&mut self.certification_number, patch.certification_number);
        merge_value(&mut self.valid_until, patch.valid_until);

        merge_value(&mut self.event_date, patch.event_date);
        merge_text(&mut self.location, patch.location);
        merge_text(&mut self.organizer, patch.organizer);
        merge_value(&mut self.score, patch.score);

        merge_value(&mut self.custom_fields, patch.custom_fields);
    }
}

/// File metadata attached to a content document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Free-form achievement document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementContent {
    pub id: Uuid,
    pub student_id: Uuid,
    pub achievement_type: AchievementType,
    pub title: String,
    pub description: String,
    pub details: AchievementDetails,
    pub attachments: Vec<Attachment>,
    pub tags: Vec<String>,
    pub points: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AchievementContent {
    /// Case-insensitive match over title, description and tags
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }

    /// Apply an update patch in place. Validation happens before anything is
    /// changed, so a rejected patch leaves the document untouched.
    pub fn apply_patch(&mut self, patch: AchievementPatch) -> Result<()> {
        let achievement_type = patch
            .achievement_type
            .as_deref()
            .map(str::parse::<AchievementType>)
            .transpose()?;
        if let Some(points) = patch.points {
            validate_points(points)?;
        }

        if let Some(achievement_type) = achievement_type {
            self.achievement_type = achievement_type;
        }
        merge_text_required(&mut self.title, patch.title);
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(points) = patch.points {
            self.points = points;
        }
        if let Some(tags) = patch.tags {
            let tags = clean_tags(tags);
            if !tags.is_empty() {
                self.tags = tags;
            }
        }
        if let Some(details) = patch.details {
            self.details.merge(details);
        }

        Ok(())
    }
}

fn merge_text_required(target: &mut String, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        *target = value;
    }
}

fn validate_points(points: i32) -> Result<()> {
    if points < 0 {
        return Err(AppError::validation("points must not be negative", Some("points")));
    }
    Ok(())
}

/// Trim tags and drop blank ones
pub fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Content as handed to the content store, which assigns id and timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct NewContent {
    pub student_id: Uuid,
    pub achievement_type: AchievementType,
    pub title: String,
    pub description: String,
    pub details: AchievementDetails,
    pub tags: Vec<String>,
    pub points: i32,
}

/// Create payload
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAchievement {
    /// Client-chosen reference id; repeating a create with the same id is a no-op
    #[serde(default)]
    pub reference_id: Option<Uuid>,

    /// Target student, required for admins and optional for students
    #[serde(default)]
    pub student_id: Option<Uuid>,

    pub achievement_type: String,
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub details: AchievementDetails,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub points: i32,
}

impl CreateAchievement {
    /// Check every field without touching any store
    pub fn validate(&self) -> Result<AchievementType> {
        let achievement_type = self.achievement_type.parse::<AchievementType>()?;
        if self.title.trim().is_empty() {
            return Err(AppError::validation("title is required", Some("title")));
        }
        validate_points(self.points)?;
        Ok(achievement_type)
    }

    pub fn into_content(self, student_id: Uuid, achievement_type: AchievementType) -> NewContent {
        NewContent {
            student_id,
            achievement_type,
            title: self.title.trim().to_string(),
            description: self.description,
            details: self.details,
            tags: clean_tags(self.tags),
            points: self.points,
        }
    }
}

/// Update payload; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AchievementPatch {
    #[serde(default)]
    pub achievement_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub points: Option<i32>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub details: Option<AchievementDetails>,
}

/// Reference plus content, as returned by single-achievement reads
#[derive(Debug, Clone, Serialize)]
pub struct AchievementView {
    #[serde(flatten)]
    pub reference: AchievementReference,
    pub content: AchievementContent,
}

/// Short student description attached to list rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentBrief {
    pub id: Uuid,
    pub student_number: String,
    pub full_name: String,
    pub program_study: String,
}

/// A lecturer's advisee with their verified achievement count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisee {
    #[serde(flatten)]
    pub student: StudentBrief,
    pub academic_year: String,
    pub verified_achievements: u64,
}

/// One row of a list surface
#[derive(Debug, Clone, Serialize)]
pub struct AchievementSummary {
    #[serde(flatten)]
    pub reference: AchievementReference,
    /// `None` when the linked content is missing
    pub content: Option<AchievementContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentBrief>,
}

/// Clamped page/limit pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Page clamps to at least 1, limit to `[1, MAX_PAGE_LIMIT]`, default 10
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self::with_bounds(page, limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT)
    }

    /// Page is also capped so the row offset fits in an `i64`; pages past
    /// the data come back empty.
    pub fn with_bounds(
        page: Option<i64>,
        limit: Option<i64>,
        default_limit: u64,
        max_limit: u64,
    ) -> Self {
        let max_limit = max_limit.max(1);
        let limit = match limit {
            Some(limit) => (limit.max(1) as u64).min(max_limit),
            None => default_limit.clamp(1, max_limit),
        };
        let max_page = i64::MAX as u64 / limit;
        let page = (page.unwrap_or(1).max(1) as u64).min(max_page);
        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Slice an already-materialized result set
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(usize::try_from(self.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(self.limit).unwrap_or(usize::MAX))
            .collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A page of results with totals
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, page: PageRequest, total: u64) -> Self {
        Self {
            items,
            page: page.page,
            limit: page.limit,
            total,
            total_pages: total.div_ceil(page.limit),
        }
    }

    pub fn empty(page: PageRequest) -> Self {
        Self::new(Vec::new(), page, 0)
    }
}

/// Which references a list call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Everything except soft-deleted references
    Visible,
    Exactly(AchievementStatus),
}

impl StatusFilter {
    /// `None` and blank strings mean "visible"; anything else must name a status
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(StatusFilter::Visible),
            Some(s) => Ok(StatusFilter::Exactly(s.parse()?)),
        }
    }

    pub fn matches(&self, status: AchievementStatus) -> bool {
        match self {
            StatusFilter::Visible => status != AchievementStatus::Deleted,
            StatusFilter::Exactly(expected) => status == *expected,
        }
    }
}

/// List surface parameters, as they arrive on the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Points,
    Title,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Content-store search
#[derive(Debug, Clone, Default)]
pub struct ContentQuery {
    /// Owning students to search within; `None` means unrestricted
    pub student_ids: Option<Vec<Uuid>>,
    pub achievement_type: Option<AchievementType>,
    /// Case-insensitive text over title, description and tags
    pub text: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Created,
    Submitted,
    Verified,
    Rejected,
    Deleted,
}

/// One derived entry of an achievement's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEvent {
    pub kind: HistoryKind,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl HistoryEvent {
    pub fn at(kind: HistoryKind, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            at,
            actor_id: None,
            actor_name: None,
            note: None,
        }
    }
}
