//! Student handlers: per-student achievement lists and advisor assignment

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use achievo_common::{
    errors::Result,
    lifecycle::{AchievementSummary, ListQuery, Paginated},
    store::Student,
    Actor,
};

#[derive(Debug, Deserialize)]
pub struct AssignAdvisorRequest {
    /// Lecturer id; `null` clears the assignment
    pub advisor_id: Option<Uuid>,
}

/// Set or clear a student's advisor (admin only)
pub async fn assign_advisor(
    State(state): State<AppState>,
    actor: Actor,
    Path(student_id): Path<Uuid>,
    Json(request): Json<AssignAdvisorRequest>,
) -> Result<Json<Student>> {
    let student = state
        .engine
        .assign_advisor(&actor, student_id, request.advisor_id)
        .await?;
    Ok(Json(student))
}

/// One student's achievements, for the student, their advisor or an admin
pub async fn achievements(
    State(state): State<AppState>,
    actor: Actor,
    Path(student_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<AchievementSummary>>> {
    let page = state
        .engine
        .list_for_student(&actor, student_id, query)
        .await?;
    Ok(Json(page))
}
