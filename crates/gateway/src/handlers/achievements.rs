//! Achievement lifecycle handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::validate_request;
use crate::AppState;
use achievo_common::{
    errors::Result,
    lifecycle::{
        AchievementPatch, AchievementReference, AchievementSummary, AchievementType,
        AchievementView, ContentQuery, CreateAchievement, HistoryEvent, ListQuery, Paginated,
        SortField, SortOrder,
    },
    Actor,
};

/// Request body for a rejection
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RejectRequest {
    /// Blank notes are refused by the engine with a field-level error
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub rejection_note: String,
}

/// Query string of the content search endpoint
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SearchParams {
    pub student_id: Option<Uuid>,
    pub achievement_type: Option<String>,
    #[validate(length(max = 200))]
    pub q: Option<String>,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub order: SortOrder,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Create a draft achievement for the caller (or, for admins, a named student)
pub async fn create(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateAchievement>,
) -> Result<(StatusCode, Json<AchievementView>)> {
    let view = state.engine.create(&actor, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<AchievementView>> {
    Ok(Json(state.engine.get(&actor, id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(patch): Json<AchievementPatch>,
) -> Result<Json<AchievementView>> {
    Ok(Json(state.engine.update(&actor, id, patch).await?))
}

/// Soft delete; the content document is kept
pub async fn delete(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<AchievementReference>> {
    Ok(Json(state.engine.delete(&actor, id).await?))
}

pub async fn submit(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<AchievementReference>> {
    Ok(Json(state.engine.submit(&actor, id).await?))
}

pub async fn verify(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<AchievementReference>> {
    Ok(Json(state.engine.verify(&actor, id).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<AchievementReference>> {
    validate_request(&request)?;
    Ok(Json(
        state.engine.reject(&actor, id, &request.rejection_note).await?,
    ))
}

pub async fn history(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<HistoryEvent>>> {
    Ok(Json(state.engine.history(&actor, id).await?))
}

/// Everything the caller may list: all students for admins, advisees for advisors
pub async fn list_all(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<AchievementSummary>>> {
    Ok(Json(state.engine.list_all(&actor, query).await?))
}

pub async fn list_mine(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<AchievementSummary>>> {
    Ok(Json(state.engine.list_mine(&actor, query).await?))
}

pub async fn list_advisees(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<AchievementSummary>>> {
    Ok(Json(state.engine.list_for_advisees(&actor, query).await?))
}

/// Free-text search over content, scoped to what the caller may see
pub async fn search(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<SearchParams>,
) -> Result<Json<Paginated<AchievementSummary>>> {
    validate_request(&params)?;

    let achievement_type = params
        .achievement_type
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(str::parse::<AchievementType>)
        .transpose()?;

    let query = ContentQuery {
        student_ids: params.student_id.map(|id| vec![id]),
        achievement_type,
        text: params.q,
        sort: params.sort,
        order: params.order,
        page: state.engine.page_request(params.page, params.limit),
    };

    Ok(Json(state.engine.search(&actor, query).await?))
}
