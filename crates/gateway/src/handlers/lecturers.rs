//! Lecturer handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use achievo_common::{
    errors::Result,
    lifecycle::{Advisee, Paginated},
    Actor,
};

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// A lecturer's advisees with verified counts (admin, or the lecturer)
pub async fn advisees(
    State(state): State<AppState>,
    actor: Actor,
    Path(lecturer_id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> Result<Json<Paginated<Advisee>>> {
    let page = state.engine.page_request(params.page, params.limit);
    Ok(Json(state.engine.advisees(&actor, lecturer_id, page).await?))
}
