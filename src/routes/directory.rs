use crate::{error::CampusError, state::CampusState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

#[axum::debug_handler]
async fn get_faculties(State(state): State<CampusState>) -> Result<impl IntoResponse, CampusError> {
    Ok(Json(state.db().faculties().await?))
}

#[axum::debug_handler]
async fn get_branches(State(state): State<CampusState>) -> Result<impl IntoResponse, CampusError> {
    Ok(Json(state.db().branches(None).await?))
}

#[axum::debug_handler]
async fn get_branches_of_faculty(
    State(state): State<CampusState>,
    Path(faculty_id): Path<i32>,
) -> Result<impl IntoResponse, CampusError> {
    Ok(Json(state.db().branches(Some(faculty_id)).await?))
}

pub fn router() -> Router<CampusState> {
    Router::new()
        .route("/faculties", get(get_faculties))
        .route("/branches", get(get_branches))
        .route("/branches/faculty/:id", get(get_branches_of_faculty))
}
