//! Event reads for everyone, and event management for the people who run them.

use crate::{
    auth::{
        backend::{Auth, CampusAuthBackend},
        current_actor, PermissionsTarget,
    },
    enrolment::{
        catalogue::{self, EventForm},
        evidence::{self, PDF_MIME},
        ledger::Removal,
        orchestrator, outside, projector,
    },
    error::CampusError,
    state::CampusState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use axum_login::permission_required;
use http::header;
use serde::Deserialize;
use serde_json::json;

#[axum::debug_handler]
async fn get_all_events(
    State(state): State<CampusState>,
) -> Result<impl IntoResponse, CampusError> {
    Ok(Json(projector::all_events(state.db()).await?))
}

#[axum::debug_handler]
async fn get_current_events(
    State(state): State<CampusState>,
) -> Result<impl IntoResponse, CampusError> {
    Ok(Json(projector::current_events(state.db()).await?))
}

#[axum::debug_handler]
async fn get_event(
    State(state): State<CampusState>,
    Path(event_id): Path<i32>,
) -> Result<impl IntoResponse, CampusError> {
    Ok(Json(projector::event(state.db(), event_id).await?))
}

#[axum::debug_handler]
async fn get_count(
    State(state): State<CampusState>,
    Path(event_id): Path<i32>,
) -> Result<impl IntoResponse, CampusError> {
    let count = projector::count_enrolments(state.db(), event_id).await?;
    Ok(Json(json!({ "event_id": event_id, "count": count })))
}

#[axum::debug_handler]
async fn post_event(
    auth: Auth,
    State(state): State<CampusState>,
    Json(form): Json<EventForm>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    let id = catalogue::create_event(state.db(), state.settings(), actor, form).await?;
    Ok(Json(json!({ "message": "Event created", "event_id": id })))
}

#[axum::debug_handler]
async fn put_event(
    auth: Auth,
    State(state): State<CampusState>,
    Path(event_id): Path<i32>,
    Json(form): Json<EventForm>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    catalogue::edit_event(state.db(), state.settings(), actor, event_id, form).await?;
    Ok(Json(json!({ "message": "Event updated" })))
}

#[axum::debug_handler]
async fn delete_event(
    auth: Auth,
    State(state): State<CampusState>,
    Path(event_id): Path<i32>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    let message = match catalogue::delete_event(state.db(), actor, event_id).await? {
        Removal::Deleted => "Event deleted",
        Removal::Disabled => "Event has enrolments, so it was closed instead",
    };
    Ok(Json(json!({ "message": message })))
}

#[axum::debug_handler]
async fn put_status(
    auth: Auth,
    State(state): State<CampusState>,
    Path(event_id): Path<i32>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    let status = projector::toggle_status(state.db(), actor, event_id).await?;
    Ok(Json(json!({ "message": "Status updated", "status": status })))
}

#[axum::debug_handler]
async fn get_my_events(
    auth: Auth,
    State(state): State<CampusState>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    Ok(Json(projector::events_created_by(state.db(), actor.id).await?))
}

#[axum::debug_handler]
async fn get_checklist(
    auth: Auth,
    State(state): State<CampusState>,
    Path(event_id): Path<i32>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    Ok(Json(orchestrator::checklist(state.db(), actor, event_id).await?))
}

#[axum::debug_handler]
async fn get_evidence(
    auth: Auth,
    State(state): State<CampusState>,
    Path((event_id, user_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    let bytes = evidence::fetch_evidence(state.db(), actor, event_id, user_id).await?;
    Ok(([(header::CONTENT_TYPE, PDF_MIME)], bytes))
}

#[axum::debug_handler]
async fn get_outside_review(
    auth: Auth,
    State(state): State<CampusState>,
    Path(outside_id): Path<i32>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    Ok(Json(outside::outside_view(state.db(), actor, outside_id).await?))
}

#[derive(Deserialize)]
struct Certification {
    status: bool,
    #[serde(default)]
    comment: String,
}

#[axum::debug_handler]
async fn put_certify(
    auth: Auth,
    State(state): State<CampusState>,
    Path((event_id, user_id)): Path<(i32, i32)>,
    Json(Certification { status, comment }): Json<Certification>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    orchestrator::certify(state.db(), actor, event_id, user_id, status, comment).await?;
    Ok(Json(json!({ "message": "Enrolment certified" })))
}

#[axum::debug_handler]
async fn post_close_full_events(
    State(state): State<CampusState>,
) -> Result<impl IntoResponse, CampusError> {
    let closed = projector::close_full_events(state.db()).await?;
    Ok(Json(json!({ "message": "Closed full events", "closed": closed })))
}

pub fn router() -> Router<CampusState> {
    Router::new()
        .route("/admin/close_full_events", post(post_close_full_events))
        .route_layer(permission_required!(
            CampusAuthBackend,
            PermissionsTarget::Administrate
        ))
        .route("/event", post(post_event))
        .route("/event/:id", put(put_event).delete(delete_event))
        .route("/status/:id", put(put_status))
        .route("/myevents", get(get_my_events))
        .route("/checklist/:id", get(get_checklist))
        .route("/file/:id/:user_id", get(get_evidence))
        .route("/certify/:id/:user_id", put(put_certify))
        .route("/review/outside/:id", get(get_outside_review))
        .route_layer(permission_required!(
            CampusAuthBackend,
            PermissionsTarget::ManageEvents
        ))
        .route("/events", get(get_all_events))
        .route("/events/current", get(get_current_events))
        .route("/event/:id", get(get_event))
        .route("/count/:id", get(get_count))
}
