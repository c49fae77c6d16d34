//! What students do with events: join, leave, and attach evidence. Also where they record
//! activities done away from campus.

use crate::{
    auth::{
        backend::{Auth, CampusAuthBackend},
        current_actor, PermissionsTarget,
    },
    enrolment::{
        evidence::{self, PDF_MIME},
        orchestrator,
        outside::{self, OutsideForm},
        projector,
    },
    error::CampusError,
    state::CampusState,
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use axum_login::permission_required;
use http::header;
use serde_json::json;

#[axum::debug_handler]
async fn post_join(
    auth: Auth,
    State(state): State<CampusState>,
    Path(event_id): Path<i32>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    orchestrator::join_event(state.db(), event_id, actor.id).await?;
    Ok(Json(json!({ "message": "Joined event successfully" })))
}

#[axum::debug_handler]
async fn delete_unjoin(
    auth: Auth,
    State(state): State<CampusState>,
    Path(event_id): Path<i32>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    orchestrator::unjoin_event(state.db(), event_id, actor.id).await?;
    Ok(Json(json!({ "message": "Left event successfully" })))
}

#[axum::debug_handler]
async fn get_allowed_events(
    auth: Auth,
    State(state): State<CampusState>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    Ok(Json(projector::allowed_events(state.db(), actor.id).await?))
}

#[axum::debug_handler]
async fn get_enrolments(
    auth: Auth,
    State(state): State<CampusState>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    Ok(Json(
        orchestrator::student_enrolments(state.db(), actor.id).await?,
    ))
}

#[axum::debug_handler]
async fn post_upload(
    auth: Auth,
    State(state): State<CampusState>,
    Path(event_id): Path<i32>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            trace!(name = ?field.name(), "Skipping multipart field");
            continue;
        }

        let content_type = field.content_type().map(ToString::to_string);
        let bytes = field.bytes().await?;
        evidence::store_evidence(
            state.db(),
            &state.settings().uploads,
            event_id,
            actor.id,
            content_type.as_deref(),
            &bytes,
        )
        .await?;

        return Ok(Json(json!({ "message": "File uploaded" })));
    }

    Err(CampusError::InvalidUpload {
        reason: "no field named `file` in the upload",
    })
}

#[axum::debug_handler]
async fn get_own_evidence(
    auth: Auth,
    State(state): State<CampusState>,
    Path(event_id): Path<i32>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    let bytes = evidence::fetch_evidence(state.db(), actor, event_id, actor.id).await?;
    Ok(([(header::CONTENT_TYPE, PDF_MIME)], bytes))
}

#[axum::debug_handler]
async fn post_outside(
    auth: Auth,
    State(state): State<CampusState>,
    Json(form): Json<OutsideForm>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    let id = outside::record_outside(state.db(), state.settings(), actor, form).await?;
    Ok(Json(json!({ "message": "Outside activity recorded", "outside_id": id })))
}

#[axum::debug_handler]
async fn get_outsides(
    auth: Auth,
    State(state): State<CampusState>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    Ok(Json(outside::student_outsides(state.db(), actor.id).await?))
}

#[axum::debug_handler]
async fn get_outside(
    auth: Auth,
    State(state): State<CampusState>,
    Path(outside_id): Path<i32>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    Ok(Json(outside::outside_view(state.db(), actor, outside_id).await?))
}

/// `upload_limit` bounds the whole multipart body, so it should leave some room above the largest
/// accepted file.
pub fn router(upload_limit: usize) -> Router<CampusState> {
    Router::new()
        .route(
            "/student/upload/:id",
            post(post_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/student/join/:id", post(post_join))
        .route("/student/unjoin/:id", delete(delete_unjoin))
        .route("/student/enrolments", get(get_enrolments))
        .route("/student/file/:id", get(get_own_evidence))
        .route("/events/allowed", get(get_allowed_events))
        .route("/outside", post(post_outside).get(get_outsides))
        .route("/outside/:id", get(get_outside))
        .route_layer(permission_required!(
            CampusAuthBackend,
            PermissionsTarget::JoinEvents
        ))
}
