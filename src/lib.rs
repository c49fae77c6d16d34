#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::items_after_statements,
    clippy::missing_errors_doc
)]

#[macro_use]
extern crate tracing;

pub mod auth;
pub mod cfg;
pub mod enrolment;
pub mod error;
pub mod maintenance;
pub mod routes;
pub mod state;

use auth::backend::CampusAuthBackend;
use axum::Router;
use axum_login::{
    tower_sessions::{Expiry, SessionManagerLayer, SessionStore},
    AuthManagerLayerBuilder,
};
use state::CampusState;
use tower_http::trace::TraceLayer;

/// The whole HTTP surface, with sessions kept in `session_store`.
pub fn app<S: SessionStore + Clone>(state: CampusState, session_store: S) -> Router {
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(12)));
    let auth_layer =
        AuthManagerLayerBuilder::new(CampusAuthBackend::new(state.db().clone()), session_layer)
            .build();

    routes::router(state.settings())
        .layer(auth_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
