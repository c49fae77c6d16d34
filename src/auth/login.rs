use crate::{
    auth::{
        backend::{Auth, CampusAuthBackend},
        current_actor, profile,
    },
    error::{CampusError, LoginFailureReason},
    state::CampusState,
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_login::login_required;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize, Clone)]
pub struct LoginCreds {
    pub email: String,
    pub password: String,
}

#[axum::debug_handler(state = CampusState)]
async fn post_login(
    mut auth: Auth,
    Json(creds): Json<LoginCreds>,
) -> Result<impl IntoResponse, CampusError> {
    let email = creds.email.clone();

    let user = match auth.authenticate(creds).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return Err(CampusError::LoginFailure {
                reason: LoginFailureReason::UnknownEmail,
            })
        }
        Err(error) => {
            let error = CampusError::from(error);
            if matches!(error, CampusError::LoginFailure { .. }) {
                warn!(%email, "Wrong password for trying to login");
            }
            return Err(error);
        }
    };

    auth.login(&user).await?;
    info!(user_id = user.id, role = %user.role, "Logged in");

    Ok(Json(json!({
        "message": "Logged in",
        "user_id": user.id,
        "role": user.role,
    })))
}

#[axum::debug_handler(state = CampusState)]
async fn get_logout(mut auth: Auth) -> Result<impl IntoResponse, CampusError> {
    auth.logout().await?;
    Ok(Json(json!({ "message": "Logged out" })))
}

#[axum::debug_handler]
async fn get_me(
    auth: Auth,
    State(state): State<CampusState>,
) -> Result<impl IntoResponse, CampusError> {
    let actor = current_actor(&auth)?;
    Ok(Json(profile::whoami(state.db(), actor).await?))
}

pub fn router() -> Router<CampusState> {
    Router::new()
        .route("/logout", get(get_logout))
        .route("/me", get(get_me))
        .route_layer(login_required!(CampusAuthBackend))
        .route("/login", post(post_login))
}
