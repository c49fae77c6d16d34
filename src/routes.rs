pub mod directory;
pub mod events;
pub mod participation;

use crate::{
    auth::{login, register},
    cfg::Settings,
    state::CampusState,
};
use axum::Router;

//room for multipart boundaries and headers around the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(settings: &Settings) -> Router<CampusState> {
    Router::new()
        .merge(login::router())
        .merge(register::router())
        .merge(events::router())
        .merge(participation::router(
            settings.uploads.max_bytes + MULTIPART_OVERHEAD,
        ))
        .merge(directory::router())
}
