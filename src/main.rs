#![warn(clippy::all, clippy::pedantic)]

#[macro_use]
extern crate tracing;

use campus_events::{
    app,
    auth::pg_session::PostgresSessionStore,
    cfg::Settings,
    maintenance::{spawn_close_full_events, spawn_session_cleanup},
    state::{
        db::{postgres::PgStore, CampusDb},
        CampusState,
    },
};
use sqlx::postgres::PgPoolOptions;
use std::{env::var, time::Duration};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() {
    let env_file = dotenvy::dotenv();
    init_tracing();
    if let Err(e) = env_file {
        warn!(?e, "No .env file loaded");
    }

    let settings = Settings::new().await.expect("unable to load settings");
    debug!(?settings, "Loaded settings");

    let db_url = var("DATABASE_URL").expect("DB URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&db_url)
        .await
        .expect("cannot connect to DB");
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("unable to run migrations");

    let db = CampusDb::Postgres(PgStore::new(pool.clone(), settings.lock_timeout()));
    let sessions = PostgresSessionStore::new(pool);
    let state = CampusState::new(db, settings.clone());

    let close_full_events = spawn_close_full_events(
        state.clone(),
        Duration::from_secs(settings.maintenance.close_full_events_every_secs.max(1)),
    );
    let session_cleanup = spawn_session_cleanup(
        &state,
        sessions.clone(),
        Duration::from_secs(settings.maintenance.session_cleanup_every_secs.max(1)),
    );

    let addr = format!("{}:{}", settings.server.bind_address, settings.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .expect("unable to bind to address");
    info!(%addr, "Serving");

    axum::serve(listener, app(state.clone(), sessions))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("unable to serve");

    state.send_stop_msg();
    let (close, cleanup) = tokio::join!(close_full_events, session_cleanup);
    if let Err(e) = close.and(cleanup) {
        error!(?e, "Background task panicked");
    }
    info!("Stopped");
}
