//! Background jobs. Each one runs until the state's stop message arrives.

use crate::{enrolment::projector, state::CampusState};
use axum_login::tower_sessions::ExpiredDeletion;
use std::time::Duration;
use tokio::{task::JoinHandle, time::interval};

/// Periodically closes events that have run out of seats.
pub fn spawn_close_full_events(state: CampusState, every: Duration) -> JoinHandle<()> {
    let mut stop_rx = state.stop_receiver();

    tokio::spawn(async move {
        let mut ticker = interval(every);

        loop {
            tokio::select! {
                _stop = stop_rx.recv() => {
                    info!("Close full events task stopping");
                    return;
                },
                _ = ticker.tick() => {
                    if let Err(e) = projector::close_full_events(state.db()).await {
                        error!(?e, "Error closing full events");
                    }
                }
            }
        }
    })
}

/// Periodically removes expired sessions from the store.
pub fn spawn_session_cleanup<S: ExpiredDeletion>(
    state: &CampusState,
    sessions: S,
    every: Duration,
) -> JoinHandle<()> {
    let mut stop_rx = state.stop_receiver();

    tokio::spawn(async move {
        let mut ticker = interval(every);

        loop {
            tokio::select! {
                _stop = stop_rx.recv() => {
                    info!("Session cleanup task stopping");
                    return;
                },
                _ = ticker.tick() => {
                    if let Err(e) = sessions.delete_expired().await {
                        error!(?e, "Error deleting expired sessions");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfg::Settings,
        enrolment::{fixtures::Campus, ledger, permission::EligibilityDescriptor},
    };

    #[tokio::test]
    async fn closes_on_the_first_tick_and_stops_when_asked() {
        let campus = Campus::new().await;
        let event = campus.event(1, EligibilityDescriptor::allow_everyone()).await;
        let student = campus.student(1, campus.branch, 1).await;
        ledger::join(&campus.db, event, student).await.unwrap();

        let state = CampusState::new(campus.db.clone(), Settings::defaults().unwrap());
        let handle = spawn_close_full_events(state.clone(), Duration::from_secs(3600));

        //the first tick of an interval is immediate
        let mut closed = false;
        for _ in 0..50 {
            if !campus.db.event_by_id(event).await.unwrap().unwrap().status {
                closed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(closed);

        state.send_stop_msg();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should stop")
            .unwrap();
    }
}
