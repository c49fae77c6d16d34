//! Read-side views of events, and the two ways an event's `status` changes outside joins.

use super::{ensure_manages, permission::EligibilityDescriptor};
use crate::{
    auth::Actor,
    error::CampusError,
    state::{db::CampusDb, db_objects::DbEvent},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EventView {
    pub id: i32,
    pub event_name: String,
    pub creator: i32,
    pub start_date: DateTime<Utc>,
    pub working_hour: i32,
    pub free_space: i32,
    /// `free_space` plus everyone enrolled. Computed on every read, never stored.
    pub limit: i64,
    pub detail: String,
    pub location: String,
    pub status: bool,
    #[serde(flatten)]
    pub eligibility: EligibilityDescriptor,
}

impl EventView {
    pub fn new(event: DbEvent, enrolled: i64) -> Result<Self, CampusError> {
        let eligibility = EligibilityDescriptor::of_event(&event)?;

        Ok(Self {
            limit: i64::from(event.free_space) + enrolled,
            id: event.id,
            event_name: event.event_name,
            creator: event.creator,
            start_date: event.start_date,
            working_hour: event.working_hour,
            free_space: event.free_space,
            detail: event.detail,
            location: event.location,
            status: event.status,
            eligibility,
        })
    }
}

pub async fn count_enrolments(db: &CampusDb, event_id: i32) -> Result<i64, CampusError> {
    if db.event_by_id(event_id).await?.is_none() {
        return Err(CampusError::EventNotFound { event_id });
    }
    db.count_enrolments(event_id).await
}

async fn project(db: &CampusDb, events: Vec<DbEvent>) -> Result<Vec<EventView>, CampusError> {
    let mut views = Vec::with_capacity(events.len());
    for event in events {
        let enrolled = db.count_enrolments(event.id).await?;
        views.push(EventView::new(event, enrolled)?);
    }
    Ok(views)
}

pub async fn event(db: &CampusDb, event_id: i32) -> Result<EventView, CampusError> {
    let event = db
        .event_by_id(event_id)
        .await?
        .ok_or(CampusError::EventNotFound { event_id })?;
    let enrolled = db.count_enrolments(event_id).await?;
    EventView::new(event, enrolled)
}

pub async fn all_events(db: &CampusDb) -> Result<Vec<EventView>, CampusError> {
    project(db, db.all_events().await?).await
}

pub async fn current_events(db: &CampusDb) -> Result<Vec<EventView>, CampusError> {
    project(db, db.open_events().await?).await
}

pub async fn events_created_by(db: &CampusDb, creator: i32) -> Result<Vec<EventView>, CampusError> {
    project(db, db.events_by_creator(creator).await?).await
}

/// Open events whose eligibility lets this student in.
pub async fn allowed_events(db: &CampusDb, user_id: i32) -> Result<Vec<EventView>, CampusError> {
    let student = db
        .student_by_user_id(user_id)
        .await?
        .ok_or(CampusError::StudentNotFound { user_id })?;

    let mut allowed = vec![];
    for event in db.open_events().await? {
        if EligibilityDescriptor::of_event(&event)?.admits(student.branch_id, student.year) {
            allowed.push(event);
        }
    }

    project(db, allowed).await
}

/// Flips an event between open and closed. Returns the new status.
#[instrument(level = "debug", skip(db))]
pub async fn toggle_status(
    db: &CampusDb,
    actor: Actor,
    event_id: i32,
) -> Result<bool, CampusError> {
    let mut tx = db.begin_ledger().await?;
    let event = tx
        .lock_event(event_id)
        .await?
        .ok_or(CampusError::EventNotFound { event_id })?;
    ensure_manages(actor, &event)?;

    let status = !event.status;
    tx.set_status(event_id, status).await?;
    tx.commit().await?;

    info!(event_id, status, "Toggled event status");
    Ok(status)
}

/// Closes every open event with no seats left.
#[instrument(level = "debug", skip(db))]
pub async fn close_full_events(db: &CampusDb) -> Result<u64, CampusError> {
    let closed = db.close_full_events().await?;
    if closed > 0 {
        info!(closed, "Closed full events");
    }
    Ok(closed)
}
