//! Activities students did away from campus. They are recorded by the student and take no seats.

use super::catalogue::parse_start_date;
use crate::{
    auth::{profile::StudentSummary, Actor, PermissionsTarget},
    cfg::Settings,
    error::CampusError,
    state::{
        db::CampusDb,
        db_objects::{DbOutside, NewOutside},
    },
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone)]
pub struct OutsideForm {
    pub event_name: String,
    pub start_date: String,
    #[serde(default)]
    pub location: String,
    pub working_hour: i32,
    #[serde(default, alias = "intendent")]
    pub intendant: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct OutsideView {
    #[serde(flatten)]
    pub outside: DbOutside,
    pub student: StudentSummary,
}

#[instrument(level = "debug", skip(db, settings, form), fields(event_name = %form.event_name))]
pub async fn record_outside(
    db: &CampusDb,
    settings: &Settings,
    actor: Actor,
    form: OutsideForm,
) -> Result<i32, CampusError> {
    if form.event_name.trim().is_empty() {
        return Err(CampusError::InvalidRequest {
            reason: "activity name must not be empty".into(),
        });
    }
    if form.working_hour < 0 {
        return Err(CampusError::InvalidRequest {
            reason: "working hours must not be negative".into(),
        });
    }
    let start_date = parse_start_date(&form.start_date, settings)?;
    if db.student_by_user_id(actor.id).await?.is_none() {
        return Err(CampusError::StudentNotFound { user_id: actor.id });
    }

    let id = db
        .create_outside(NewOutside {
            user_id: actor.id,
            event_name: form.event_name,
            start_date,
            location: form.location,
            working_hour: form.working_hour,
            intendant: form.intendant,
        })
        .await?;
    info!(outside_id = id, user_id = actor.id, "Recorded outside activity");
    Ok(id)
}

/// The recording student sees their own activities, and anyone who manages events sees them all.
pub async fn outside_view(
    db: &CampusDb,
    actor: Actor,
    outside_id: i32,
) -> Result<OutsideView, CampusError> {
    let outside = db
        .outside_by_id(outside_id)
        .await?
        .ok_or(CampusError::OutsideNotFound { outside_id })?;

    if outside.user_id != actor.id && !actor.role.can().contains(&PermissionsTarget::ManageEvents)
    {
        return Err(CampusError::NotRecorder {
            outside_id,
            user_id: actor.id,
        });
    }

    let student = StudentSummary::load(db, outside.user_id).await?;
    Ok(OutsideView { outside, student })
}

/// Newest first.
pub async fn student_outsides(db: &CampusDb, user_id: i32) -> Result<Vec<DbOutside>, CampusError> {
    if db.student_by_user_id(user_id).await?.is_none() {
        return Err(CampusError::StudentNotFound { user_id });
    }
    db.outsides_for_user(user_id).await
}
