use super::{ensure_manages, ledger, permission::is_eligible};
use crate::{
    auth::Actor,
    error::CampusError,
    state::{db::CampusDb, db_objects::DbEnrolment},
};

/// Runs the cheap checks in order and then hands over to the ledger, which repeats the ones that
/// matter under the event lock.
#[instrument(level = "debug", skip(db))]
pub async fn join_event(db: &CampusDb, event_id: i32, user_id: i32) -> Result<(), CampusError> {
    let student = db
        .student_by_user_id(user_id)
        .await?
        .ok_or(CampusError::StudentNotFound { user_id })?;
    let event = db
        .event_by_id(event_id)
        .await?
        .ok_or(CampusError::EventNotFound { event_id })?;

    if !event.status {
        return Err(CampusError::EventClosed { event_id });
    }
    if db.enrolment_exists(event_id, user_id).await? {
        return Err(CampusError::AlreadyJoined { event_id, user_id });
    }
    if event.free_space <= 0 {
        return Err(CampusError::EventFull { event_id });
    }
    if !is_eligible(&event, &student)? {
        return Err(CampusError::NotEligible { event_id, user_id });
    }

    ledger::join(db, event_id, user_id).await?;
    info!(event_id, user_id, "Student joined event");
    Ok(())
}

/// Membership is checked by the ledger inside its own transaction.
#[instrument(level = "debug", skip(db))]
pub async fn unjoin_event(db: &CampusDb, event_id: i32, user_id: i32) -> Result<(), CampusError> {
    if db.student_by_user_id(user_id).await?.is_none() {
        return Err(CampusError::StudentNotFound { user_id });
    }
    if db.event_by_id(event_id).await?.is_none() {
        return Err(CampusError::EventNotFound { event_id });
    }

    ledger::unjoin(db, event_id, user_id).await?;
    info!(event_id, user_id, "Student left event");
    Ok(())
}

#[instrument(level = "debug", skip(db, comment))]
pub async fn certify(
    db: &CampusDb,
    actor: Actor,
    event_id: i32,
    user_id: i32,
    status: bool,
    comment: String,
) -> Result<(), CampusError> {
    let enrolment = db
        .enrolment(event_id, user_id)
        .await?
        .ok_or(CampusError::EnrolmentNotFound { event_id, user_id })?;

    if enrolment.certifier != actor.id && !actor.is_admin() {
        return Err(CampusError::NotCreator {
            event_id,
            user_id: actor.id,
        });
    }

    if !db
        .certify_enrolment(event_id, user_id, status, comment)
        .await?
    {
        return Err(CampusError::EnrolmentNotFound { event_id, user_id });
    }

    info!(event_id, user_id, status, "Certified enrolment");
    Ok(())
}

/// Everyone enrolled on an event, for its certifier.
pub async fn checklist(
    db: &CampusDb,
    actor: Actor,
    event_id: i32,
) -> Result<Vec<DbEnrolment>, CampusError> {
    let event = db
        .event_by_id(event_id)
        .await?
        .ok_or(CampusError::EventNotFound { event_id })?;
    ensure_manages(actor, &event)?;

    db.enrolments_for_event(event_id).await
}

pub async fn student_enrolments(
    db: &CampusDb,
    user_id: i32,
) -> Result<Vec<DbEnrolment>, CampusError> {
    if db.student_by_user_id(user_id).await?.is_none() {
        return Err(CampusError::StudentNotFound { user_id });
    }
    db.enrolments_for_user(user_id).await
}
