//! Every write to an event's `free_space` happens here, inside a [`LedgerTx`] that holds the
//! event's row lock. Returning early drops the transaction, which rolls it back.

use crate::{
    error::CampusError,
    state::{
        db::{CampusDb, LedgerTx},
        db_objects::{DbEnrolment, EventDetails},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    Disabled,
}

#[instrument(level = "debug", skip(db))]
pub async fn join(db: &CampusDb, event_id: i32, user_id: i32) -> Result<(), CampusError> {
    let mut tx = db.begin_ledger().await?;

    let Some(event) = tx.lock_event(event_id).await? else {
        return Err(CampusError::EventNotFound { event_id });
    };

    if tx.enrolment_exists(event_id, user_id).await? {
        return Err(CampusError::AlreadyJoined { event_id, user_id });
    }
    if event.free_space <= 0 {
        return Err(CampusError::NoFreeSpace { event_id });
    }

    tx.set_free_space(event_id, event.free_space - 1).await?;
    tx.insert_enrolment(&DbEnrolment {
        event_id,
        user_id,
        certifier: event.creator,
        status: false,
        comment: String::new(),
        file_pdf: None,
    })
    .await?;

    tx.commit().await?;
    trace!(free_space = event.free_space - 1, "Joined");
    Ok(())
}

#[instrument(level = "debug", skip(db))]
pub async fn unjoin(db: &CampusDb, event_id: i32, user_id: i32) -> Result<(), CampusError> {
    let mut tx = db.begin_ledger().await?;

    let Some(event) = tx.lock_event(event_id).await? else {
        return Err(CampusError::EventNotFound { event_id });
    };

    if tx.delete_enrolment(event_id, user_id).await? == 0 {
        return Err(CampusError::NotAMember { event_id, user_id });
    }
    tx.set_free_space(event_id, event.free_space + 1).await?;

    tx.commit().await?;
    trace!(free_space = event.free_space + 1, "Left");
    Ok(())
}

/// Works out the `free_space` a new limit leaves, against the enrolment count read under the
/// lock, so concurrent joins are never lost. Reaching zero closes the event.
async fn apply_capacity(tx: &mut LedgerTx, event_id: i32, limit: i32) -> Result<i32, CampusError> {
    let enrolled = tx.count_enrolments(event_id).await?;
    let free_space = match i32::try_from(i64::from(limit) - enrolled) {
        Ok(free_space) if free_space >= 0 => free_space,
        _ => {
            return Err(CampusError::CapacityBelowEnrolled {
                requested: limit,
                enrolled,
            })
        }
    };

    tx.set_free_space(event_id, free_space).await?;
    if free_space == 0 {
        tx.set_status(event_id, false).await?;
    }
    Ok(free_space)
}

/// Rewrites an event's details and capacity together. If either is rejected, neither lands.
#[instrument(level = "debug", skip(db, details))]
pub async fn revise_event(
    db: &CampusDb,
    event_id: i32,
    limit: i32,
    details: EventDetails,
) -> Result<i32, CampusError> {
    let mut tx = db.begin_ledger().await?;

    if tx.lock_event(event_id).await?.is_none() {
        return Err(CampusError::EventNotFound { event_id });
    }
    tx.update_event_details(event_id, details).await?;
    let free_space = apply_capacity(&mut tx, event_id, limit).await?;

    tx.commit().await?;
    Ok(free_space)
}

/// Deletes an event nobody has enrolled on. Events with enrolments are closed instead.
#[instrument(level = "debug", skip(db))]
pub async fn remove_event(db: &CampusDb, event_id: i32) -> Result<Removal, CampusError> {
    let mut tx = db.begin_ledger().await?;

    if tx.lock_event(event_id).await?.is_none() {
        return Err(CampusError::EventNotFound { event_id });
    }

    let removal = if tx.count_enrolments(event_id).await? == 0 {
        tx.delete_event(event_id).await?;
        Removal::Deleted
    } else {
        tx.set_status(event_id, false).await?;
        Removal::Disabled
    };

    tx.commit().await?;
    Ok(removal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        db::memory::MemoryDb,
        db_objects::{EventDetails, NewEvent, StoredDescriptor},
    };
    use chrono::Utc;
    use std::time::Duration;

    fn details(event_name: &str) -> EventDetails {
        EventDetails {
            event_name: event_name.into(),
            start_date: Utc::now(),
            working_hour: 4,
            detail: String::new(),
            location: "Bang Saen".into(),
            descriptor: StoredDescriptor {
                allow_all_branch: true,
                allow_all_year: true,
                ..StoredDescriptor::default()
            },
        }
    }

    async fn db_with_event(limit: i32) -> (CampusDb, i32) {
        let db = CampusDb::Memory(MemoryDb::new(Duration::from_secs(1)));
        let id = db
            .create_event(NewEvent {
                creator: 77,
                limit,
                details: details("Beach clean-up"),
            })
            .await
            .unwrap();
        (db, id)
    }

    async fn free_space(db: &CampusDb, id: i32) -> i32 {
        db.event_by_id(id).await.unwrap().unwrap().free_space
    }

    #[tokio::test]
    async fn join_takes_a_seat_and_copies_the_certifier() {
        let (db, id) = db_with_event(3).await;
        join(&db, id, 10).await.unwrap();

        assert_eq!(free_space(&db, id).await, 2);
        let enrolment = db.enrolment(id, 10).await.unwrap().unwrap();
        assert_eq!(enrolment.certifier, 77);
        assert!(!enrolment.status);
        assert_eq!(enrolment.file_pdf, None);
    }

    #[tokio::test]
    async fn second_join_is_rejected_without_taking_another_seat() {
        let (db, id) = db_with_event(3).await;
        join(&db, id, 10).await.unwrap();
        let err = join(&db, id, 10).await.unwrap_err();

        assert!(matches!(err, CampusError::AlreadyJoined { user_id: 10, .. }));
        assert_eq!(free_space(&db, id).await, 2);
        assert_eq!(db.count_enrolments(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn full_event_rejects_and_leaves_no_row() {
        let (db, id) = db_with_event(1).await;
        join(&db, id, 1).await.unwrap();
        let err = join(&db, id, 2).await.unwrap_err();

        assert!(matches!(err, CampusError::NoFreeSpace { .. }));
        assert_eq!(free_space(&db, id).await, 0);
        assert!(db.enrolment(id, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unjoin_restores_the_seat() {
        let (db, id) = db_with_event(2).await;
        join(&db, id, 5).await.unwrap();
        unjoin(&db, id, 5).await.unwrap();

        assert_eq!(free_space(&db, id).await, 2);
        assert!(db.enrolment(id, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unjoin_of_a_stranger_changes_nothing() {
        let (db, id) = db_with_event(2).await;
        let err = unjoin(&db, id, 5).await.unwrap_err();

        assert!(matches!(err, CampusError::NotAMember { .. }));
        assert_eq!(free_space(&db, id).await, 2);
    }

    #[tokio::test]
    async fn missing_event() {
        let (db, id) = db_with_event(2).await;
        assert!(matches!(
            join(&db, id + 1, 1).await.unwrap_err(),
            CampusError::EventNotFound { .. }
        ));
        assert!(matches!(
            unjoin(&db, id + 1, 1).await.unwrap_err(),
            CampusError::EventNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn capacity_is_checked_against_enrolments() {
        let (db, id) = db_with_event(5).await;
        for user in 1..=3 {
            join(&db, id, user).await.unwrap();
        }

        let err = revise_event(&db, id, 2, details("Beach clean-up"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CampusError::CapacityBelowEnrolled {
                requested: 2,
                enrolled: 3
            }
        ));
        assert_eq!(free_space(&db, id).await, 2);

        assert_eq!(
            revise_event(&db, id, 10, details("Beach clean-up")).await.unwrap(),
            7
        );
        assert!(db.event_by_id(id).await.unwrap().unwrap().status);

        assert_eq!(
            revise_event(&db, id, 3, details("Beach clean-up")).await.unwrap(),
            0
        );
        assert!(!db.event_by_id(id).await.unwrap().unwrap().status);
    }

    #[tokio::test]
    async fn a_rejected_revision_keeps_details_and_capacity() {
        let (db, id) = db_with_event(4).await;
        for user in 1..=3 {
            join(&db, id, user).await.unwrap();
        }
        let mut lagoon = details("Lagoon clean-up");

        let err = revise_event(&db, id, 2, lagoon.clone()).await.unwrap_err();
        assert!(matches!(err, CampusError::CapacityBelowEnrolled { .. }));
        let event = db.event_by_id(id).await.unwrap().unwrap();
        assert_eq!(event.event_name, "Beach clean-up");
        assert_eq!(event.free_space, 1);

        lagoon.working_hour = 8;
        assert_eq!(revise_event(&db, id, 6, lagoon).await.unwrap(), 3);
        let event = db.event_by_id(id).await.unwrap().unwrap();
        assert_eq!(event.event_name, "Lagoon clean-up");
        assert_eq!(event.working_hour, 8);
        assert_eq!(event.free_space, 3);
    }

    #[tokio::test]
    async fn events_with_enrolments_are_only_disabled() {
        let (db, id) = db_with_event(5).await;
        join(&db, id, 1).await.unwrap();
        assert_eq!(remove_event(&db, id).await.unwrap(), Removal::Disabled);
        let event = db.event_by_id(id).await.unwrap().unwrap();
        assert!(!event.status);

        unjoin(&db, id, 1).await.unwrap();
        assert_eq!(remove_event(&db, id).await.unwrap(), Removal::Deleted);
        assert!(db.event_by_id(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn held_lock_surfaces_a_retryable_timeout() {
        let db = CampusDb::Memory(MemoryDb::new(Duration::from_millis(50)));
        let id = db
            .create_event(NewEvent {
                creator: 1,
                limit: 1,
                details: EventDetails {
                    event_name: "Held".into(),
                    start_date: Utc::now(),
                    working_hour: 1,
                    detail: String::new(),
                    location: String::new(),
                    descriptor: StoredDescriptor::default(),
                },
            })
            .await
            .unwrap();

        let mut holder = db.begin_ledger().await.unwrap();
        holder.lock_event(id).await.unwrap();

        let err = join(&db, id, 9).await.unwrap_err();
        assert!(err.is_retryable());
        drop(holder);

        join(&db, id, 9).await.unwrap();
    }
}
