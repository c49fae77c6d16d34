pub mod catalogue;
pub mod evidence;
pub mod ledger;
pub mod orchestrator;
pub mod outside;
pub mod permission;
pub mod projector;

use crate::{auth::Actor, error::CampusError, state::db_objects::DbEvent};

/// Only the event's creator, or an admin, may change it or certify its students.
pub fn ensure_manages(actor: Actor, event: &DbEvent) -> Result<(), CampusError> {
    if event.creator == actor.id || actor.is_admin() {
        Ok(())
    } else {
        Err(CampusError::NotCreator {
            event_id: event.id,
            user_id: actor.id,
        })
    }
}
