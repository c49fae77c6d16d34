//! Storage for the service. Every operation the rest of the crate needs from the database goes
//! through [`CampusDb`], which is either a Postgres pool or an in-process set of tables.
//!
//! Capacity mutations go through [`LedgerTx`], a transaction that holds the lock on an event row
//! until it is committed. Dropping a [`LedgerTx`] without committing rolls it back.

pub mod memory;
pub mod postgres;

use crate::{
    auth::{register::Registrant, Role},
    error::CampusError,
    state::db_objects::{
        DbBranch, DbEnrolment, DbEvent, DbFaculty, DbOutside, DbStudent, DbTeacher, DbUser,
        EventDetails, NewEvent, NewOutside,
    },
};
use memory::{MemoryDb, MemoryTx};
use postgres::{PgStore, PgTx};

#[derive(Clone, Debug)]
pub enum CampusDb {
    Postgres(PgStore),
    Memory(MemoryDb),
}

macro_rules! on_backend {
    ($self:ident, $db:ident => $body:expr) => {
        match $self {
            Self::Postgres($db) => $body,
            Self::Memory($db) => $body,
        }
    };
}

impl CampusDb {
    pub async fn begin_ledger(&self) -> Result<LedgerTx, CampusError> {
        Ok(match self {
            Self::Postgres(pg) => LedgerTx::Postgres(pg.begin().await?),
            Self::Memory(mem) => LedgerTx::Memory(mem.begin().await?),
        })
    }

    //events
    pub async fn event_by_id(&self, event_id: i32) -> Result<Option<DbEvent>, CampusError> {
        on_backend!(self, db => db.event_by_id(event_id).await)
    }
    pub async fn all_events(&self) -> Result<Vec<DbEvent>, CampusError> {
        on_backend!(self, db => db.all_events().await)
    }
    pub async fn open_events(&self) -> Result<Vec<DbEvent>, CampusError> {
        on_backend!(self, db => db.open_events().await)
    }
    pub async fn events_by_creator(&self, creator: i32) -> Result<Vec<DbEvent>, CampusError> {
        on_backend!(self, db => db.events_by_creator(creator).await)
    }
    pub async fn create_event(&self, event: NewEvent) -> Result<i32, CampusError> {
        on_backend!(self, db => db.create_event(event).await)
    }
    pub async fn set_event_status(&self, event_id: i32, status: bool) -> Result<bool, CampusError> {
        on_backend!(self, db => db.set_event_status(event_id, status).await)
    }
    pub async fn close_full_events(&self) -> Result<u64, CampusError> {
        on_backend!(self, db => db.close_full_events().await)
    }

    //enrolments
    pub async fn enrolment(
        &self,
        event_id: i32,
        user_id: i32,
    ) -> Result<Option<DbEnrolment>, CampusError> {
        on_backend!(self, db => db.enrolment(event_id, user_id).await)
    }
    pub async fn enrolment_exists(&self, event_id: i32, user_id: i32) -> Result<bool, CampusError> {
        Ok(self.enrolment(event_id, user_id).await?.is_some())
    }
    pub async fn count_enrolments(&self, event_id: i32) -> Result<i64, CampusError> {
        on_backend!(self, db => db.count_enrolments(event_id).await)
    }
    pub async fn enrolments_for_event(
        &self,
        event_id: i32,
    ) -> Result<Vec<DbEnrolment>, CampusError> {
        on_backend!(self, db => db.enrolments_for_event(event_id).await)
    }
    pub async fn enrolments_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<DbEnrolment>, CampusError> {
        on_backend!(self, db => db.enrolments_for_user(user_id).await)
    }
    pub async fn certify_enrolment(
        &self,
        event_id: i32,
        user_id: i32,
        status: bool,
        comment: String,
    ) -> Result<bool, CampusError> {
        on_backend!(self, db => db.certify_enrolment(event_id, user_id, status, comment).await)
    }
    pub async fn set_evidence_file(
        &self,
        event_id: i32,
        user_id: i32,
        path: Option<String>,
    ) -> Result<bool, CampusError> {
        on_backend!(self, db => db.set_evidence_file(event_id, user_id, path).await)
    }

    //outside activities
    pub async fn create_outside(&self, outside: NewOutside) -> Result<i32, CampusError> {
        on_backend!(self, db => db.create_outside(outside).await)
    }
    pub async fn outside_by_id(&self, outside_id: i32) -> Result<Option<DbOutside>, CampusError> {
        on_backend!(self, db => db.outside_by_id(outside_id).await)
    }
    pub async fn outsides_for_user(&self, user_id: i32) -> Result<Vec<DbOutside>, CampusError> {
        on_backend!(self, db => db.outsides_for_user(user_id).await)
    }

    //people
    pub async fn student_by_user_id(&self, user_id: i32) -> Result<Option<DbStudent>, CampusError> {
        on_backend!(self, db => db.student_by_user_id(user_id).await)
    }
    pub async fn teacher_by_user_id(&self, user_id: i32) -> Result<Option<DbTeacher>, CampusError> {
        on_backend!(self, db => db.teacher_by_user_id(user_id).await)
    }
    pub async fn user_by_email(&self, email: &str) -> Result<Option<DbUser>, CampusError> {
        on_backend!(self, db => db.user_by_email(email).await)
    }
    pub async fn user_by_id(&self, user_id: i32) -> Result<Option<DbUser>, CampusError> {
        on_backend!(self, db => db.user_by_id(user_id).await)
    }
    pub async fn register(
        &self,
        email: String,
        hashed_password: String,
        registrant: Registrant,
    ) -> Result<i32, CampusError> {
        on_backend!(self, db => db.register(email, hashed_password, registrant).await)
    }
    pub async fn set_role(&self, user_id: i32, role: Role) -> Result<bool, CampusError> {
        on_backend!(self, db => db.set_role(user_id, role).await)
    }

    //directory
    pub async fn branch_exists(&self, branch_id: i32) -> Result<bool, CampusError> {
        on_backend!(self, db => db.branch_exists(branch_id).await)
    }
    pub async fn branch_by_id(&self, branch_id: i32) -> Result<Option<DbBranch>, CampusError> {
        on_backend!(self, db => db.branch_by_id(branch_id).await)
    }
    pub async fn branches(&self, faculty_id: Option<i32>) -> Result<Vec<DbBranch>, CampusError> {
        on_backend!(self, db => db.branches(faculty_id).await)
    }
    pub async fn faculty_by_id(&self, faculty_id: i32) -> Result<Option<DbFaculty>, CampusError> {
        on_backend!(self, db => db.faculty_by_id(faculty_id).await)
    }
    pub async fn faculties(&self) -> Result<Vec<DbFaculty>, CampusError> {
        on_backend!(self, db => db.faculties().await)
    }
}

/// A transaction holding the lock on one event row.
pub enum LedgerTx {
    Postgres(PgTx),
    Memory(MemoryTx),
}

impl LedgerTx {
    /// Locks the event row for the rest of the transaction. `None` if there is no such event.
    pub async fn lock_event(&mut self, event_id: i32) -> Result<Option<DbEvent>, CampusError> {
        on_backend!(self, tx => tx.lock_event(event_id).await)
    }
    pub async fn enrolment_exists(
        &mut self,
        event_id: i32,
        user_id: i32,
    ) -> Result<bool, CampusError> {
        on_backend!(self, tx => tx.enrolment_exists(event_id, user_id).await)
    }
    pub async fn count_enrolments(&mut self, event_id: i32) -> Result<i64, CampusError> {
        on_backend!(self, tx => tx.count_enrolments(event_id).await)
    }
    pub async fn set_free_space(
        &mut self,
        event_id: i32,
        free_space: i32,
    ) -> Result<(), CampusError> {
        on_backend!(self, tx => tx.set_free_space(event_id, free_space).await)
    }
    pub async fn set_status(&mut self, event_id: i32, status: bool) -> Result<(), CampusError> {
        on_backend!(self, tx => tx.set_status(event_id, status).await)
    }
    pub async fn update_event_details(
        &mut self,
        event_id: i32,
        details: EventDetails,
    ) -> Result<(), CampusError> {
        on_backend!(self, tx => tx.update_event_details(event_id, details).await)
    }
    pub async fn insert_enrolment(&mut self, enrolment: &DbEnrolment) -> Result<(), CampusError> {
        on_backend!(self, tx => tx.insert_enrolment(enrolment).await)
    }
    /// Returns how many rows went, which is 0 or 1.
    pub async fn delete_enrolment(
        &mut self,
        event_id: i32,
        user_id: i32,
    ) -> Result<u64, CampusError> {
        on_backend!(self, tx => tx.delete_enrolment(event_id, user_id).await)
    }
    pub async fn delete_event(&mut self, event_id: i32) -> Result<(), CampusError> {
        on_backend!(self, tx => tx.delete_event(event_id).await)
    }
    pub async fn commit(self) -> Result<(), CampusError> {
        on_backend!(self, tx => tx.commit().await)
    }
}
