//! In-process backend. Committed tables sit behind an `RwLock` that is only ever held for the
//! length of one synchronous read or write, so plain reads never queue behind a ledger
//! transaction, the same way Postgres reads are not blocked by `SELECT ... FOR UPDATE`.
//!
//! Ledger transactions are serialised on a separate mutex (one for every event, so more coarsely
//! than a row lock). A [`MemoryTx`] works on its own copy of the tables and journals each write;
//! commit replays the journal onto the committed tables in one step. Dropping it discards both.

use crate::{
    auth::{register::Registrant, Role},
    error::CampusError,
    state::db_objects::{
        DbBranch, DbEnrolment, DbEvent, DbFaculty, DbOutside, DbStudent, DbTeacher, DbUser,
        EventDetails, NewEvent, NewOutside,
    },
};
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, OwnedMutexGuard, RwLock},
    time::timeout,
};

#[derive(Clone, Debug, Default)]
struct Tables {
    events: BTreeMap<i32, DbEvent>,
    enrolments: BTreeMap<(i32, i32), DbEnrolment>,
    outsides: BTreeMap<i32, DbOutside>,
    students: BTreeMap<i32, DbStudent>,
    teachers: BTreeMap<i32, DbTeacher>,
    users: BTreeMap<i32, DbUser>,
    branches: BTreeMap<i32, DbBranch>,
    faculties: BTreeMap<i32, DbFaculty>,
    last_event_id: i32,
    last_outside_id: i32,
    last_user_id: i32,
    last_directory_id: i32,
}

/// One staged write of a ledger transaction.
#[derive(Clone, Debug)]
enum LedgerWrite {
    FreeSpace { event_id: i32, free_space: i32 },
    Status { event_id: i32, status: bool },
    Details { event_id: i32, details: EventDetails },
    InsertEnrolment(DbEnrolment),
    DeleteEnrolment { event_id: i32, user_id: i32 },
    DeleteEvent(i32),
}

impl Tables {
    fn count_enrolments(&self, event_id: i32) -> i64 {
        let count = self
            .enrolments
            .range((event_id, i32::MIN)..=(event_id, i32::MAX))
            .count();
        i64::try_from(count).unwrap_or(i64::MAX)
    }

    fn event_mut(&mut self, event_id: i32) -> Result<&mut DbEvent, CampusError> {
        self.events
            .get_mut(&event_id)
            .ok_or(CampusError::EventNotFound { event_id })
    }

    fn apply(&mut self, write: &LedgerWrite) -> Result<(), CampusError> {
        match write {
            LedgerWrite::FreeSpace {
                event_id,
                free_space,
            } => self.event_mut(*event_id)?.free_space = *free_space,
            LedgerWrite::Status { event_id, status } => self.event_mut(*event_id)?.status = *status,
            LedgerWrite::Details { event_id, details } => {
                self.event_mut(*event_id)?.set_details(details.clone());
            }
            LedgerWrite::InsertEnrolment(enrolment) => {
                let key = (enrolment.event_id, enrolment.user_id);
                if self.enrolments.contains_key(&key) {
                    return Err(CampusError::AlreadyJoined {
                        event_id: key.0,
                        user_id: key.1,
                    });
                }
                self.enrolments.insert(key, enrolment.clone());
            }
            LedgerWrite::DeleteEnrolment { event_id, user_id } => {
                self.enrolments.remove(&(*event_id, *user_id));
            }
            LedgerWrite::DeleteEvent(event_id) => {
                self.events.remove(event_id);
            }
        }
        Ok(())
    }
}

impl DbEvent {
    fn set_details(&mut self, details: EventDetails) {
        self.event_name = details.event_name;
        self.start_date = details.start_date;
        self.working_hour = details.working_hour;
        self.detail = details.detail;
        self.location = details.location;
        self.allow_all_branch = details.descriptor.allow_all_branch;
        self.allow_all_year = details.descriptor.allow_all_year;
        self.branch_ids = details.descriptor.branch_ids;
        self.years = details.descriptor.years;
    }
}

#[derive(Clone, Debug)]
pub struct MemoryDb {
    tables: Arc<RwLock<Tables>>,
    ledger: Arc<Mutex<()>>,
    lock_timeout: Duration,
}

impl MemoryDb {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            ledger: Arc::new(Mutex::new(())),
            lock_timeout,
        }
    }

    pub async fn begin(&self) -> Result<MemoryTx, CampusError> {
        Ok(MemoryTx {
            tables: self.tables.clone(),
            ledger: self.ledger.clone(),
            lock_timeout: self.lock_timeout,
            guard: None,
            working: None,
            journal: vec![],
        })
    }

    //directory seeding, there are no routes that write faculties or branches
    pub async fn add_faculty(&self, faculty_code: &str, faculty_name: &str) -> i32 {
        let mut tables = self.tables.write().await;
        tables.last_directory_id += 1;
        let id = tables.last_directory_id;
        tables.faculties.insert(
            id,
            DbFaculty {
                id,
                faculty_code: faculty_code.to_string(),
                faculty_name: faculty_name.to_string(),
            },
        );
        id
    }

    pub async fn add_branch(&self, faculty_id: i32, branch_code: &str, branch_name: &str) -> i32 {
        let mut tables = self.tables.write().await;
        tables.last_directory_id += 1;
        let id = tables.last_directory_id;
        tables.branches.insert(
            id,
            DbBranch {
                id,
                branch_code: branch_code.to_string(),
                branch_name: branch_name.to_string(),
                faculty_id,
            },
        );
        id
    }

    pub async fn event_by_id(&self, event_id: i32) -> Result<Option<DbEvent>, CampusError> {
        Ok(self.tables.read().await.events.get(&event_id).cloned())
    }

    pub async fn all_events(&self) -> Result<Vec<DbEvent>, CampusError> {
        let mut events: Vec<_> = self.tables.read().await.events.values().cloned().collect();
        events.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(events)
    }

    pub async fn open_events(&self) -> Result<Vec<DbEvent>, CampusError> {
        let mut events: Vec<_> = self
            .tables
            .read()
            .await
            .events
            .values()
            .filter(|e| e.status)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_date);
        Ok(events)
    }

    pub async fn events_by_creator(&self, creator: i32) -> Result<Vec<DbEvent>, CampusError> {
        let mut events: Vec<_> = self
            .tables
            .read()
            .await
            .events
            .values()
            .filter(|e| e.creator == creator)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(events)
    }

    pub async fn create_event(
        &self,
        NewEvent {
            creator,
            limit,
            details,
        }: NewEvent,
    ) -> Result<i32, CampusError> {
        let mut tables = self.tables.write().await;
        tables.last_event_id += 1;
        let id = tables.last_event_id;

        let mut event = DbEvent {
            id,
            event_name: String::new(),
            creator,
            start_date: details.start_date,
            working_hour: 0,
            free_space: limit,
            detail: String::new(),
            location: String::new(),
            status: true,
            allow_all_branch: true,
            allow_all_year: true,
            branch_ids: String::new(),
            years: String::new(),
        };
        event.set_details(details);
        tables.events.insert(id, event);

        Ok(id)
    }

    pub async fn set_event_status(&self, event_id: i32, status: bool) -> Result<bool, CampusError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .events
            .get_mut(&event_id)
            .map(|e| e.status = status)
            .is_some())
    }

    pub async fn close_full_events(&self) -> Result<u64, CampusError> {
        let mut tables = self.tables.write().await;
        let mut closed = 0;
        for event in tables
            .events
            .values_mut()
            .filter(|e| e.free_space == 0 && e.status)
        {
            event.status = false;
            closed += 1;
        }
        Ok(closed)
    }

    pub async fn enrolment(
        &self,
        event_id: i32,
        user_id: i32,
    ) -> Result<Option<DbEnrolment>, CampusError> {
        Ok(self
            .tables
            .read()
            .await
            .enrolments
            .get(&(event_id, user_id))
            .cloned())
    }

    pub async fn count_enrolments(&self, event_id: i32) -> Result<i64, CampusError> {
        Ok(self.tables.read().await.count_enrolments(event_id))
    }

    pub async fn enrolments_for_event(
        &self,
        event_id: i32,
    ) -> Result<Vec<DbEnrolment>, CampusError> {
        Ok(self
            .tables
            .read()
            .await
            .enrolments
            .range((event_id, i32::MIN)..=(event_id, i32::MAX))
            .map(|(_, e)| e.clone())
            .collect())
    }

    pub async fn enrolments_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<DbEnrolment>, CampusError> {
        Ok(self
            .tables
            .read()
            .await
            .enrolments
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    pub async fn certify_enrolment(
        &self,
        event_id: i32,
        user_id: i32,
        status: bool,
        comment: String,
    ) -> Result<bool, CampusError> {
        let mut tables = self.tables.write().await;
        let Some(enrolment) = tables.enrolments.get_mut(&(event_id, user_id)) else {
            return Ok(false);
        };
        enrolment.status = status;
        enrolment.comment = comment;
        Ok(true)
    }

    pub async fn set_evidence_file(
        &self,
        event_id: i32,
        user_id: i32,
        path: Option<String>,
    ) -> Result<bool, CampusError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .enrolments
            .get_mut(&(event_id, user_id))
            .map(|e| e.file_pdf = path)
            .is_some())
    }

    pub async fn create_outside(&self, outside: NewOutside) -> Result<i32, CampusError> {
        let mut tables = self.tables.write().await;
        tables.last_outside_id += 1;
        let id = tables.last_outside_id;
        tables.outsides.insert(
            id,
            DbOutside {
                id,
                user_id: outside.user_id,
                event_name: outside.event_name,
                start_date: outside.start_date,
                location: outside.location,
                working_hour: outside.working_hour,
                intendant: outside.intendant,
                status: false,
                comment: String::new(),
            },
        );
        Ok(id)
    }

    pub async fn outside_by_id(&self, outside_id: i32) -> Result<Option<DbOutside>, CampusError> {
        Ok(self.tables.read().await.outsides.get(&outside_id).cloned())
    }

    pub async fn outsides_for_user(&self, user_id: i32) -> Result<Vec<DbOutside>, CampusError> {
        let mut outsides: Vec<_> = self
            .tables
            .read()
            .await
            .outsides
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        outsides.sort_by(|a, b| (b.start_date, b.id).cmp(&(a.start_date, a.id)));
        Ok(outsides)
    }

    pub async fn student_by_user_id(&self, user_id: i32) -> Result<Option<DbStudent>, CampusError> {
        Ok(self.tables.read().await.students.get(&user_id).cloned())
    }

    pub async fn teacher_by_user_id(&self, user_id: i32) -> Result<Option<DbTeacher>, CampusError> {
        Ok(self.tables.read().await.teachers.get(&user_id).cloned())
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<DbUser>, CampusError> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    pub async fn user_by_id(&self, user_id: i32) -> Result<Option<DbUser>, CampusError> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    pub async fn register(
        &self,
        email: String,
        hashed_password: String,
        registrant: Registrant,
    ) -> Result<i32, CampusError> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&email))
        {
            return Err(CampusError::EmailTaken { email });
        }

        tables.last_user_id += 1;
        let id = tables.last_user_id;
        tables.users.insert(
            id,
            DbUser {
                id,
                email,
                hashed_password,
                role: registrant.role(),
            },
        );

        match registrant {
            Registrant::Student(profile) => {
                tables.students.insert(id, profile.into_student(id));
            }
            Registrant::Teacher(profile) => {
                tables.teachers.insert(id, profile.into_teacher(id));
            }
        }

        Ok(id)
    }

    pub async fn set_role(&self, user_id: i32, role: Role) -> Result<bool, CampusError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .users
            .get_mut(&user_id)
            .map(|u| u.role = role)
            .is_some())
    }

    pub async fn branch_exists(&self, branch_id: i32) -> Result<bool, CampusError> {
        Ok(self.tables.read().await.branches.contains_key(&branch_id))
    }

    pub async fn branch_by_id(&self, branch_id: i32) -> Result<Option<DbBranch>, CampusError> {
        Ok(self.tables.read().await.branches.get(&branch_id).cloned())
    }

    pub async fn branches(&self, faculty_id: Option<i32>) -> Result<Vec<DbBranch>, CampusError> {
        Ok(self
            .tables
            .read()
            .await
            .branches
            .values()
            .filter(|b| faculty_id.map_or(true, |f| b.faculty_id == f))
            .cloned()
            .collect())
    }

    pub async fn faculty_by_id(&self, faculty_id: i32) -> Result<Option<DbFaculty>, CampusError> {
        Ok(self.tables.read().await.faculties.get(&faculty_id).cloned())
    }

    pub async fn faculties(&self) -> Result<Vec<DbFaculty>, CampusError> {
        Ok(self.tables.read().await.faculties.values().cloned().collect())
    }
}

pub struct MemoryTx {
    tables: Arc<RwLock<Tables>>,
    ledger: Arc<Mutex<()>>,
    lock_timeout: Duration,
    guard: Option<OwnedMutexGuard<()>>,
    working: Option<Tables>,
    journal: Vec<LedgerWrite>,
}

impl MemoryTx {
    async fn acquire(&mut self, event_id: i32) -> Result<&mut Tables, CampusError> {
        if self.guard.is_none() {
            let guard = timeout(self.lock_timeout, self.ledger.clone().lock_owned())
                .await
                .map_err(|_elapsed| CampusError::LockTimeout { event_id })?;
            self.working = Some(self.tables.read().await.clone());
            self.guard = Some(guard);
        }

        match self.working.as_mut() {
            Some(tables) => Ok(tables),
            None => Err(CampusError::LockTimeout { event_id }),
        }
    }

    async fn stage(&mut self, event_id: i32, write: LedgerWrite) -> Result<(), CampusError> {
        self.acquire(event_id).await?.apply(&write)?;
        self.journal.push(write);
        Ok(())
    }

    pub async fn lock_event(&mut self, event_id: i32) -> Result<Option<DbEvent>, CampusError> {
        Ok(self.acquire(event_id).await?.events.get(&event_id).cloned())
    }

    pub async fn enrolment_exists(
        &mut self,
        event_id: i32,
        user_id: i32,
    ) -> Result<bool, CampusError> {
        Ok(self
            .acquire(event_id)
            .await?
            .enrolments
            .contains_key(&(event_id, user_id)))
    }

    pub async fn count_enrolments(&mut self, event_id: i32) -> Result<i64, CampusError> {
        Ok(self.acquire(event_id).await?.count_enrolments(event_id))
    }

    pub async fn set_free_space(
        &mut self,
        event_id: i32,
        free_space: i32,
    ) -> Result<(), CampusError> {
        self.stage(
            event_id,
            LedgerWrite::FreeSpace {
                event_id,
                free_space,
            },
        )
        .await
    }

    pub async fn set_status(&mut self, event_id: i32, status: bool) -> Result<(), CampusError> {
        self.stage(event_id, LedgerWrite::Status { event_id, status })
            .await
    }

    pub async fn update_event_details(
        &mut self,
        event_id: i32,
        details: EventDetails,
    ) -> Result<(), CampusError> {
        self.stage(event_id, LedgerWrite::Details { event_id, details })
            .await
    }

    pub async fn insert_enrolment(&mut self, enrolment: &DbEnrolment) -> Result<(), CampusError> {
        self.stage(
            enrolment.event_id,
            LedgerWrite::InsertEnrolment(enrolment.clone()),
        )
        .await
    }

    pub async fn delete_enrolment(
        &mut self,
        event_id: i32,
        user_id: i32,
    ) -> Result<u64, CampusError> {
        if !self.enrolment_exists(event_id, user_id).await? {
            return Ok(0);
        }
        self.stage(event_id, LedgerWrite::DeleteEnrolment { event_id, user_id })
            .await?;
        Ok(1)
    }

    pub async fn delete_event(&mut self, event_id: i32) -> Result<(), CampusError> {
        self.stage(event_id, LedgerWrite::DeleteEvent(event_id))
            .await
    }

    /// Replays the journal onto the committed tables. Either every write lands or none does.
    pub async fn commit(self) -> Result<(), CampusError> {
        if self.journal.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        for write in &self.journal {
            next.apply(write)?;
        }
        *tables = next;
        Ok(())
    }
}
