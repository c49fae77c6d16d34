use crate::{
    auth::{register::Registrant, Role},
    error::{CampusError, SqlxAction, SqlxSnafu},
    state::db_objects::{
        DbBranch, DbEnrolment, DbEvent, DbFaculty, DbOutside, DbStudent, DbTeacher, DbUser,
        EventDetails, NewEvent, NewOutside,
    },
};
use snafu::ResultExt;
use sqlx::{Pool, Postgres, Transaction};
use std::time::Duration;

const EVENT_COLUMNS: &str = "id, event_name, creator, start_date, working_hour, free_space, \
    detail, location, status, allow_all_branch, allow_all_year, branch_ids, years";
const ENROLMENT_COLUMNS: &str = "event_id, user_id, certifier, status, comment, file_pdf";
const OUTSIDE_COLUMNS: &str =
    "id, user_id, event_name, start_date, location, working_hour, intendant, status, comment";

fn has_code(source: &sqlx::Error, code: &str) -> bool {
    source
        .as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|c| c == code)
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: Pool<Postgres>,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub async fn begin(&self) -> Result<PgTx, CampusError> {
        let mut tx = self.pool.begin().await.context(SqlxSnafu {
            action: SqlxAction::BeginningTransaction,
        })?;

        //SET does not take bind parameters
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::SettingLockTimeout,
        })?;

        Ok(PgTx { tx })
    }

    pub async fn event_by_id(&self, event_id: i32) -> Result<Option<DbEvent>, CampusError> {
        sqlx::query_as::<_, DbEvent>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .context(SqlxSnafu {
                action: SqlxAction::FindingEvent(event_id),
            })
    }

    pub async fn all_events(&self) -> Result<Vec<DbEvent>, CampusError> {
        sqlx::query_as::<_, DbEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY start_date DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingAllEvents,
        })
    }

    pub async fn open_events(&self) -> Result<Vec<DbEvent>, CampusError> {
        sqlx::query_as::<_, DbEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE status = TRUE ORDER BY start_date ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingOpenEvents,
        })
    }

    pub async fn events_by_creator(&self, creator: i32) -> Result<Vec<DbEvent>, CampusError> {
        sqlx::query_as::<_, DbEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE creator = $1 ORDER BY start_date DESC"
        ))
        .bind(creator)
        .fetch_all(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingEventsByCreator(creator),
        })
    }

    pub async fn create_event(
        &self,
        NewEvent {
            creator,
            limit,
            details,
        }: NewEvent,
    ) -> Result<i32, CampusError> {
        let (id,): (i32,) = sqlx::query_as(
            r#"
INSERT INTO events
(event_name, creator, start_date, working_hour, free_space, detail, location, status,
    allow_all_branch, allow_all_year, branch_ids, years)
VALUES($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9, $10, $11)
RETURNING id
            "#,
        )
        .bind(details.event_name)
        .bind(creator)
        .bind(details.start_date)
        .bind(details.working_hour)
        .bind(limit)
        .bind(details.detail)
        .bind(details.location)
        .bind(details.descriptor.allow_all_branch)
        .bind(details.descriptor.allow_all_year)
        .bind(details.descriptor.branch_ids)
        .bind(details.descriptor.years)
        .fetch_one(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::AddingEvent,
        })?;

        Ok(id)
    }

    pub async fn set_event_status(&self, event_id: i32, status: bool) -> Result<bool, CampusError> {
        let result = sqlx::query("UPDATE events SET status = $2 WHERE id = $1")
            .bind(event_id)
            .bind(status)
            .execute(&self.pool)
            .await
            .context(SqlxSnafu {
                action: SqlxAction::UpdatingEventStatus(event_id),
            })?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn close_full_events(&self) -> Result<u64, CampusError> {
        sqlx::query("UPDATE events SET status = FALSE WHERE free_space = 0 AND status = TRUE")
            .execute(&self.pool)
            .await
            .context(SqlxSnafu {
                action: SqlxAction::ClosingFullEvents,
            })
            .map(|r| r.rows_affected())
    }

    pub async fn enrolment(
        &self,
        event_id: i32,
        user_id: i32,
    ) -> Result<Option<DbEnrolment>, CampusError> {
        sqlx::query_as::<_, DbEnrolment>(&format!(
            "SELECT {ENROLMENT_COLUMNS} FROM event_insides WHERE event_id = $1 AND user_id = $2"
        ))
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingEnrolment { event_id, user_id },
        })
    }

    pub async fn count_enrolments(&self, event_id: i32) -> Result<i64, CampusError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM event_insides WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await
            .context(SqlxSnafu {
                action: SqlxAction::CountingEnrolments(event_id),
            })
    }

    pub async fn enrolments_for_event(
        &self,
        event_id: i32,
    ) -> Result<Vec<DbEnrolment>, CampusError> {
        sqlx::query_as::<_, DbEnrolment>(&format!(
            "SELECT {ENROLMENT_COLUMNS} FROM event_insides WHERE event_id = $1 ORDER BY user_id"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingEnrolmentsForEvent(event_id),
        })
    }

    pub async fn enrolments_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<DbEnrolment>, CampusError> {
        sqlx::query_as::<_, DbEnrolment>(&format!(
            "SELECT {ENROLMENT_COLUMNS} FROM event_insides WHERE user_id = $1 ORDER BY event_id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingEnrolmentsForUser(user_id),
        })
    }

    pub async fn certify_enrolment(
        &self,
        event_id: i32,
        user_id: i32,
        status: bool,
        comment: String,
    ) -> Result<bool, CampusError> {
        let result = sqlx::query(
            r#"
UPDATE event_insides
SET status = $3, comment = $4
WHERE event_id = $1 AND user_id = $2
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(status)
        .bind(comment)
        .execute(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::CertifyingEnrolment { event_id, user_id },
        })?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_evidence_file(
        &self,
        event_id: i32,
        user_id: i32,
        path: Option<String>,
    ) -> Result<bool, CampusError> {
        let result = sqlx::query(
            "UPDATE event_insides SET file_pdf = $3 WHERE event_id = $1 AND user_id = $2",
        )
        .bind(event_id)
        .bind(user_id)
        .bind(path)
        .execute(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::UpdatingEvidence { event_id, user_id },
        })?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_outside(
        &self,
        NewOutside {
            user_id,
            event_name,
            start_date,
            location,
            working_hour,
            intendant,
        }: NewOutside,
    ) -> Result<i32, CampusError> {
        let (id,): (i32,) = sqlx::query_as(
            r#"
INSERT INTO event_outsides (user_id, event_name, start_date, location, working_hour, intendant)
VALUES ($1, $2, $3, $4, $5, $6)
RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(event_name)
        .bind(start_date)
        .bind(location)
        .bind(working_hour)
        .bind(intendant)
        .fetch_one(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::AddingOutside(user_id),
        })?;

        Ok(id)
    }

    pub async fn outside_by_id(&self, outside_id: i32) -> Result<Option<DbOutside>, CampusError> {
        sqlx::query_as::<_, DbOutside>(&format!(
            "SELECT {OUTSIDE_COLUMNS} FROM event_outsides WHERE id = $1"
        ))
        .bind(outside_id)
        .fetch_optional(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingOutside(outside_id),
        })
    }

    pub async fn outsides_for_user(&self, user_id: i32) -> Result<Vec<DbOutside>, CampusError> {
        sqlx::query_as::<_, DbOutside>(&format!(
            r#"
SELECT {OUTSIDE_COLUMNS}
FROM event_outsides
WHERE user_id = $1
ORDER BY start_date DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingOutsidesForUser(user_id),
        })
    }

    pub async fn student_by_user_id(&self, user_id: i32) -> Result<Option<DbStudent>, CampusError> {
        sqlx::query_as::<_, DbStudent>(
            r#"
SELECT user_id, title_name, first_name, last_name, phone, code, year, branch_id
FROM students
WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingStudent(user_id),
        })
    }

    pub async fn teacher_by_user_id(&self, user_id: i32) -> Result<Option<DbTeacher>, CampusError> {
        sqlx::query_as::<_, DbTeacher>(
            r#"
SELECT user_id, title_name, first_name, last_name, phone, code
FROM teachers
WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingTeacher(user_id),
        })
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<DbUser>, CampusError> {
        sqlx::query_as::<_, DbUser>(
            "SELECT id, email, hashed_password, role FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingUser(email.to_string()),
        })
    }

    pub async fn user_by_id(&self, user_id: i32) -> Result<Option<DbUser>, CampusError> {
        sqlx::query_as::<_, DbUser>(
            "SELECT id, email, hashed_password, role FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingUserById(user_id),
        })
    }

    pub async fn register(
        &self,
        email: String,
        hashed_password: String,
        registrant: Registrant,
    ) -> Result<i32, CampusError> {
        let mut tx = self.pool.begin().await.context(SqlxSnafu {
            action: SqlxAction::BeginningTransaction,
        })?;

        let inserted: Result<(i32,), _> = sqlx::query_as(
            "INSERT INTO users (email, hashed_password, role) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&email)
        .bind(hashed_password)
        .bind(registrant.role())
        .fetch_one(&mut *tx)
        .await;
        let (id,) = match inserted {
            Ok(row) => row,
            Err(source) if has_code(&source, "23505") => {
                return Err(CampusError::EmailTaken { email })
            }
            Err(source) => {
                return Err(CampusError::Sqlx {
                    source,
                    action: SqlxAction::AddingUser,
                })
            }
        };

        let profile_row = match registrant {
            Registrant::Student(profile) => {
                sqlx::query(
                    r#"
INSERT INTO students (user_id, title_name, first_name, last_name, phone, code, year, branch_id)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(id)
                .bind(profile.title_name)
                .bind(profile.first_name)
                .bind(profile.last_name)
                .bind(profile.phone)
                .bind(profile.code)
                .bind(profile.year)
                .bind(profile.branch_id)
                .execute(&mut *tx)
                .await
            }
            Registrant::Teacher(profile) => {
                sqlx::query(
                    r#"
INSERT INTO teachers (user_id, title_name, first_name, last_name, phone, code)
VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(id)
                .bind(profile.title_name)
                .bind(profile.first_name)
                .bind(profile.last_name)
                .bind(profile.phone)
                .bind(profile.code)
                .execute(&mut *tx)
                .await
            }
        };
        match profile_row {
            Ok(_) => {}
            Err(source) if has_code(&source, "23505") => {
                return Err(CampusError::InvalidRequest {
                    reason: "that code is already registered".into(),
                })
            }
            Err(source) => {
                return Err(CampusError::Sqlx {
                    source,
                    action: SqlxAction::AddingUser,
                })
            }
        }

        tx.commit().await.context(SqlxSnafu {
            action: SqlxAction::CommittingTransaction,
        })?;

        Ok(id)
    }

    pub async fn set_role(&self, user_id: i32, role: Role) -> Result<bool, CampusError> {
        let result = sqlx::query("UPDATE users SET role = $2 WHERE id = $1")
            .bind(user_id)
            .bind(role)
            .execute(&self.pool)
            .await
            .context(SqlxSnafu {
                action: SqlxAction::UpdatingRole(user_id),
            })?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn branch_exists(&self, branch_id: i32) -> Result<bool, CampusError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM branches WHERE id = $1)")
            .bind(branch_id)
            .fetch_one(&self.pool)
            .await
            .context(SqlxSnafu {
                action: SqlxAction::FindingBranch(branch_id),
            })
    }

    pub async fn branch_by_id(&self, branch_id: i32) -> Result<Option<DbBranch>, CampusError> {
        sqlx::query_as::<_, DbBranch>(
            "SELECT id, branch_code, branch_name, faculty_id FROM branches WHERE id = $1",
        )
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingBranch(branch_id),
        })
    }

    pub async fn branches(&self, faculty_id: Option<i32>) -> Result<Vec<DbBranch>, CampusError> {
        sqlx::query_as::<_, DbBranch>(
            r#"
SELECT id, branch_code, branch_name, faculty_id
FROM branches
WHERE $1::INTEGER IS NULL OR faculty_id = $1
ORDER BY id
            "#,
        )
        .bind(faculty_id)
        .fetch_all(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingBranches,
        })
    }

    pub async fn faculty_by_id(&self, faculty_id: i32) -> Result<Option<DbFaculty>, CampusError> {
        sqlx::query_as::<_, DbFaculty>(
            "SELECT id, faculty_code, faculty_name FROM faculties WHERE id = $1",
        )
        .bind(faculty_id)
        .fetch_optional(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingFaculty(faculty_id),
        })
    }

    pub async fn faculties(&self) -> Result<Vec<DbFaculty>, CampusError> {
        sqlx::query_as::<_, DbFaculty>(
            "SELECT id, faculty_code, faculty_name FROM faculties ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingFaculties,
        })
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    pub async fn lock_event(&mut self, event_id: i32) -> Result<Option<DbEvent>, CampusError> {
        sqlx::query_as::<_, DbEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE"
        ))
        .bind(event_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|source| {
            //lock_not_available, raised once lock_timeout runs out
            if has_code(&source, "55P03") {
                CampusError::LockTimeout { event_id }
            } else {
                CampusError::Sqlx {
                    source,
                    action: SqlxAction::LockingEvent(event_id),
                }
            }
        })
    }

    pub async fn enrolment_exists(
        &mut self,
        event_id: i32,
        user_id: i32,
    ) -> Result<bool, CampusError> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM event_insides WHERE event_id = $1 AND user_id = $2)",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::FindingEnrolment { event_id, user_id },
        })
    }

    pub async fn count_enrolments(&mut self, event_id: i32) -> Result<i64, CampusError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM event_insides WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&mut *self.tx)
            .await
            .context(SqlxSnafu {
                action: SqlxAction::CountingEnrolments(event_id),
            })
    }

    pub async fn set_free_space(
        &mut self,
        event_id: i32,
        free_space: i32,
    ) -> Result<(), CampusError> {
        sqlx::query("UPDATE events SET free_space = $2 WHERE id = $1")
            .bind(event_id)
            .bind(free_space)
            .execute(&mut *self.tx)
            .await
            .context(SqlxSnafu {
                action: SqlxAction::UpdatingFreeSpace(event_id),
            })
            .map(|_| ())
    }

    pub async fn set_status(&mut self, event_id: i32, status: bool) -> Result<(), CampusError> {
        sqlx::query("UPDATE events SET status = $2 WHERE id = $1")
            .bind(event_id)
            .bind(status)
            .execute(&mut *self.tx)
            .await
            .context(SqlxSnafu {
                action: SqlxAction::UpdatingEventStatus(event_id),
            })
            .map(|_| ())
    }

    pub async fn update_event_details(
        &mut self,
        event_id: i32,
        details: EventDetails,
    ) -> Result<(), CampusError> {
        sqlx::query(
            r#"
UPDATE events
SET event_name=$2, start_date=$3, working_hour=$4, detail=$5, location=$6,
    allow_all_branch=$7, allow_all_year=$8, branch_ids=$9, years=$10
WHERE id=$1
            "#,
        )
        .bind(event_id)
        .bind(details.event_name)
        .bind(details.start_date)
        .bind(details.working_hour)
        .bind(details.detail)
        .bind(details.location)
        .bind(details.descriptor.allow_all_branch)
        .bind(details.descriptor.allow_all_year)
        .bind(details.descriptor.branch_ids)
        .bind(details.descriptor.years)
        .execute(&mut *self.tx)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::UpdatingEvent(event_id),
        })
        .map(|_| ())
    }

    pub async fn insert_enrolment(&mut self, enrolment: &DbEnrolment) -> Result<(), CampusError> {
        sqlx::query(
            r#"
INSERT INTO event_insides (event_id, user_id, certifier, status, comment, file_pdf)
VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(enrolment.event_id)
        .bind(enrolment.user_id)
        .bind(enrolment.certifier)
        .bind(enrolment.status)
        .bind(&enrolment.comment)
        .bind(&enrolment.file_pdf)
        .execute(&mut *self.tx)
        .await
        .context(SqlxSnafu {
            action: SqlxAction::AddingEnrolment {
                event_id: enrolment.event_id,
                user_id: enrolment.user_id,
            },
        })
        .map(|_| ())
    }

    pub async fn delete_enrolment(
        &mut self,
        event_id: i32,
        user_id: i32,
    ) -> Result<u64, CampusError> {
        sqlx::query("DELETE FROM event_insides WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await
            .context(SqlxSnafu {
                action: SqlxAction::RemovingEnrolment { event_id, user_id },
            })
            .map(|r| r.rows_affected())
    }

    pub async fn delete_event(&mut self, event_id: i32) -> Result<(), CampusError> {
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(event_id)
            .execute(&mut *self.tx)
            .await
            .context(SqlxSnafu {
                action: SqlxAction::RemovingEvent(event_id),
            })
            .map(|_| ())
    }

    pub async fn commit(self) -> Result<(), CampusError> {
        self.tx.commit().await.context(SqlxSnafu {
            action: SqlxAction::CommittingTransaction,
        })
    }
}
