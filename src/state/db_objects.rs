use crate::auth::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

//`branch_ids` and `years` are only ever read through `enrolment::permission`
#[derive(Deserialize, Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct DbEvent {
    pub id: i32,
    pub event_name: String,
    pub creator: i32,
    pub start_date: DateTime<Utc>,
    pub working_hour: i32,
    pub free_space: i32,
    pub detail: String,
    pub location: String,
    pub status: bool,
    pub allow_all_branch: bool,
    pub allow_all_year: bool,
    pub branch_ids: String,
    pub years: String,
}

/// The raw eligibility columns of an event, as produced by
/// [`crate::enrolment::permission::EligibilityDescriptor::encode`].
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StoredDescriptor {
    pub allow_all_branch: bool,
    pub allow_all_year: bool,
    pub branch_ids: String,
    pub years: String,
}

/// Everything about an event except its capacity, which only the ledger writes.
#[derive(Clone, Debug)]
pub struct EventDetails {
    pub event_name: String,
    pub start_date: DateTime<Utc>,
    pub working_hour: i32,
    pub detail: String,
    pub location: String,
    pub descriptor: StoredDescriptor,
}

#[derive(Clone, Debug)]
pub struct NewEvent {
    pub creator: i32,
    pub limit: i32,
    pub details: EventDetails,
}

#[derive(Deserialize, Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct DbEnrolment {
    pub event_id: i32,
    pub user_id: i32,
    pub certifier: i32,
    pub status: bool,
    pub comment: String,
    pub file_pdf: Option<String>,
}

/// An activity a student did away from campus, recorded by the student.
#[derive(Deserialize, Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct DbOutside {
    pub id: i32,
    pub user_id: i32,
    pub event_name: String,
    pub start_date: DateTime<Utc>,
    pub location: String,
    pub working_hour: i32,
    pub intendant: String,
    pub status: bool,
    pub comment: String,
}

#[derive(Clone, Debug)]
pub struct NewOutside {
    pub user_id: i32,
    pub event_name: String,
    pub start_date: DateTime<Utc>,
    pub location: String,
    pub working_hour: i32,
    pub intendant: String,
}

#[derive(Deserialize, Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct DbStudent {
    pub user_id: i32,
    pub title_name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub code: String,
    pub year: i32,
    pub branch_id: i32,
}

#[derive(Deserialize, Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct DbTeacher {
    pub user_id: i32,
    pub title_name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub code: String,
}

#[derive(Clone, FromRow, Debug)]
pub struct DbUser {
    pub id: i32,
    pub email: String,
    pub hashed_password: String,
    pub role: Role,
}

#[derive(Deserialize, Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct DbBranch {
    pub id: i32,
    pub branch_code: String,
    pub branch_name: String,
    pub faculty_id: i32,
}

#[derive(Deserialize, Serialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct DbFaculty {
    pub id: i32,
    pub faculty_code: String,
    pub faculty_name: String,
}
