use crate::auth::backend::CampusAuthBackend;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use snafu::Snafu;
use std::path::PathBuf;

pub type ALError = axum_login::Error<CampusAuthBackend>;

#[derive(Debug)]
pub enum LoginFailureReason {
    UnknownEmail,
    IncorrectPassword,
}

#[derive(Debug, Clone, Copy)]
pub enum DescriptorAxis {
    Branches,
    Years,
}

#[derive(Debug)]
pub enum IOAction {
    CreatingDirectory(PathBuf),
    WritingFile(PathBuf),
    DeletingFile(PathBuf),
    ReadingFile(PathBuf),
}

#[derive(Debug)]
pub enum ThreadReason {
    HashingPassword,
}

#[derive(Debug)]
pub enum SqlxAction {
    BeginningTransaction,
    SettingLockTimeout,
    CommittingTransaction,

    FindingEvent(i32),
    LockingEvent(i32),
    FindingAllEvents,
    FindingOpenEvents,
    FindingEventsByCreator(i32),
    AddingEvent,
    UpdatingEvent(i32),
    UpdatingFreeSpace(i32),
    UpdatingEventStatus(i32),
    ClosingFullEvents,
    RemovingEvent(i32),

    FindingEnrolment { event_id: i32, user_id: i32 },
    AddingEnrolment { event_id: i32, user_id: i32 },
    RemovingEnrolment { event_id: i32, user_id: i32 },
    CertifyingEnrolment { event_id: i32, user_id: i32 },
    UpdatingEvidence { event_id: i32, user_id: i32 },
    CountingEnrolments(i32),
    FindingEnrolmentsForEvent(i32),
    FindingEnrolmentsForUser(i32),

    AddingOutside(i32),
    FindingOutside(i32),
    FindingOutsidesForUser(i32),

    FindingStudent(i32),
    FindingTeacher(i32),
    FindingUser(String),
    FindingUserById(i32),
    AddingUser,
    UpdatingRole(i32),

    FindingBranch(i32),
    FindingBranches,
    FindingFaculty(i32),
    FindingFaculties,
}

/// Coarse grouping used for logging and for deciding whether a caller may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Rejected,
    Infrastructure,
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum CampusError {
    //external errors
    #[snafu(display("Database Error: {source:?}. Cause: {action:?}"))]
    Sqlx {
        source: sqlx::Error,
        action: SqlxAction,
    },
    #[snafu(display("IO Error: {source:?} doing {action:?}"))]
    IO {
        source: std::io::Error,
        action: IOAction,
    },
    #[snafu(display("Tokio Join Error: {source:?} which was started to {title:?}"))]
    Join {
        source: tokio::task::JoinError,
        title: ThreadReason,
    },
    #[snafu(display("Error Parsing {original:?} - {source:?}"))]
    ParseTime {
        source: chrono::ParseError,
        original: String,
    },
    #[snafu(display("Unknown timezone {timezone:?}"))]
    UnknownTimezone { timezone: String },
    #[snafu(display("Ambiguous or skipped local time {original:?}"))]
    AmbiguousTime { original: String },
    #[snafu(display("Multipart Error: {source:?}"), context(false))]
    Multipart {
        source: axum::extract::multipart::MultipartError,
    },
    #[snafu(display("Error with Encrypting: {source:?}"), context(false))]
    Bcrypt { source: bcrypt::BcryptError },
    #[snafu(display("Malformed {axis:?} list {raw:?}: {source}"))]
    MalformedDescriptor {
        source: serde_json::Error,
        axis: DescriptorAxis,
        raw: String,
    },
    #[snafu(display("Unable to encode {axis:?} list: {source}"))]
    EncodeDescriptor {
        source: serde_json::Error,
        axis: DescriptorAxis,
    },
    #[snafu(display("Session Error: {message}"))]
    Session { message: String },

    //lookups
    #[snafu(display("Student not found: user {user_id}"))]
    StudentNotFound { user_id: i32 },
    #[snafu(display("Event not found: {event_id}"))]
    EventNotFound { event_id: i32 },
    #[snafu(display("User {user_id} has no enrolment on event {event_id}"))]
    EnrolmentNotFound { event_id: i32, user_id: i32 },
    #[snafu(display("No evidence file uploaded for user {user_id} on event {event_id}"))]
    EvidenceNotFound { event_id: i32, user_id: i32 },
    #[snafu(display("User not found: {user_id}"))]
    UserNotFound { user_id: i32 },
    #[snafu(display("Outside activity not found: {outside_id}"))]
    OutsideNotFound { outside_id: i32 },

    //business rules
    #[snafu(display("Event {event_id} is not open for joining"))]
    EventClosed { event_id: i32 },
    #[snafu(display("The event {event_id} is full"))]
    EventFull { event_id: i32 },
    #[snafu(display("No free space available for event {event_id}"))]
    NoFreeSpace { event_id: i32 },
    #[snafu(display("User {user_id} has already joined event {event_id}"))]
    AlreadyJoined { event_id: i32, user_id: i32 },
    #[snafu(display("User {user_id} is not a member of event {event_id}"))]
    NotAMember { event_id: i32, user_id: i32 },
    #[snafu(display("User {user_id} is not allowed to join event {event_id}"))]
    NotEligible { event_id: i32, user_id: i32 },
    #[snafu(display("User {user_id} did not create event {event_id}"))]
    NotCreator { event_id: i32, user_id: i32 },
    #[snafu(display("User {user_id} did not record outside activity {outside_id}"))]
    NotRecorder { outside_id: i32, user_id: i32 },
    #[snafu(display("Limit {requested} is below the {enrolled} students already enrolled"))]
    CapacityBelowEnrolled { requested: i32, enrolled: i64 },
    #[snafu(display("Branch with ID {branch_id} does not exist"))]
    UnknownBranch { branch_id: u32 },
    #[snafu(display("Invalid upload: {reason}"))]
    InvalidUpload { reason: &'static str },
    #[snafu(display("Invalid request: {reason}"))]
    InvalidRequest { reason: String },
    #[snafu(display("Email {email:?} is already registered"))]
    EmailTaken { email: String },
    #[snafu(display("Failure to login due to {reason:?}"))]
    LoginFailure { reason: LoginFailureReason },
    #[snafu(display("Not logged in"))]
    NotLoggedIn,

    //infrastructure
    #[snafu(display("Timed out waiting for the lock on event {event_id}"))]
    LockTimeout { event_id: i32 },
}

impl CampusError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::StudentNotFound { .. }
            | Self::EventNotFound { .. }
            | Self::EnrolmentNotFound { .. }
            | Self::EvidenceNotFound { .. }
            | Self::UserNotFound { .. }
            | Self::OutsideNotFound { .. } => ErrorClass::NotFound,
            Self::EventClosed { .. }
            | Self::EventFull { .. }
            | Self::NoFreeSpace { .. }
            | Self::AlreadyJoined { .. }
            | Self::NotAMember { .. }
            | Self::NotEligible { .. }
            | Self::NotCreator { .. }
            | Self::NotRecorder { .. }
            | Self::CapacityBelowEnrolled { .. }
            | Self::UnknownBranch { .. }
            | Self::InvalidUpload { .. }
            | Self::InvalidRequest { .. }
            | Self::EmailTaken { .. }
            | Self::LoginFailure { .. }
            | Self::NotLoggedIn
            | Self::ParseTime { .. }
            | Self::AmbiguousTime { .. }
            | Self::Multipart { .. } => ErrorClass::Rejected,
            _ => ErrorClass::Infrastructure,
        }
    }

    /// Lock waits, serialization failures and deadlocks can succeed on a second attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LockTimeout { .. } => true,
            Self::Sqlx { source, .. } => source
                .as_database_error()
                .and_then(|e| e.code())
                .is_some_and(|code| matches!(code.as_ref(), "40001" | "40P01" | "55P03")),
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::StudentNotFound { .. }
            | Self::EventNotFound { .. }
            | Self::EnrolmentNotFound { .. }
            | Self::EvidenceNotFound { .. }
            | Self::UserNotFound { .. }
            | Self::OutsideNotFound { .. } => StatusCode::NOT_FOUND,
            Self::EventClosed { .. }
            | Self::NotEligible { .. }
            | Self::NotCreator { .. }
            | Self::NotRecorder { .. } => StatusCode::FORBIDDEN,
            Self::EventFull { .. }
            | Self::NoFreeSpace { .. }
            | Self::AlreadyJoined { .. }
            | Self::NotAMember { .. }
            | Self::CapacityBelowEnrolled { .. }
            | Self::EmailTaken { .. } => StatusCode::CONFLICT,
            Self::LoginFailure { .. } | Self::NotLoggedIn => StatusCode::UNAUTHORIZED,
            Self::UnknownBranch { .. }
            | Self::InvalidUpload { .. }
            | Self::InvalidRequest { .. }
            | Self::ParseTime { .. }
            | Self::AmbiguousTime { .. }
            | Self::Multipart { .. } => StatusCode::BAD_REQUEST,
            _ if self.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::Infrastructure if self.is_retryable() => {
                "The service is busy, please try again".to_string()
            }
            ErrorClass::Infrastructure => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<ALError> for CampusError {
    fn from(value: ALError) -> Self {
        match value {
            axum_login::Error::Backend(e) => e,
            axum_login::Error::Session(e) => Self::Session {
                message: e.to_string(),
            },
        }
    }
}

impl IntoResponse for CampusError {
    fn into_response(self) -> Response {
        let code = self.status_code();

        match self.class() {
            ErrorClass::NotFound => debug!(error = %self, %code, "Lookup failed"),
            ErrorClass::Rejected => warn!(error = %self, %code, "Request rejected"),
            ErrorClass::Infrastructure => error!(
                error = ?self,
                %code,
                retryable = self.is_retryable(),
                "Infrastructure failure"
            ),
        }

        (code, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rejections_are_not_infrastructure() {
        let rejections = [
            CampusError::EventClosed { event_id: 1 },
            CampusError::EventFull { event_id: 1 },
            CampusError::NoFreeSpace { event_id: 1 },
            CampusError::AlreadyJoined {
                event_id: 1,
                user_id: 2,
            },
            CampusError::NotAMember {
                event_id: 1,
                user_id: 2,
            },
            CampusError::NotEligible {
                event_id: 1,
                user_id: 2,
            },
        ];

        for e in rejections {
            assert_eq!(e.class(), ErrorClass::Rejected, "{e}");
            assert!(!e.is_retryable());
            assert!(e.status_code().is_client_error());
        }
    }

    #[test]
    fn lookups_are_404() {
        let e = CampusError::StudentNotFound { user_id: 3 };
        assert_eq!(e.class(), ErrorClass::NotFound);
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);

        let e = CampusError::EventNotFound { event_id: 3 };
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);

        let e = CampusError::OutsideNotFound { outside_id: 3 };
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn lock_timeout_is_retryable_infrastructure() {
        let e = CampusError::LockTimeout { event_id: 9 };
        assert_eq!(e.class(), ErrorClass::Infrastructure);
        assert!(e.is_retryable());
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn plain_sqlx_errors_are_not_retryable() {
        let e = CampusError::Sqlx {
            source: sqlx::Error::PoolTimedOut,
            action: SqlxAction::FindingAllEvents,
        };
        assert!(!e.is_retryable());
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
