use crate::{
    auth::{backend::CampusAuthBackend, PermissionsTarget, Role},
    error::{CampusError, JoinSnafu, ThreadReason},
    state::{
        db::CampusDb,
        db_objects::{DbStudent, DbTeacher},
        CampusState,
    },
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{post, put},
    Json, Router,
};
use axum_login::permission_required;
use bcrypt::hash;
use serde::Deserialize;
use serde_json::json;
use snafu::ResultExt;
use tokio::task::spawn_blocking;

#[derive(Deserialize, Clone, Debug)]
pub struct StudentProfile {
    pub title_name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub code: String,
    pub year: i32,
    pub branch_id: i32,
}

impl StudentProfile {
    pub fn into_student(self, user_id: i32) -> DbStudent {
        DbStudent {
            user_id,
            title_name: self.title_name,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            code: self.code,
            year: self.year,
            branch_id: self.branch_id,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct TeacherProfile {
    pub title_name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub code: String,
}

impl TeacherProfile {
    pub fn into_teacher(self, user_id: i32) -> DbTeacher {
        DbTeacher {
            user_id,
            title_name: self.title_name,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            code: self.code,
        }
    }
}

/// The kind of person being registered. The role a new account gets is decided here and nowhere
/// else.
#[derive(Clone, Debug)]
pub enum Registrant {
    Student(StudentProfile),
    Teacher(TeacherProfile),
}

impl Registrant {
    pub fn role(&self) -> Role {
        match self {
            Self::Student(_) => Role::Student,
            Self::Teacher(_) => Role::Teacher,
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterForm<P> {
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub profile: P,
}

fn check_credentials(email: &str, password: &str) -> Result<(), CampusError> {
    if !email.contains('@') {
        return Err(CampusError::InvalidRequest {
            reason: "email must contain an @".into(),
        });
    }
    if password.len() < 8 {
        return Err(CampusError::InvalidRequest {
            reason: "password must be at least 8 characters".into(),
        });
    }
    Ok(())
}

/// Validates a registration, hashes the password off the async runtime and stores the account.
#[instrument(level = "debug", skip(db, password, registrant), fields(role = %registrant.role()))]
pub async fn register(
    db: &CampusDb,
    email: String,
    password: String,
    registrant: Registrant,
    bcrypt_cost: u32,
) -> Result<i32, CampusError> {
    check_credentials(&email, &password)?;

    if let Registrant::Student(profile) = &registrant {
        if profile.year <= 0 {
            return Err(CampusError::InvalidRequest {
                reason: "year must be positive".into(),
            });
        }
        let Ok(branch_id) = u32::try_from(profile.branch_id) else {
            return Err(CampusError::InvalidRequest {
                reason: "branch id must not be negative".into(),
            });
        };
        if !db.branch_exists(profile.branch_id).await? {
            return Err(CampusError::UnknownBranch { branch_id });
        }
    }

    let hashed_password = spawn_blocking(move || hash(password, bcrypt_cost))
        .await
        .context(JoinSnafu {
            title: ThreadReason::HashingPassword,
        })??;

    let id = db.register(email, hashed_password, registrant).await?;
    info!(user_id = id, "Registered new user");
    Ok(id)
}

#[axum::debug_handler]
async fn post_register_student(
    State(state): State<CampusState>,
    Json(RegisterForm {
        email,
        password,
        profile,
    }): Json<RegisterForm<StudentProfile>>,
) -> Result<impl IntoResponse, CampusError> {
    let id = register(
        state.db(),
        email,
        password,
        Registrant::Student(profile),
        state.settings().auth.bcrypt_cost,
    )
    .await?;
    Ok(Json(json!({ "message": "Registered", "user_id": id })))
}

#[axum::debug_handler]
async fn post_register_teacher(
    State(state): State<CampusState>,
    Json(RegisterForm {
        email,
        password,
        profile,
    }): Json<RegisterForm<TeacherProfile>>,
) -> Result<impl IntoResponse, CampusError> {
    let id = register(
        state.db(),
        email,
        password,
        Registrant::Teacher(profile),
        state.settings().auth.bcrypt_cost,
    )
    .await?;
    Ok(Json(json!({ "message": "Registered", "user_id": id })))
}

#[derive(Deserialize)]
struct RoleChange {
    role: Role,
}

#[axum::debug_handler]
async fn put_role(
    State(state): State<CampusState>,
    Path(user_id): Path<i32>,
    Json(RoleChange { role }): Json<RoleChange>,
) -> Result<impl IntoResponse, CampusError> {
    if !state.db().set_role(user_id, role).await? {
        return Err(CampusError::UserNotFound { user_id });
    }
    info!(user_id, %role, "Changed role");
    Ok(Json(json!({ "message": "Role updated" })))
}

pub fn router() -> Router<CampusState> {
    Router::new()
        .route("/admin/role/:id", put(put_role))
        .route_layer(permission_required!(
            CampusAuthBackend,
            PermissionsTarget::Administrate
        ))
        .route("/register/student", post(post_register_student))
        .route("/register/teacher", post(post_register_teacher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::db::memory::MemoryDb;
    use std::time::Duration;

    const TEST_COST: u32 = 4;

    fn profile(branch_id: i32, year: i32) -> StudentProfile {
        StudentProfile {
            title_name: "Mx".into(),
            first_name: "Pat".into(),
            last_name: "Lee".into(),
            phone: None,
            code: "6501".into(),
            year,
            branch_id,
        }
    }

    fn memory() -> (CampusDb, MemoryDb) {
        let mem = MemoryDb::new(Duration::from_secs(1));
        (CampusDb::Memory(mem.clone()), mem)
    }

    #[test]
    fn registrant_decides_role() {
        assert_eq!(Registrant::Student(profile(1, 1)).role(), Role::Student);
        let teacher = TeacherProfile {
            title_name: "Dr".into(),
            first_name: "Sam".into(),
            last_name: "Ng".into(),
            phone: Some("0800".into()),
            code: "T1".into(),
        };
        assert_eq!(Registrant::Teacher(teacher).role(), Role::Teacher);
    }

    #[tokio::test]
    async fn unknown_branch_is_rejected() {
        let (db, _) = memory();
        let err = register(
            &db,
            "pat@uni.ac.th".into(),
            "password123".into(),
            Registrant::Student(profile(42, 2)),
            TEST_COST,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CampusError::UnknownBranch { branch_id: 42 }));
    }

    #[tokio::test]
    async fn negative_branch_is_an_invalid_request() {
        let (db, mem) = memory();
        let faculty = mem.add_faculty("ENG", "Engineering").await;
        mem.add_branch(faculty, "CPE", "Computer Engineering").await;

        let err = register(
            &db,
            "pat@uni.ac.th".into(),
            "password123".into(),
            Registrant::Student(profile(-1, 2)),
            TEST_COST,
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, CampusError::InvalidRequest { ref reason } if reason.contains("branch")),
            "{err}"
        );
        assert!(db.user_by_email("pat@uni.ac.th").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn short_password_is_rejected_before_lookup() {
        let (db, _) = memory();
        let err = register(
            &db,
            "pat@uni.ac.th".into(),
            "short".into(),
            Registrant::Student(profile(1, 2)),
            TEST_COST,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CampusError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn duplicate_email_is_taken() {
        let (db, mem) = memory();
        let faculty = mem.add_faculty("ENG", "Engineering").await;
        let branch = mem.add_branch(faculty, "CPE", "Computer Engineering").await;

        register(
            &db,
            "pat@uni.ac.th".into(),
            "password123".into(),
            Registrant::Student(profile(branch, 2)),
            TEST_COST,
        )
        .await
        .unwrap();
        let err = register(
            &db,
            "PAT@uni.ac.th".into(),
            "password123".into(),
            Registrant::Student(profile(branch, 2)),
            TEST_COST,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CampusError::EmailTaken { .. }));
    }
}
