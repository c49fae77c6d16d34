//! Who the logged-in user is, with the directory names their profile points at.

use crate::{
    auth::{Actor, Role},
    error::CampusError,
    state::{db::CampusDb, db_objects::DbTeacher},
};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StudentSummary {
    pub user_id: i32,
    pub title_name: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub code: String,
    pub year: i32,
    pub branch_id: i32,
    pub branch_name: Option<String>,
    pub faculty_name: Option<String>,
}

impl StudentSummary {
    pub async fn load(db: &CampusDb, user_id: i32) -> Result<Self, CampusError> {
        let student = db
            .student_by_user_id(user_id)
            .await?
            .ok_or(CampusError::StudentNotFound { user_id })?;

        let branch = db.branch_by_id(student.branch_id).await?;
        let faculty = match &branch {
            Some(branch) => db.faculty_by_id(branch.faculty_id).await?,
            None => None,
        };

        Ok(Self {
            user_id,
            title_name: student.title_name,
            first_name: student.first_name,
            last_name: student.last_name,
            phone: student.phone,
            code: student.code,
            year: student.year,
            branch_id: student.branch_id,
            branch_name: branch.map(|b| b.branch_name),
            faculty_name: faculty.map(|f| f.faculty_name),
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Profile {
    Student(StudentSummary),
    Teacher(DbTeacher),
    /// Accounts made outside registration, like a seeded admin.
    Unlinked,
}

#[derive(Serialize, Debug, Clone)]
pub struct UserProfile {
    pub user_id: i32,
    pub email: String,
    pub role: Role,
    pub profile: Profile,
}

/// The account behind `actor` and whichever profile row belongs to it.
#[instrument(level = "debug", skip(db))]
pub async fn whoami(db: &CampusDb, actor: Actor) -> Result<UserProfile, CampusError> {
    let user = db
        .user_by_id(actor.id)
        .await?
        .ok_or(CampusError::UserNotFound { user_id: actor.id })?;

    //a promoted student keeps their student row
    let profile = if db.student_by_user_id(user.id).await?.is_some() {
        Profile::Student(StudentSummary::load(db, user.id).await?)
    } else if let Some(teacher) = db.teacher_by_user_id(user.id).await? {
        Profile::Teacher(teacher)
    } else {
        Profile::Unlinked
    };

    Ok(UserProfile {
        user_id: user.id,
        email: user.email,
        role: user.role,
        profile,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrolment::fixtures::Campus;

    #[tokio::test]
    async fn students_see_their_branch_and_faculty() {
        let campus = Campus::new().await;
        let student = campus.student(1, campus.branch, 2).await;

        let me = whoami(
            &campus.db,
            Actor {
                id: student,
                role: Role::Student,
            },
        )
        .await
        .unwrap();

        assert_eq!(me.role, Role::Student);
        assert_eq!(me.email, "student1@uni.ac.th");
        let Profile::Student(summary) = &me.profile else {
            panic!("expected a student profile, got {:?}", me.profile);
        };
        assert_eq!(summary.year, 2);
        assert_eq!(summary.branch_name.as_deref(), Some("Computer Engineering"));
        assert_eq!(summary.faculty_name.as_deref(), Some("Engineering"));
    }

    #[tokio::test]
    async fn teachers_get_their_teacher_row() {
        let campus = Campus::new().await;

        let me = whoami(&campus.db, campus.teacher).await.unwrap();

        assert_eq!(me.role, Role::Teacher);
        assert!(
            matches!(&me.profile, Profile::Teacher(t) if t.code == "T-001"),
            "{:?}",
            me.profile
        );
        let json = serde_json::to_value(&me).unwrap();
        assert_eq!(json["profile"]["kind"], "teacher");
    }

    #[tokio::test]
    async fn promoted_students_stay_students() {
        let campus = Campus::new().await;
        let student = campus.student(1, campus.branch, 2).await;
        campus.db.set_role(student, Role::Admin).await.unwrap();

        let me = whoami(
            &campus.db,
            Actor {
                id: student,
                role: Role::Admin,
            },
        )
        .await
        .unwrap();

        assert_eq!(me.role, Role::Admin);
        assert!(matches!(me.profile, Profile::Student(_)));
    }

    #[tokio::test]
    async fn missing_accounts_are_not_found() {
        let campus = Campus::new().await;
        let err = whoami(
            &campus.db,
            Actor {
                id: 999,
                role: Role::Student,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CampusError::UserNotFound { user_id: 999 }));
    }
}
