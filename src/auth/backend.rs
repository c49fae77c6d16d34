use crate::{
    auth::{login::LoginCreds, PermissionsTarget},
    error::{CampusError, JoinSnafu, LoginFailureReason, ThreadReason},
    state::{db::CampusDb, db_objects::DbUser},
};
use axum_login::{AuthSession, AuthUser, AuthnBackend, AuthzBackend, UserId};
use bcrypt::verify;
use snafu::ResultExt;
use std::collections::HashSet;
use tokio::task::spawn_blocking;

pub type Auth = AuthSession<CampusAuthBackend>;

impl AuthUser for DbUser {
    type Id = i32;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn session_auth_hash(&self) -> &[u8] {
        self.hashed_password.as_bytes()
    }
}

#[derive(Clone)]
pub struct CampusAuthBackend {
    db: CampusDb,
}

impl CampusAuthBackend {
    pub fn new(db: CampusDb) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl AuthnBackend for CampusAuthBackend {
    type User = DbUser;
    type Credentials = LoginCreds;
    type Error = CampusError;

    async fn authenticate(
        &self,
        LoginCreds { email, password }: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let Some(db_user) = self.db.user_by_email(&email).await? else {
            return Ok(None);
        };

        let hashed_password = db_user.hashed_password.clone();
        let matches = spawn_blocking(move || verify(password, &hashed_password))
            .await
            .context(JoinSnafu {
                title: ThreadReason::HashingPassword,
            })??;

        if matches {
            Ok(Some(db_user))
        } else {
            Err(CampusError::LoginFailure {
                reason: LoginFailureReason::IncorrectPassword,
            })
        }
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        self.db.user_by_id(*user_id).await
    }
}

#[async_trait::async_trait]
impl AuthzBackend for CampusAuthBackend {
    type Permission = PermissionsTarget;

    async fn get_user_permissions(
        &self,
        _user: &Self::User,
    ) -> Result<HashSet<Self::Permission>, Self::Error> {
        Ok(HashSet::new())
    }

    async fn get_group_permissions(
        &self,
        user: &Self::User,
    ) -> Result<HashSet<Self::Permission>, Self::Error> {
        Ok(user.role.can())
    }
}
