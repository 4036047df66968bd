use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use uuid::Uuid;

use crate::constants::MIN_PASSWORD_LENGTH;
use crate::database::Db;
use crate::utils::{millis_to_datetime, now_millis};

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

/// Identity exposed by the auth provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub created_at: OffsetDateTime,
    pub last_login_at: Option<OffsetDateTime>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("The email address is badly formatted")]
    InvalidEmail,
    #[error("Password is required")]
    MissingPassword,
    #[error("Password should be at least {} characters", MIN_PASSWORD_LENGTH)]
    WeakPassword,
    #[error("The email address is already in use by another account")]
    EmailAlreadyInUse,
    #[error("There is no user record corresponding to this email")]
    UserNotFound,
    #[error("The password is invalid")]
    WrongPassword,
    #[error("{0}")]
    Backend(String),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Backend(err.to_string())
    }
}

impl From<libsql::Error> for AuthError {
    fn from(err: libsql::Error) -> Self {
        AuthError::Backend(err.to_string())
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX
        .get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is a valid regex"))
        .is_match(email)
}

/// Authentication collaborator. Publishes every sign-in and sign-out on the
/// channel returned by [`AuthProvider::subscribe`].
pub trait AuthProvider: Send + Sync {
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send;

    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send;

    fn current_user(&self) -> Option<AuthUser>;

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>>;
}

impl<A: AuthProvider> AuthProvider for Arc<A> {
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send {
        (**self).sign_in(email, password)
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send {
        (**self).sign_up(email, password)
    }

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send {
        (**self).sign_out()
    }

    fn current_user(&self) -> Option<AuthUser> {
        (**self).current_user()
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        (**self).subscribe()
    }
}

struct StoredUser {
    id: String,
    email: String,
    password_hash: String,
    created_at: i64,
    last_login_at: Option<i64>,
}

impl StoredUser {
    fn to_auth_user(&self) -> Result<AuthUser, AuthError> {
        let created_at = millis_to_datetime(self.created_at)
            .ok_or_else(|| AuthError::Backend("invalid user creation time".to_string()))?;
        Ok(AuthUser {
            id: self.id.clone(),
            email: self.email.clone(),
            created_at,
            last_login_at: self.last_login_at.and_then(millis_to_datetime),
        })
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !is_valid_email(&email) {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Email/password accounts kept in the local `users` table.
pub struct LocalAuth {
    db: Db,
    current: watch::Sender<Option<AuthUser>>,
}

impl LocalAuth {
    pub fn new(db: Db) -> Self {
        let (current, _) = watch::channel(None);
        LocalAuth { db, current }
    }

    /// Inserts a new account. The duplicate check and the insert share one write guard.
    async fn create_user(&self, email: &str, password: &str) -> Result<StoredUser, AuthError> {
        let password_hash = hash_password(password)?;
        let id = Uuid::new_v4().to_string();
        let created_at = now_millis();
        let conn = self.db.write().await;

        let taken = {
            let mut rows = conn
                .query("SELECT id FROM users WHERE email = ?", [email])
                .await?;
            rows.next().await?.is_some()
        };
        if taken {
            return Err(AuthError::EmailAlreadyInUse);
        }

        conn.execute(
            "INSERT INTO users (id, email, password_hash, created_at, last_login_at) VALUES (?, ?, ?, ?, ?)",
            (id.as_str(), email, password_hash.as_str(), created_at, created_at),
        )
        .await?;

        Ok(StoredUser {
            id,
            email: email.to_string(),
            password_hash,
            created_at,
            last_login_at: Some(created_at),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> anyhow::Result<Option<StoredUser>> {
        let conn = self.db.read().await;
        let mut rows = conn
            .query(
                "SELECT id, email, password_hash, created_at, last_login_at FROM users WHERE email = ?",
                [email],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(StoredUser {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                created_at: row.get(3)?,
                last_login_at: row.get(4)?,
            }))
        } else {
            Ok(None)
        }
    }

    async fn touch_last_login(&self, user_id: &str, at: i64) -> anyhow::Result<()> {
        let conn = self.db.write().await;
        conn.execute(
            "UPDATE users SET last_login_at = ? WHERE id = ?",
            (at, user_id),
        )
        .await?;
        Ok(())
    }
}

impl AuthProvider for LocalAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(AuthError::MissingPassword);
        }

        let mut stored = self
            .get_user_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !verify_password(password, &stored.password_hash)? {
            return Err(AuthError::WrongPassword);
        }

        let now = now_millis();
        self.touch_last_login(&stored.id, now).await?;
        stored.last_login_at = Some(now);

        let user = stored.to_auth_user()?;
        tracing::info!("user {} signed in", user.id);
        self.current.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(AuthError::MissingPassword);
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }

        let stored = self.create_user(&email, password).await?;

        let user = stored.to_auth_user()?;
        tracing::info!("user {} registered", user.id);
        self.current.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(user) = self.current.send_replace(None) {
            tracing::info!("user {} signed out", user.id);
        }
        Ok(())
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.current.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.current.subscribe()
    }
}
