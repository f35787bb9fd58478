//! User service
//!
//! Registration, login and logout, session validation and profile edits.
//! A session's id is its bearer token; sessions expire after
//! `auth.session_expiration_days` and are purged periodically.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{CreateUserInput, Session, UpdateUserInput, User};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

const MIN_PASSWORD_LEN: usize = 6;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{3,50}$").expect("username pattern is valid"));

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Unknown user or wrong password
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Login credentials
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Register a user and log them in.
    pub async fn register(&self, input: CreateUserInput) -> Result<(User, Session), UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        validate_username(&username)?;
        validate_email(&email)?;
        validate_password(&input.password)?;

        self.ensure_username_free(&username, None).await?;
        self.ensure_email_free(&email, None).await?;

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let full_name = input
            .full_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let user = self
            .user_repo
            .create(&User::new(username, email, password_hash, full_name))
            .await
            .context("Failed to create user")?;
        let session = self.create_session(user.id).await?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered");
        Ok((user, session))
    }

    /// Check credentials and open a new session.
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(input.username.trim())
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::InvalidCredentials)?;

        if !verify_password(&input.password, &user.password_hash).context("Failed to verify password")? {
            tracing::warn!(username = %user.username, "Failed login attempt");
            return Err(UserServiceError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(UserServiceError::AccountDisabled);
        }

        let session = self.create_session(user.id).await?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok((user, session))
    }

    /// End a session. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The active user owning an unexpired session, if any.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_valid(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get session user")?;
        Ok(user.filter(|u| u.is_active))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await.context("Failed to get user by ID")?)
    }

    /// Remove expired sessions, returning how many were deleted.
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let removed = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired sessions");
        }
        Ok(removed)
    }

    /// Apply a profile edit after checking the current password.
    ///
    /// Changing the password ends all of the user's sessions.
    pub async fn update_profile(
        &self,
        user: &User,
        input: UpdateUserInput,
    ) -> Result<User, UserServiceError> {
        if !verify_password(&input.current_password, &user.password_hash)
            .context("Failed to verify password")?
        {
            return Err(UserServiceError::InvalidCredentials);
        }

        let mut updated = user.clone();

        if let Some(username) = input.username.map(|u| u.trim().to_string()) {
            if username != user.username {
                validate_username(&username)?;
                self.ensure_username_free(&username, Some(user.id)).await?;
                updated.username = username;
            }
        }
        if let Some(email) = input.email.map(|e| e.trim().to_string()) {
            if email != user.email {
                validate_email(&email)?;
                self.ensure_email_free(&email, Some(user.id)).await?;
                updated.email = email;
            }
        }
        if let Some(full_name) = input.full_name {
            let full_name = full_name.trim();
            updated.full_name = (!full_name.is_empty()).then(|| full_name.to_string());
        }
        let password_changed = match input.new_password {
            Some(new_password) => {
                validate_password(&new_password)?;
                updated.password_hash =
                    hash_password(&new_password).context("Failed to hash password")?;
                true
            }
            None => false,
        };

        let updated = self
            .user_repo
            .update(&updated)
            .await
            .context("Failed to update user")?;

        if password_changed {
            self.session_repo
                .delete_by_user(user.id)
                .await
                .context("Failed to revoke sessions")?;
        }

        tracing::info!(user_id = user.id, password_changed, "Profile updated");
        Ok(updated)
    }

    /// Issue a fresh session for a user, e.g. after a password change.
    pub async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::issue(user_id, self.session_expiration_days);
        Ok(self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?)
    }

    async fn ensure_username_free(&self, username: &str, owner: Option<i64>) -> Result<(), UserServiceError> {
        let existing = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to check username")?;
        match existing {
            Some(other) if Some(other.id) != owner => Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                username
            ))),
            _ => Ok(()),
        }
    }

    async fn ensure_email_free(&self, email: &str, owner: Option<i64>) -> Result<(), UserServiceError> {
        let existing = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to check email")?;
        match existing {
            Some(other) if Some(other.id) != owner => Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            ))),
            _ => Ok(()),
        }
    }
}

fn validate_username(username: &str) -> Result<(), UserServiceError> {
    if !USERNAME_RE.is_match(username) {
        return Err(UserServiceError::ValidationError(
            "Username must be 3-50 characters of letters, digits or underscores".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if email.is_empty() || !email.contains('@') {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), UserServiceError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
