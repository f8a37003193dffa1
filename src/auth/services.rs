use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    auth::{
        password::{hash_password, verify_password},
        repo::UserStore,
        repo_types::{NewUser, User, DEFAULT_TIMEZONE},
    },
    error::ApiError,
};

const MAX_USERNAME_LEN: usize = 80;
const MAX_EMAIL_LEN: usize = 120;
const MAX_TIMEZONE_LEN: usize = 50;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref TIMEZONE_RE: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_+\-/]*$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_timezone(tz: &str) -> bool {
    tz.len() <= MAX_TIMEZONE_LEN && TIMEZONE_RE.is_match(tz)
}

/// Trims a required field, rejecting it when absent or blank.
pub(crate) fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation(format!("Missing {field}")))
}

/// Like `required` but keeps the value exactly as sent. Used for secrets.
pub(crate) fn present(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation(format!("Missing {field}")))
}

pub async fn register_user(
    users: &dyn UserStore,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User, ApiError> {
    let username = username.trim();
    let email = email.trim().to_lowercase();

    if username.len() > MAX_USERNAME_LEN {
        return Err(ApiError::validation("Username too long"));
    }
    if email.len() > MAX_EMAIL_LEN || !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("Invalid email"));
    }
    if password.is_empty() {
        return Err(ApiError::validation("Missing password"));
    }

    let password_hash = hash_password(password)?;
    let user = users
        .insert(NewUser {
            username: username.to_string(),
            email,
            password_hash,
            timezone: DEFAULT_TIMEZONE.to_string(),
        })
        .await
        .map_err(|e| {
            warn!(username = %username, error = %e, "registration rejected");
            ApiError::from(e)
        })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Unknown usernames and wrong passwords fail identically.
pub async fn authenticate(
    users: &dyn UserStore,
    username: &str,
    password: &str,
) -> Result<User, ApiError> {
    let username = username.trim();
    let Some(user) = users.find_by_username(username).await? else {
        warn!(username = %username, "login unknown username");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(password, &user.password_hash) {
        warn!(username = %username, user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }
    Ok(user)
}
