//! Credential store: user records, password hashing and sign-up validation.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::models::{from_millis, to_millis, Authoriser, User};
use crate::db::StorageError;
use crate::state::DbPool;

/// Per-field sign-up problems, shaped for echoing back into a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignUpErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl SignUpErrors {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.username.is_none() && self.password.is_none()
    }
}

impl std::fmt::Display for SignUpErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [&self.email, &self.username, &self.password]
            .into_iter()
            .filter_map(|e| e.as_deref())
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("invalid sign-up: {0}")]
    Invalid(SignUpErrors),

    #[error("username or email already exists")]
    Duplicate,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("user not found")]
    NotFound,

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<rusqlite::Error> for UserError {
    fn from(e: rusqlite::Error) -> Self {
        UserError::Storage(e.into())
    }
}

impl From<r2d2::Error> for UserError {
    fn from(e: r2d2::Error) -> Self {
        UserError::Storage(e.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Clone)]
pub struct UserStore {
    pool: DbPool,
    bcrypt_cost: u32,
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, profile_pic, authoriser, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let authoriser: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        profile_pic: row.get(4)?,
        authoriser: Authoriser::parse(&authoriser).unwrap_or(Authoriser::Local),
        created_at: from_millis(row.get(6)?),
    })
}

impl UserStore {
    pub fn new(pool: DbPool, bcrypt_cost: u32) -> Self {
        Self { pool, bcrypt_cost }
    }

    /// Validate and create a local account.
    pub fn register(&self, new_user: &NewUser) -> Result<User, UserError> {
        let username = new_user.username.trim();
        let email = new_user.email.trim();

        let errors = validate_sign_up(
            email,
            username,
            &new_user.password,
            &new_user.confirm_password,
        );
        if !errors.is_empty() {
            return Err(UserError::Invalid(errors));
        }

        let hash = bcrypt::hash(&new_user.password, self.bcrypt_cost)?;
        let user = User {
            id: uuid::Uuid::now_v7().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: Some(hash),
            profile_pic: None,
            authoriser: Authoriser::Local,
            created_at: Utc::now(),
        };
        self.insert(&user)?;

        tracing::info!(user_id = %user.id, "Registered local user");
        Ok(user)
    }

    /// Check a username/password pair. Unknown users, wrong passwords and
    /// password-less federated accounts all fail the same way.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, UserError> {
        let user = self
            .find_by("username", username.trim())?
            .ok_or(UserError::InvalidCredentials)?;

        let Some(hash) = user.password_hash.as_deref() else {
            return Err(UserError::InvalidCredentials);
        };

        if bcrypt::verify(password, hash)? {
            Ok(user)
        } else {
            Err(UserError::InvalidCredentials)
        }
    }

    /// Resolve an identity asserted by an external provider. Matches an
    /// existing account by email, otherwise creates a password-less one.
    pub fn federated_login(
        &self,
        authoriser: Authoriser,
        email: &str,
        preferred_username: &str,
        avatar: Option<&str>,
    ) -> Result<User, UserError> {
        let email = email.trim();
        if !validate_email(email) {
            return Err(UserError::Invalid(SignUpErrors {
                email: Some("Invalid email format".into()),
                ..Default::default()
            }));
        }

        if let Some(user) = self.find_by("email", email)? {
            return Ok(user);
        }

        let username = self.free_username(preferred_username)?;
        let user = User {
            id: uuid::Uuid::now_v7().to_string(),
            username,
            email: email.to_string(),
            password_hash: None,
            profile_pic: avatar.map(str::to_string),
            authoriser,
            created_at: Utc::now(),
        };
        self.insert(&user)?;

        tracing::info!(
            user_id = %user.id,
            authoriser = authoriser.as_str(),
            "Created federated user"
        );
        Ok(user)
    }

    pub fn get(&self, id: &str) -> Result<User, UserError> {
        self.find_by("id", id)?.ok_or(UserError::NotFound)
    }

    pub fn set_profile_picture(&self, id: &str, reference: Option<&str>) -> Result<(), UserError> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE users SET profile_pic = ?1 WHERE id = ?2",
            params![reference, id],
        )?;
        if updated == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }

    fn insert(&self, user: &User) -> Result<(), UserError> {
        let conn = self.pool.get()?;
        let result = conn.execute(
            "INSERT INTO users (id, username, email, password_hash, profile_pic, authoriser, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.username,
                user.email,
                user.password_hash,
                user.profile_pic,
                user.authoriser.as_str(),
                to_millis(user.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = StorageError::from(e);
                if err.is_unique_violation() {
                    Err(UserError::Duplicate)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    fn find_by(&self, column: &'static str, value: &str) -> Result<Option<User>, UserError> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
        let user = conn
            .query_row(&sql, params![value], user_from_row)
            .optional()?;
        Ok(user)
    }

    /// First of `base`, `base2`, `base3`, ... that nobody has taken.
    fn free_username(&self, preferred: &str) -> Result<String, UserError> {
        let mut base: String = preferred
            .chars()
            .filter(|c| c.is_alphanumeric())
            .take(MAX_USERNAME_LEN - 4)
            .collect();
        if base.chars().count() < MIN_USERNAME_LEN || !base.chars().any(char::is_alphabetic) {
            base = format!("user{}", base);
        }

        let conn = self.pool.get()?;
        let mut candidate = base.clone();
        let mut suffix = 2;
        loop {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                params![candidate],
                |row| row.get(0),
            )?;
            if !taken {
                return Ok(candidate);
            }
            candidate = format!("{}{}", base, suffix);
            suffix += 1;
        }
    }
}

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 30;
const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_sign_up(email: &str, username: &str, password: &str, confirm: &str) -> SignUpErrors {
    let mut errors = SignUpErrors::default();

    if email.is_empty() {
        errors.email = Some("Email must be provided".into());
    } else if !validate_email(email) {
        errors.email = Some("Invalid email format".into());
    }

    if !validate_username(username) {
        errors.username = Some(format!(
            "Username must be between {} and {} characters made of letters and numbers or letters only",
            MIN_USERNAME_LEN, MAX_USERNAME_LEN
        ));
    }

    if !validate_password(password) {
        errors.password = Some(format!(
            "Password must be at least {} characters, comprising of capital and small letters, numbers, and special characters",
            MIN_PASSWORD_LEN
        ));
    } else if password != confirm {
        errors.password = Some("Passwords do not match".into());
    }

    errors
}

/// `local@domain.tld` with a conservative character set. The host may not
/// start with a dot and the top-level domain is at least two letters.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9-][a-zA-Z0-9.-]*\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex")
});

pub fn validate_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

pub fn validate_username(username: &str) -> bool {
    let len = username.chars().count();
    (MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len)
        && username.chars().all(char::is_alphanumeric)
        && username.chars().any(char::is_alphabetic)
}

pub fn validate_password(password: &str) -> bool {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return false;
    }
    let has_lower = password.chars().any(char::is_lowercase);
    let has_upper = password.chars().any(char::is_uppercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password
        .chars()
        .any(|c| c.is_ascii_punctuation() || (!c.is_alphanumeric() && !c.is_whitespace()));
    has_lower && has_upper && has_digit && has_special
}
