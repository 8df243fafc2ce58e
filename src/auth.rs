//! Credential hashing, login verification and registration.

use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{AppError, AppResult};
use crate::models::{Role, User};
use crate::store::CredentialStore;

pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, plaintext: &str) -> AppResult<String>;
    fn verify(&self, plaintext: &str, hash: &str) -> AppResult<bool>;
}

/// Argon2id with a random salt; hashes are PHC strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn hash(&self, plaintext: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::Internal(format!("password hashing: {e}")))
    }

    fn verify(&self, plaintext: &str, hash: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("stored hash unreadable: {e}")))?;
        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(format!("password verification: {e}"))),
        }
    }
}

/// Hash checked when the username is unknown, so both rejection paths do
/// the same work.
fn dummy_hash(verifier: &dyn CredentialVerifier) -> AppResult<&'static str> {
    static DUMMY: OnceLock<String> = OnceLock::new();
    if let Some(h) = DUMMY.get() {
        return Ok(h.as_str());
    }
    let h = verifier.hash("lms-dummy-credential")?;
    Ok(DUMMY.get_or_init(|| h).as_str())
}

/// Checks a login attempt. Unknown usernames and wrong passwords produce the
/// same [`AppError::InvalidCredentials`].
pub async fn authenticate_user(
    users: &dyn CredentialStore,
    verifier: &dyn CredentialVerifier,
    username: &str,
    password: &str,
) -> AppResult<User> {
    let Some(user) = users.user_by_username(username.trim()).await? else {
        let _ = verifier.verify(password, dummy_hash(verifier)?);
        return Err(AppError::InvalidCredentials);
    };
    if verifier.verify(password, &user.password_hash)? {
        Ok(user)
    } else {
        Err(AppError::InvalidCredentials)
    }
}

pub fn validate_password_strength(password: &str, min_length: usize) -> AppResult<()> {
    if password.chars().count() < min_length {
        return Err(AppError::InvalidInput(format!(
            "password must be at least {min_length} characters long"
        )));
    }
    Ok(())
}

/// Creates a student account. A taken username is a conflict.
pub async fn register_user(
    users: &dyn CredentialStore,
    verifier: &dyn CredentialVerifier,
    username: &str,
    password: &str,
    min_password_len: usize,
) -> AppResult<User> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::InvalidInput("username is required".into()));
    }
    validate_password_strength(password, min_password_len)?;
    let hash = verifier.hash(password)?;
    let user = users.create_user(username, &hash, Role::Student).await?;
    tracing::info!(user_id = user.id, "user registered");
    Ok(user)
}
