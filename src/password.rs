use argon2::{
    password_hash::{self, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::rngs::OsRng;
use tokio::task;

use crate::errors::AppError;

/// Argon2 is CPU-bound; keep it off the async workers.
async fn blocking<T, F>(op: &'static str, f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!(op, error = %e, "password task failed");
        AppError::Internal(format!("{op}: {e}"))
    })?
}

pub async fn hash_password(plain: &str) -> Result<String, AppError> {
    let plain = plain.to_owned();
    blocking("hash password", move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AppError::Internal(format!("argon2 hash: {e}")))
    })
    .await
}

/// `Ok(false)` on a mismatch. A stored hash that does not parse is an
/// internal error, not a failed login.
pub async fn verify_password(plain: &str, stored: &str) -> Result<bool, AppError> {
    let plain = plain.to_owned();
    let stored = stored.to_owned();
    blocking("verify password", move || {
        let parsed = PasswordHash::new(&stored).map_err(|e| {
            tracing::error!(error = %e, "stored password hash is unreadable");
            AppError::Internal(format!("bad password hash: {e}"))
        })?;
        match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(format!("argon2 verify: {e}"))),
        }
    })
    .await
}
