//! services/api/src/seed.rs
//!
//! Startup seeding of the single user every story belongs to.

use crate::error::ApiError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use storybook_core::{domain::User, ports::DatabaseService};
use tracing::info;

/// Hashes a password into a PHC string with a fresh salt.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {}", e)))
}

/// Makes sure the default user exists and returns it.
pub async fn ensure_default_user(
    db: &dyn DatabaseService,
    email: &str,
    password: &str,
) -> Result<User, ApiError> {
    let password_hash = hash_password(password)?;
    let user = db.ensure_user(email, &password_hash).await?;
    info!(user_id = %user.id, email = %user.email, "Default user ready");
    Ok(user)
}
