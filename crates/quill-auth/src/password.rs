use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("stored password hash is malformed")]
    MalformedHash,
    #[error("password hashing failed")]
    Hashing,
}

/// Hash a plaintext password with Argon2id and a fresh random salt.
/// The returned PHC string embeds algorithm, cost parameters, and salt, so
/// verification later needs only the plaintext and this string.
pub fn hash_password(plaintext: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| HashError::Hashing)
}

/// Check a plaintext password against a stored PHC hash string.
/// A mismatch is `Ok(false)`; only an unparsable stored hash is an error.
pub fn verify_password(plaintext: &str, stored: &str) -> Result<bool, HashError> {
    let parsed = PasswordHash::new(stored).map_err(|_| HashError::MalformedHash)?;
    match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(_) => Err(HashError::MalformedHash),
    }
}
