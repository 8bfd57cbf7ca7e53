use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use uuid::Uuid;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash of a random secret nobody knows, verified against for unknown emails.
static DUMMY_HASH: Lazy<Option<PasswordHashString>> =
    Lazy::new(|| hash_password(&Password::new(Uuid::new_v4().to_string())).ok());

/// Plain-text password, kept out of `Debug` output and logs.
#[derive(Debug, Clone)]
pub struct Password(Secret<String>);

impl Password {
    pub fn new(password: String) -> Self {
        Self(Secret::new(password))
    }

    /// Accept a caller-supplied password only if it meets the length rule.
    pub fn parse(password: String) -> Result<Self, AppError> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::bad_request(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(Self::new(password))
    }

    fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id with a fresh random salt embedded in the PHC string.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.expose().as_bytes(), &salt)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to hash password: {}", e)))?
        .to_string();

    Ok(PasswordHashString::new(hash))
}

/// Constant-time check of `password` against a stored PHC hash.
pub fn verify_password(password: &Password, hash: &PasswordHashString) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash.as_str()).map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Invalid password hash format: {}", e))
    })?;

    Ok(Argon2::default()
        .verify_password(password.expose().as_bytes(), &parsed)
        .is_ok())
}

/// Spend the same argon2 work as a real check, then fail. Used when no
/// account matches so response time does not reveal which emails exist.
pub fn verify_unknown_user(password: &Password) -> bool {
    if let Some(hash) = DUMMY_HASH.as_ref() {
        let _ = verify_password(password, hash);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_argon2_phc_string() {
        let hash = hash_password(&Password::new("urea-45kg-bag".to_string())).expect("hashes");
        assert!(hash.as_str().starts_with("$argon2"));
    }

    #[test]
    fn verify_accepts_only_the_original_password() {
        let password = Password::new("urea-45kg-bag".to_string());
        let hash = hash_password(&password).expect("hashes");

        assert!(verify_password(&password, &hash).expect("hash parses"));
        assert!(!verify_password(&Password::new("wrong-password".to_string()), &hash)
            .expect("hash parses"));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let password = Password::new("urea-45kg-bag".to_string());
        let first = hash_password(&password).expect("hashes");
        let second = hash_password(&password).expect("hashes");
        assert_ne!(first.as_str(), second.as_str());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(Password::parse("short".to_string()).is_err());
        assert!(Password::parse("long-enough".to_string()).is_ok());
    }

    #[test]
    fn unknown_user_verification_runs_argon2_and_fails() {
        let hash = DUMMY_HASH.as_ref().expect("dummy hash is built");
        assert!(hash.as_str().starts_with("$argon2"));
        assert!(!verify_unknown_user(&Password::new("urea-45kg-bag".to_string())));
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let result = verify_password(
            &Password::new("anything".to_string()),
            &PasswordHashString::new("not-a-hash".to_string()),
        );
        assert!(result.is_err());
    }
}
