use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use validator::ValidateEmail;

use strategyforge_observability::log_timed;

use crate::errors::{AuthError, AuthResult};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;
const MIN_NAME_LEN: usize = 2;
const MAX_NAME_LEN: usize = 100;

/// Password hashing and input policy.
pub struct SecurityService {
    argon2: Argon2<'static>,
    // Verified against when there is no real hash to check, so a miss costs
    // the same as a wrong password.
    dummy_hash: String,
}

impl SecurityService {
    pub fn new() -> AuthResult<Self> {
        let argon2 = Argon2::default();
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(b"strategyforge-timing-equaliser", &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();

        Ok(Self { argon2, dummy_hash })
    }

    // Password hashing and validation methods
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = log_timed!("hash_password", self.argon2.hash_password(password.as_bytes(), &salt))
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        Ok(password_hash.to_string())
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> AuthResult<bool> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| AuthError::Hashing(e.to_string()))?;
        match log_timed!("verify_password", self.argon2.verify_password(password.as_bytes(), &parsed_hash)) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Hashing(e.to_string())),
        }
    }

    /// Spend one verification's worth of work and discard the result.
    pub fn burn_verification(&self, password: &str) {
        let _ = self.verify_password(password, &self.dummy_hash);
    }

    pub fn validate_password_strength(&self, password: &str) -> Result<(), String> {
        let length = password.chars().count();
        if length < MIN_PASSWORD_LEN {
            return Err(format!("Password must be at least {} characters long", MIN_PASSWORD_LEN));
        }

        if length > MAX_PASSWORD_LEN {
            return Err(format!("Password must be at most {} characters long", MAX_PASSWORD_LEN));
        }

        if !password.chars().any(|c| c.is_uppercase()) {
            return Err("Password must contain at least one uppercase letter".to_string());
        }

        if !password.chars().any(|c| c.is_lowercase()) {
            return Err("Password must contain at least one lowercase letter".to_string());
        }

        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err("Password must contain at least one number".to_string());
        }

        Ok(())
    }

    /// Trim and strip control characters.
    pub fn sanitize_input(&self, input: &str) -> String {
        input.trim().chars().filter(|c| !c.is_control()).collect()
    }

    pub fn normalize_email(&self, email: &str) -> String {
        self.sanitize_input(email).to_lowercase()
    }

    pub fn validate_email(&self, email: &str) -> AuthResult<()> {
        if email.is_empty() || !email.validate_email() {
            return Err(AuthError::InvalidEmail);
        }
        Ok(())
    }

    pub fn validate_name(&self, name: &str) -> AuthResult<()> {
        let length = name.chars().count();
        if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&length) {
            return Err(AuthError::InvalidName);
        }
        Ok(())
    }
}
