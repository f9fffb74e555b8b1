//! Password hashing and session tokens.

use std::borrow::Cow;

use bcrypt::DEFAULT_COST;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidationError;

use crate::config::JwtConfig;
use crate::error::{AppError, AuthError};

/// Hashes with a fixed work factor. CPU-bound: call it from
/// `spawn_blocking` when on the async runtime.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// `false` for a wrong password and for a hash that cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub const MIN_PASSWORD_LEN: usize = 8;

/// At least eight characters mixing upper case, lower case, digits and symbols.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let long_enough = password.chars().count() >= MIN_PASSWORD_LEN;
    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if long_enough && has_upper && has_lower && has_digit && has_symbol {
        Ok(())
    } else {
        Err(ValidationError::new("password_strength").with_message(Cow::Borrowed(
            "password must be at least 8 characters and contain upper case, lower case, a digit and a symbol",
        )))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    iat: i64,
    exp: i64,
}

/// Issues and checks HS256 session tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            lifetime: Duration::try_hours(config.expires_in_hours).unwrap_or(Duration::MAX),
        }
    }

    /// Seconds a freshly issued token stays valid.
    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime.num_seconds()
    }

    pub fn issue_token(&self, user_id: Uuid) -> Result<String, AppError> {
        self.issue_token_at(user_id, Utc::now())
    }

    pub fn issue_token_at(&self, user_id: Uuid, issued_at: DateTime<Utc>) -> Result<String, AppError> {
        let expires_at = issued_at
            .checked_add_signed(self.lifetime)
            .ok_or_else(|| AppError::Internal("token lifetime out of range".to_string()))?;
        let claims = Claims {
            sub: user_id,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Uuid, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims.sub)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                _ => AuthError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tokens(secret: &str) -> TokenService {
        TokenService::new(&JwtConfig {
            secret: secret.to_string(),
            expires_in_hours: 24,
        })
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("Sup3r$ecret").unwrap();
        assert_ne!(hash, "Sup3r$ecret");
        assert!(verify_password("Sup3r$ecret", &hash));
        assert!(!verify_password("sup3r$ecret", &hash));
    }

    #[test]
    fn garbage_hash_is_a_mismatch() {
        assert!(!verify_password("whatever", "not-a-bcrypt-hash"));
    }

    #[test]
    fn oversized_lifetime_fails_instead_of_panicking() {
        let svc = TokenService::new(&JwtConfig {
            secret: "secret".to_string(),
            expires_in_hours: i64::MAX,
        });
        let err = svc.issue_token(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn token_round_trip() {
        let svc = tokens("secret");
        let id = Uuid::new_v4();
        let token = svc.issue_token(id).unwrap();
        assert_eq!(svc.verify_token(&token), Ok(id));
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = tokens("secret");
        let issued = Utc::now() - Duration::hours(25);
        let token = svc.issue_token_at(Uuid::new_v4(), issued).unwrap();
        assert_eq!(svc.verify_token(&token), Err(AuthError::Expired));
    }

    #[test]
    fn foreign_secret_is_an_invalid_signature() {
        let token = tokens("one").issue_token(Uuid::new_v4()).unwrap();
        assert_eq!(tokens("two").verify_token(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn other_algorithm_is_refused() {
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert_eq!(tokens("secret").verify_token(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(tokens("secret").verify_token("abc.def"), Err(AuthError::Malformed));
        assert_eq!(tokens("secret").verify_token(""), Err(AuthError::Malformed));
    }

    #[test]
    fn password_policy() {
        assert!(validate_password_strength("Passw0rd!").is_ok());
        assert!(validate_password_strength("Pa0!").is_err());
        assert!(validate_password_strength("password0!").is_err());
        assert!(validate_password_strength("PASSWORD0!").is_err());
        assert!(validate_password_strength("Password!!").is_err());
        assert!(validate_password_strength("Password00").is_err());
    }

    proptest! {
        #[test]
        fn passwords_without_a_digit_never_pass(p in "[A-Za-z!@#%]{0,32}") {
            prop_assert!(validate_password_strength(&p).is_err());
        }

        #[test]
        fn strong_shape_always_passes(core in "[a-z]{5,20}") {
            let password = format!("A{core}7#");
            prop_assert!(validate_password_strength(&password).is_ok());
        }
    }
}
