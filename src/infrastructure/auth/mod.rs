//! Auth Gateway Implementation
//!
//! JWT validation shared by the HTTP middleware and the WebSocket
//! handshake. Token issuance belongs to the external identity service.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::AuthGateway;
use crate::shared::error::AppError;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
}

/// JWT-backed auth gateway.
pub struct JwtAuthGateway {
    secret: String,
}

impl JwtAuthGateway {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl AuthGateway for JwtAuthGateway {
    fn authenticate(&self, token: &str) -> Result<i64, AppError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::Unauthorized("Token expired".into())
            }
            _ => AppError::Unauthorized("Invalid token".into()),
        })?;

        token_data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Unauthorized("Invalid token claims".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str, secret: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            exp: now + exp_offset,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_resolves_user_id() {
        let gateway = JwtAuthGateway::new("test-secret-test-secret-test-secret");
        let token = token_for("42", "test-secret-test-secret-test-secret", 3600);
        assert_eq!(gateway.authenticate(&token).unwrap(), 42);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let gateway = JwtAuthGateway::new("test-secret-test-secret-test-secret");
        let token = token_for("42", "another-secret-another-secret-42", 3600);
        assert!(matches!(
            gateway.authenticate(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let gateway = JwtAuthGateway::new("test-secret-test-secret-test-secret");
        let token = token_for("42", "test-secret-test-secret-test-secret", -3600);
        assert!(matches!(
            gateway.authenticate(&token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_non_numeric_subject_is_rejected() {
        let gateway = JwtAuthGateway::new("test-secret-test-secret-test-secret");
        let token = token_for("alice", "test-secret-test-secret-test-secret", 3600);
        assert!(matches!(
            gateway.authenticate(&token),
            Err(AppError::Unauthorized(_))
        ));
    }
}
