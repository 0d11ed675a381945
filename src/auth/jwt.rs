use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use super::claims::{Claims, TokenType};
use crate::{models::Role, AppError};

/// Signs and checks the service's own HS256 tokens.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl JwtKeys {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn issue(
        &self,
        user_id: i64,
        email: &str,
        role: Role,
        token_type: TokenType,
    ) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl_secs,
            TokenType::Refresh => self.refresh_ttl_secs,
        };

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            token_type,
            exp: now + ttl,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Issue an access/refresh pair for a user.
    pub fn issue_pair(
        &self,
        user_id: i64,
        email: &str,
        role: Role,
    ) -> Result<(String, String), AppError> {
        let access = self.issue(user_id, email, role, TokenType::Access)?;
        let refresh = self.issue(user_id, email, role, TokenType::Refresh)?;
        Ok((access, refresh))
    }

    /// Decode a token and require the given type.
    pub fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| format!("JWT validation failed: {}", e))?;

        if token_data.claims.token_type != expected {
            return Err("Token has wrong type".to_string());
        }

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key_for_testing_purposes_only";

    #[test]
    fn test_issue_and_validate_pair() {
        let keys = JwtKeys::new(SECRET, 60, 120);
        let (access, refresh) = keys.issue_pair(7, "dr@clinic.org", Role::Doctor).unwrap();

        let claims = keys.validate(&access, TokenType::Access).unwrap();
        assert_eq!(claims.user_id(), Some(7));
        assert_eq!(claims.role, Role::Doctor);
        assert_eq!(claims.exp - claims.iat, 60);

        let claims = keys.validate(&refresh, TokenType::Refresh).unwrap();
        assert_eq!(claims.exp - claims.iat, 120);
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let keys = JwtKeys::new(SECRET, 60, 60);
        let (access, refresh) = keys.issue_pair(1, "a@b.co", Role::Admin).unwrap();

        assert!(keys.validate(&access, TokenType::Refresh).is_err());
        assert!(keys.validate(&refresh, TokenType::Access).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = JwtKeys::new(SECRET, -10, 60);
        let token = keys.issue(1, "a@b.co", Role::Admin, TokenType::Access).unwrap();
        assert!(keys.validate(&token, TokenType::Access).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let keys = JwtKeys::new(SECRET, 60, 60);
        let other = JwtKeys::new("another_secret_key_that_is_long_enough", 60, 60);
        let token = keys.issue(1, "a@b.co", Role::Admin, TokenType::Access).unwrap();
        assert!(other.validate(&token, TokenType::Access).is_err());
    }
}
