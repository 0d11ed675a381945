use std::env;

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Length of the AES-256 document key in bytes.
pub const DOCUMENT_KEY_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub cors_origin: String,
    pub frontend_url: String,
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub otp_ttl_secs: i64,
    pub document_key: [u8; DOCUMENT_KEY_LEN],
    pub auth_rate_limit_per_min: u32,
    pub write_rate_limit_per_min: u32,
    /// Rate limits key on `X-Forwarded-For` only when a trusted proxy sets it.
    pub trust_proxy: bool,
    pub smtp: Option<SmtpConfig>,
    /// Seeded at startup when both are set and no such account exists.
    pub bootstrap_admin: Option<(String, String)>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| "JWT_SECRET must be set".to_string())?;
        if jwt_secret.len() < 32 {
            return Err("JWT_SECRET must be at least 32 characters".to_string());
        }

        let document_key = env::var("DOCUMENT_AES_KEY")
            .map_err(|_| "DOCUMENT_AES_KEY must be set".to_string())
            .and_then(|raw| decode_document_key(&raw))?;

        let smtp = match env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: parse_or("SMTP_PORT", 587)?,
                username: env::var("SMTP_USERNAME").ok(),
                password: env::var("SMTP_PASSWORD").ok(),
                from: env::var("MAIL_FROM")
                    .map_err(|_| "MAIL_FROM must be set when SMTP_HOST is set".to_string())?,
            }),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            jwt_secret,
            // Both lifetimes default to seven days.
            access_token_ttl_secs: parse_or("ACCESS_TOKEN_TTL_SECS", 7 * 24 * 3600)?,
            refresh_token_ttl_secs: parse_or("REFRESH_TOKEN_TTL_SECS", 7 * 24 * 3600)?,
            otp_ttl_secs: parse_or("OTP_TTL_SECS", 300)?,
            document_key,
            auth_rate_limit_per_min: parse_or("AUTH_RATE_LIMIT_PER_MIN", 10)?,
            write_rate_limit_per_min: parse_or("WRITE_RATE_LIMIT_PER_MIN", 15)?,
            trust_proxy: parse_or("TRUST_PROXY", false)?,
            smtp,
            bootstrap_admin: match (env::var("ADMIN_EMAIL"), env::var("ADMIN_PASSWORD")) {
                (Ok(email), Ok(password)) => Some((email, password)),
                _ => None,
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Decode the base64 document key and check it is exactly 32 bytes.
pub fn decode_document_key(raw: &str) -> Result<[u8; DOCUMENT_KEY_LEN], String> {
    let bytes = STANDARD
        .decode(raw.trim())
        .map_err(|e| format!("Base64 decode error: {}", e))?;

    bytes.try_into().map_err(|b: Vec<u8>| {
        format!(
            "DOCUMENT_AES_KEY must decode to {} bytes, got {}",
            DOCUMENT_KEY_LEN,
            b.len()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_document_key() {
        let encoded = STANDARD.encode([7u8; 32]);
        let key = decode_document_key(&encoded).unwrap();
        assert_eq!(key, [7u8; 32]);
    }

    #[test]
    fn test_decode_document_key_wrong_length() {
        let encoded = STANDARD.encode([1u8; 16]);
        let err = decode_document_key(&encoded).unwrap_err();
        assert!(err.contains("32 bytes"));
    }

    #[test]
    fn test_decode_document_key_not_base64() {
        assert!(decode_document_key("not base64 !!").is_err());
    }
}
