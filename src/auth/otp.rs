use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Wrong submissions tolerated before the pending code is discarded.
pub const MAX_OTP_ATTEMPTS: i32 = 5;

/// Draw a 6-digit, zero-padded one-time code
pub fn generate_otp() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", code)
}

/// Digest stored in place of the code: hex(HMAC-SHA256(secret, email:code)).
/// Binding the email keeps a digest from validating for another account.
pub fn otp_digest(email: &str, code: &str, secret: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("HMAC initialization error: {}", e)))?;

    mac.update(email.to_lowercase().as_bytes());
    mac.update(b":");
    mac.update(code.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// The code state stored on a user row.
#[derive(Debug, Clone, Copy)]
pub struct PendingOtp<'a> {
    pub digest: Option<&'a str>,
    pub issued_at: Option<DateTime<Utc>>,
    pub attempts: i32,
}

/// What to do with a submitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    /// Matches. Consume the digest.
    Accepted,
    /// Wrong code with attempts left. Count it.
    Rejected,
    /// Expired or out of attempts. Discard the digest.
    Discard,
    /// Nothing pending, either never issued or already consumed.
    NotPending,
}

impl OtpCheck {
    pub fn is_accepted(self) -> bool {
        self == OtpCheck::Accepted
    }
}

/// Decide the outcome of a submitted code against the stored state.
pub fn check_otp(
    email: &str,
    submitted: &str,
    pending: PendingOtp<'_>,
    now: DateTime<Utc>,
    ttl_secs: i64,
    secret: &str,
) -> Result<OtpCheck, AppError> {
    let (Some(stored), Some(issued_at)) = (pending.digest, pending.issued_at) else {
        return Ok(OtpCheck::NotPending);
    };

    if (now - issued_at).num_seconds() > ttl_secs || pending.attempts >= MAX_OTP_ATTEMPTS {
        return Ok(OtpCheck::Discard);
    }

    let expected = otp_digest(email, submitted, secret)?;
    if bool::from(expected.as_bytes().ct_eq(stored.as_bytes())) {
        Ok(OtpCheck::Accepted)
    } else if pending.attempts + 1 >= MAX_OTP_ATTEMPTS {
        Ok(OtpCheck::Discard)
    } else {
        Ok(OtpCheck::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &str = "test_secret_key_for_testing_purposes";

    fn pending(digest: &str, issued_at: DateTime<Utc>, attempts: i32) -> PendingOtp<'_> {
        PendingOtp {
            digest: Some(digest),
            issued_at: Some(issued_at),
            attempts,
        }
    }

    #[test]
    fn test_generated_code_shape() {
        for _ in 0..100 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_check_within_ttl() {
        let now = Utc::now();
        let digest = otp_digest("dr@clinic.org", "012345", SECRET).unwrap();

        let ok = check_otp("dr@clinic.org", "012345", pending(&digest, now, 0), now, 300, SECRET);
        assert_eq!(ok.unwrap(), OtpCheck::Accepted);

        let wrong = check_otp("dr@clinic.org", "012346", pending(&digest, now, 0), now, 300, SECRET);
        assert_eq!(wrong.unwrap(), OtpCheck::Rejected);
    }

    #[test]
    fn test_expired_code_discarded() {
        let issued = Utc::now();
        let later = issued + Duration::seconds(301);
        let digest = otp_digest("dr@clinic.org", "999999", SECRET).unwrap();

        let outcome =
            check_otp("dr@clinic.org", "999999", pending(&digest, issued, 0), later, 300, SECRET);
        assert_eq!(outcome.unwrap(), OtpCheck::Discard);
    }

    #[test]
    fn test_consumed_code_cannot_be_reused() {
        let now = Utc::now();
        let digest = otp_digest("dr@clinic.org", "123456", SECRET).unwrap();
        let first = check_otp("dr@clinic.org", "123456", pending(&digest, now, 0), now, 300, SECRET);
        assert!(first.unwrap().is_accepted());

        // Acceptance clears the digest and issue time on the row.
        let consumed = PendingOtp {
            digest: None,
            issued_at: None,
            attempts: 0,
        };
        let second = check_otp("dr@clinic.org", "123456", consumed, now, 300, SECRET);
        assert_eq!(second.unwrap(), OtpCheck::NotPending);
    }

    #[test]
    fn test_last_wrong_attempt_discards_code() {
        let now = Utc::now();
        let digest = otp_digest("dr@clinic.org", "123456", SECRET).unwrap();

        for attempts in 0..MAX_OTP_ATTEMPTS - 1 {
            let outcome =
                check_otp("dr@clinic.org", "000000", pending(&digest, now, attempts), now, 300, SECRET);
            assert_eq!(outcome.unwrap(), OtpCheck::Rejected);
        }
        let last = check_otp(
            "dr@clinic.org",
            "000000",
            pending(&digest, now, MAX_OTP_ATTEMPTS - 1),
            now,
            300,
            SECRET,
        );
        assert_eq!(last.unwrap(), OtpCheck::Discard);

        // Even the right code is refused once the attempts are spent.
        let late = check_otp(
            "dr@clinic.org",
            "123456",
            pending(&digest, now, MAX_OTP_ATTEMPTS),
            now,
            300,
            SECRET,
        );
        assert_eq!(late.unwrap(), OtpCheck::Discard);
    }

    #[test]
    fn test_digest_bound_to_email() {
        let now = Utc::now();
        let digest = otp_digest("one@clinic.org", "123456", SECRET).unwrap();
        let outcome = check_otp("two@clinic.org", "123456", pending(&digest, now, 0), now, 300, SECRET);
        assert!(!outcome.unwrap().is_accepted());
    }
}
