pub mod claims;
pub mod jwt;
pub mod mailer;
pub mod otp;
pub mod password;

pub use claims::{Claims, TokenType};
pub use jwt::JwtKeys;
pub use mailer::{LogMailer, Mailer, OutgoingMail, SmtpMailer};
pub use otp::{check_otp, generate_otp, otp_digest, OtpCheck, PendingOtp, MAX_OTP_ATTEMPTS};
pub use password::{hash_password, temporary_password, verify_password};
