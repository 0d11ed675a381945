use std::time::{Duration, Instant};

use super::{ClientError, ClientResult, RecordsClient, Session, SessionStore};
use crate::models::{LoginInput, VerifyOtpInput};
use crate::validation;

/// Seconds before the resend button is offered again.
pub const RESEND_COOLDOWN_SECS: u64 = 120;

/// Display timer for the resend button. Purely cosmetic; the server decides
/// whether a new code is issued.
#[derive(Debug, Clone, Copy)]
pub struct ResendCountdown {
    started: Instant,
    length: Duration,
}

impl ResendCountdown {
    pub fn start(now: Instant) -> Self {
        Self {
            started: now,
            length: Duration::from_secs(RESEND_COOLDOWN_SECS),
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.length
            .saturating_sub(now.saturating_duration_since(self.started))
    }

    /// Whole seconds left, rounded up, as shown to the user.
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        let remaining = self.remaining(now);
        remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
    }

    pub fn can_resend(&self, now: Instant) -> bool {
        self.remaining(now).is_zero()
    }

    pub fn restart(&mut self, now: Instant) {
        self.started = now;
    }
}

/// Second login step: collects the mailed code for one email.
pub struct OtpGate<'a, S: SessionStore> {
    client: &'a RecordsClient<S>,
    email: String,
    countdown: ResendCountdown,
}

impl<'a, S: SessionStore + 'static> OtpGate<'a, S> {
    pub(crate) fn new(client: &'a RecordsClient<S>, email: String) -> Self {
        Self {
            client,
            email,
            countdown: ResendCountdown::start(Instant::now()),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn countdown(&self) -> &ResendCountdown {
        &self.countdown
    }

    /// Check the code format, exchange it for tokens and store the session.
    pub async fn submit(&self, code: &str) -> ClientResult<Session> {
        let code = code.trim();
        validation::validate_otp_code(code).map_err(|e| ClientError::Validation(vec![e]))?;

        let pair = self
            .client
            .verify_otp(&VerifyOtpInput {
                email: self.email.clone(),
                otp: code.to_string(),
            })
            .await?;

        let session = Session::from(pair);
        self.client.store.save(&session)?;
        tracing::info!(user_id = ?session.user_id, "Logged in");
        Ok(session)
    }

    /// Ask for a fresh code by repeating the password step.
    pub async fn resend(&mut self, password: &str) -> ClientResult<()> {
        let input = LoginInput {
            email: self.email.clone(),
            password: password.to_string(),
        };
        let _: crate::models::AuthMessageResponse =
            self.client.post_public("api/auth/login/", &input).await?;
        self.countdown.restart(Instant::now());
        Ok(())
    }
}
