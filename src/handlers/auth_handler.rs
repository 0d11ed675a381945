use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::{
    auth::{self, OtpCheck, OutgoingMail, PendingOtp, TokenType, MAX_OTP_ATTEMPTS},
    extractors::AuthenticatedUser,
    models::{
        AccessTokenResponse, AuthMessageResponse, CreateDoctorInput, Hospital, LoginInput,
        MessageResponse, RefreshInput, RegisterInput, Role, TokenPairResponse, User, UserProfile,
        VerifyOtpInput,
    },
    validation::{self, Validator},
    AppError, AppResult, AppState,
};

/// Invitation links outlive a login code.
const INVITATION_TTL_SECS: i64 = 72 * 3600;

async fn find_user_by_email(db: &sqlx::PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE LOWER(email) = LOWER($1)"#)
        .bind(email.trim())
        .fetch_optional(db)
        .await
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn pending_otp(user: &User) -> PendingOtp<'_> {
    PendingOtp {
        digest: user.otp_digest.as_deref(),
        issued_at: user.otp_created_at,
        attempts: user.otp_attempts,
    }
}

/// How a registration request relates to any account already on the email.
#[derive(Debug)]
enum Registration<'a> {
    Create,
    CompleteInvitation(&'a User),
    Conflict,
}

fn registration_for(existing: Option<&User>) -> Registration<'_> {
    match existing {
        None => Registration::Create,
        Some(user) if user.invitation_pending => Registration::CompleteInvitation(user),
        Some(_) => Registration::Conflict,
    }
}

/// Count or discard after a code that was not accepted. Both updates only
/// touch the digest that was checked.
async fn record_failed_otp(
    db: &sqlx::PgPool,
    user: &User,
    outcome: OtpCheck,
) -> Result<(), sqlx::Error> {
    let sql = match outcome {
        OtpCheck::Rejected => {
            r#"UPDATE users SET otp_attempts = otp_attempts + 1 WHERE id = $1 AND otp_digest = $2"#
        }
        OtpCheck::Discard => {
            r#"
            UPDATE users SET otp_digest = NULL, otp_created_at = NULL, otp_attempts = 0
            WHERE id = $1 AND otp_digest = $2
            "#
        }
        OtpCheck::Accepted | OtpCheck::NotPending => return Ok(()),
    };

    sqlx::query(sql)
        .bind(user.id)
        .bind(user.otp_digest.as_deref())
        .execute(db)
        .await?;

    if outcome == OtpCheck::Discard {
        tracing::info!(user_id = user.id, "Pending code discarded");
    }
    Ok(())
}

/// POST /api/auth/register/
#[utoipa::path(
    post,
    path = "/api/auth/register/",
    request_body = RegisterInput,
    responses(
        (status = 201, description = "Account created or invitation completed", body = AuthMessageResponse),
        (status = 400, description = "Invalid or expired invitation token"),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Validation failed")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RegisterInput>,
) -> AppResult<(StatusCode, Json<AuthMessageResponse>)> {
    let mut v = Validator::new();
    v.check(validation::validate_email(&input.email))
        .check(validation::validate_name("username", &input.username, 50));
    let mut errors = v.finish().err().unwrap_or_default();
    if let Err(password_errors) =
        validation::validate_registration(&input.password, &input.confirm_password)
    {
        errors.extend(password_errors);
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let email = normalize_email(&input.email);
    let username = input.username.trim().to_string();
    let password_hash = auth::hash_password(&input.password)?;

    let existing = find_user_by_email(&state.db, &email).await?;
    match registration_for(existing.as_ref()) {
        Registration::CompleteInvitation(user) => {
            let invalid = || AppError::BadRequest("Invalid or expired invitation token".to_string());
            let token = input.token.as_deref().unwrap_or_default();
            let outcome = auth::check_otp(
                &user.email,
                token,
                pending_otp(user),
                Utc::now(),
                INVITATION_TTL_SECS,
                &state.config.jwt_secret,
            )?;
            if !outcome.is_accepted() {
                record_failed_otp(&state.db, user, outcome).await?;
                return Err(invalid());
            }

            // The token is consumed with the update, so a link completes once.
            let completed = sqlx::query(
                r#"
                UPDATE users
                SET username = $1, password_hash = $2, invitation_pending = FALSE,
                    otp_digest = NULL, otp_created_at = NULL, otp_attempts = 0
                WHERE id = $3 AND otp_digest = $4 AND invitation_pending
                "#,
            )
            .bind(&username)
            .bind(&password_hash)
            .bind(user.id)
            .bind(user.otp_digest.as_deref())
            .execute(&state.db)
            .await?;
            if completed.rows_affected() == 0 {
                return Err(invalid());
            }

            tracing::info!(user_id = user.id, "Invited doctor completed registration");
        }
        Registration::Conflict => {
            return Err(AppError::Conflict(
                "A user with this email already exists".to_string(),
            ));
        }
        Registration::Create => {
            let user_id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO users (username, email, password_hash, role)
                VALUES ($1, $2, $3, $4)
                RETURNING id
                "#,
            )
            .bind(&username)
            .bind(&email)
            .bind(&password_hash)
            .bind(Role::Doctor.as_str())
            .fetch_one(&state.db)
            .await
            .map_err(|e| {
                AppError::from_constraint(e, "A user with this email already exists", "Not found")
            })?;

            tracing::info!(user_id, "User registered");
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(AuthMessageResponse {
            message: "User registered successfully".to_string(),
            email,
        }),
    ))
}

/// POST /api/auth/login/ - Check the password and mail a one-time code
#[utoipa::path(
    post,
    path = "/api/auth/login/",
    request_body = LoginInput,
    responses(
        (status = 200, description = "OTP sent", body = AuthMessageResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(input): Json<LoginInput>,
) -> AppResult<Json<AuthMessageResponse>> {
    validation::validate_email(&input.email).map_err(|e| AppError::Validation(vec![e]))?;

    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user = find_user_by_email(&state.db, &input.email)
        .await?
        .filter(|u| u.is_active && !u.invitation_pending)
        .ok_or_else(invalid)?;

    if !auth::verify_password(&input.password, &user.password_hash)? {
        tracing::info!(user_id = user.id, "Login rejected: wrong password");
        return Err(invalid());
    }

    let code = auth::generate_otp();
    let digest = auth::otp_digest(&user.email, &code, &state.config.jwt_secret)?;

    sqlx::query(
        r#"UPDATE users SET otp_digest = $1, otp_created_at = NOW(), otp_attempts = 0 WHERE id = $2"#,
    )
        .bind(&digest)
        .bind(user.id)
        .execute(&state.db)
        .await?;

    state.mailer.send(OutgoingMail::otp(&user.email, &code)).await?;
    tracing::info!(user_id = user.id, "OTP issued");

    Ok(Json(AuthMessageResponse {
        message: "OTP sent to your email".to_string(),
        email: user.email,
    }))
}

/// POST /api/auth/verify-otp/ - Exchange a valid code for a token pair
#[utoipa::path(
    post,
    path = "/api/auth/verify-otp/",
    request_body = VerifyOtpInput,
    responses(
        (status = 200, description = "Login successful", body = TokenPairResponse),
        (status = 400, description = "Invalid or expired OTP"),
        (status = 404, description = "User not found")
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(input): Json<VerifyOtpInput>,
) -> AppResult<Json<TokenPairResponse>> {
    let mut v = Validator::new();
    v.check(validation::validate_email(&input.email))
        .check(validation::validate_otp_code(&input.otp));
    v.finish()?;

    let invalid = || AppError::BadRequest("Invalid or expired OTP".to_string());

    let user = find_user_by_email(&state.db, &input.email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !user.is_active || user.invitation_pending {
        return Err(invalid());
    }

    let outcome = auth::check_otp(
        &user.email,
        &input.otp,
        pending_otp(&user),
        Utc::now(),
        state.config.otp_ttl_secs,
        &state.config.jwt_secret,
    )?;
    if !outcome.is_accepted() {
        tracing::info!(user_id = user.id, outcome = ?outcome, "OTP rejected");
        record_failed_otp(&state.db, &user, outcome).await?;
        return Err(invalid());
    }

    // Clear only the digest that was checked, so a code is usable once.
    let consumed = sqlx::query(
        r#"
        UPDATE users SET otp_digest = NULL, otp_created_at = NULL, otp_attempts = 0
        WHERE id = $1 AND otp_digest = $2 AND otp_attempts < $3
        "#,
    )
    .bind(user.id)
    .bind(user.otp_digest.as_deref())
    .bind(MAX_OTP_ATTEMPTS)
    .execute(&state.db)
    .await?;
    if consumed.rows_affected() == 0 {
        return Err(invalid());
    }

    let (access, refresh) = state.jwt.issue_pair(user.id, &user.email, user.role)?;
    tracing::info!(user_id = user.id, role = %user.role, "Login successful");

    Ok(Json(TokenPairResponse {
        access,
        refresh,
        user_id: user.id,
        role: user.role,
        message: "Login successful".to_string(),
    }))
}

/// POST /api/auth/token/refresh/
#[utoipa::path(
    post,
    path = "/api/auth/token/refresh/",
    request_body = RefreshInput,
    responses(
        (status = 200, description = "New access token", body = AccessTokenResponse),
        (status = 401, description = "Refresh token invalid or expired")
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RefreshInput>,
) -> AppResult<Json<AccessTokenResponse>> {
    let invalid = || AppError::Unauthorized("Token is invalid or expired".to_string());

    let claims = state
        .jwt
        .validate(&input.refresh, TokenType::Refresh)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected refresh token");
            invalid()
        })?;
    let user_id = claims.user_id().ok_or_else(invalid)?;

    let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1"#)
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(invalid)?;

    let access = state
        .jwt
        .issue(user.id, &user.email, user.role, TokenType::Access)?;

    Ok(Json(AccessTokenResponse { access }))
}

/// GET /api/auth/me/
#[utoipa::path(
    get,
    path = "/api/auth/me/",
    responses(
        (status = 200, description = "Current authenticated user", body = UserProfile),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> AppResult<Json<UserProfile>> {
    let user = sqlx::query_as::<_, User>(r#"SELECT * FROM users WHERE id = $1"#)
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(user.into()))
}

/// POST /api/auth/create-doctor/ - Admin invites a doctor attached to a hospital
#[utoipa::path(
    post,
    path = "/api/auth/create-doctor/",
    request_body = CreateDoctorInput,
    responses(
        (status = 201, description = "Doctor created, or pending invitation reissued", body = MessageResponse),
        (status = 403, description = "Only Admin can create doctors"),
        (status = 404, description = "Hospital not found"),
        (status = 409, description = "Email already registered")
    ),
    tag = "auth",
    security(("bearer_auth" = []))
)]
pub async fn create_doctor(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(input): Json<CreateDoctorInput>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    if !auth.is_admin() {
        return Err(AppError::Forbidden("Only Admin can create doctors".to_string()));
    }
    validation::validate_email(&input.email).map_err(|e| AppError::Validation(vec![e]))?;

    let hospital = sqlx::query_as::<_, Hospital>(r#"SELECT id, name FROM hospitals WHERE id = $1"#)
        .bind(input.hospital)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Hospital {} not found", input.hospital)))?;

    let email = normalize_email(&input.email);
    let username: String = email.split('@').next().unwrap_or_default().chars().take(50).collect();
    let password_hash = auth::hash_password(&auth::temporary_password())?;
    let code = auth::generate_otp();
    let digest = auth::otp_digest(&email, &code, &state.config.jwt_secret)?;

    let existing = find_user_by_email(&state.db, &email).await?;
    let mut tx = state.db.begin().await?;

    let doctor_id: i64 = match existing {
        // An unanswered invitation is reissued with a fresh code.
        Some(user) if user.invitation_pending => {
            sqlx::query(
                r#"
                UPDATE users
                SET hospital_id = $1, otp_digest = $2, otp_created_at = NOW(), otp_attempts = 0
                WHERE id = $3
                "#,
            )
            .bind(hospital.id)
            .bind(&digest)
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
            user.id
        }
        Some(_) => {
            return Err(AppError::Conflict(
                "A user with this email already exists".to_string(),
            ));
        }
        None => sqlx::query_scalar(
            r#"
            INSERT INTO users (username, email, password_hash, role, hospital_id,
                               otp_digest, otp_created_at, invitation_pending)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), TRUE)
            RETURNING id
            "#,
        )
        .bind(&username)
        .bind(&email)
        .bind(&password_hash)
        .bind(Role::Doctor.as_str())
        .bind(hospital.id)
        .bind(&digest)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::from_constraint(e, "A user with this email already exists", "Hospital not found")
        })?,
    };

    let link = reqwest::Url::parse_with_params(
        &format!("{}/register", state.config.frontend_url.trim_end_matches('/')),
        &[("email", email.as_str()), ("token", code.as_str())],
    )
    .map_err(|e| AppError::Internal(format!("Invalid FRONTEND_URL: {}", e)))?;

    // Roll back the account if the invitation cannot be delivered.
    state
        .mailer
        .send(OutgoingMail::invitation(&email, link.as_str()))
        .await?;

    tx.commit().await?;

    tracing::info!(doctor_id, hospital_id = hospital.id, admin_id = auth.user_id, "Doctor invited");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Doctor created successfully. Registration link sent to email.".to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key_for_testing_purposes";

    fn invited_doctor(digest: Option<String>) -> User {
        User {
            id: 7,
            username: "dr".to_string(),
            email: "dr@clinic.org".to_string(),
            password_hash: String::new(),
            is_active: true,
            role: Role::Doctor,
            hospital_id: Some(1),
            otp_created_at: digest.as_ref().map(|_| Utc::now()),
            otp_digest: digest,
            otp_attempts: 0,
            invitation_pending: true,
            created_at: Utc::now(),
        }
    }

    fn check(user: &User, token: &str) -> OtpCheck {
        auth::check_otp(
            &user.email,
            token,
            pending_otp(user),
            Utc::now(),
            INVITATION_TTL_SECS,
            SECRET,
        )
        .unwrap()
    }

    #[test]
    fn test_registration_routes_by_existing_account() {
        assert!(matches!(registration_for(None), Registration::Create));

        let invited = invited_doctor(None);
        assert!(matches!(
            registration_for(Some(&invited)),
            Registration::CompleteInvitation(u) if u.id == 7
        ));

        let active = User {
            invitation_pending: false,
            ..invited_doctor(None)
        };
        assert!(matches!(registration_for(Some(&active)), Registration::Conflict));
    }

    #[test]
    fn test_invitation_token_completes_once() {
        let digest = auth::otp_digest("dr@clinic.org", "314159", SECRET).unwrap();
        let invited = invited_doctor(Some(digest));
        assert_eq!(check(&invited, "314159"), OtpCheck::Accepted);
        assert_eq!(check(&invited, "271828"), OtpCheck::Rejected);

        // Completion clears the token and the pending flag together.
        let completed = User {
            otp_digest: None,
            otp_created_at: None,
            invitation_pending: false,
            ..invited
        };
        assert_eq!(check(&completed, "314159"), OtpCheck::NotPending);
        assert!(matches!(registration_for(Some(&completed)), Registration::Conflict));
    }

    #[test]
    fn test_invitation_token_locks_after_attempts() {
        let digest = auth::otp_digest("dr@clinic.org", "314159", SECRET).unwrap();
        let exhausted = User {
            otp_attempts: MAX_OTP_ATTEMPTS,
            ..invited_doctor(Some(digest))
        };
        assert_eq!(check(&exhausted, "314159"), OtpCheck::Discard);
    }
}
