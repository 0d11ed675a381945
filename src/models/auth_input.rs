use serde::{Deserialize, Serialize};

use utoipa::ToSchema;

use super::user::Role;

/// Input for self-registration or completing an invitation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterInput {
    pub email: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    /// Invitation code from the registration link, when completing an invite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyOtpInput {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshInput {
    pub refresh: String,
}

/// Input for an admin creating a doctor account
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDoctorInput {
    pub email: String,
    pub hospital: i64,
}

/// Response for register/login
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthMessageResponse {
    pub message: String,
    pub email: String,
}

/// Issued after a successful OTP check
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
    pub user_id: i64,
    pub role: Role,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessTokenResponse {
    pub access: String,
}

/// Generic `{ "message": ... }` body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
