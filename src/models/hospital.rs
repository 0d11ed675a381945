use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Hospital {
    pub id: i64,
    pub name: String,
}

/// Input for creating or renaming a hospital
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HospitalInput {
    pub name: String,
}

/// A doctor account as listed under its hospital
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Doctor {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub hospital_id: Option<i64>,
    pub invitation_pending: bool,
}
