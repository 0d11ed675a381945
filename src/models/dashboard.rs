use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DashboardTotals {
    pub patients: i64,
    pub documents: i64,
    pub categories: i64,
    pub hospitals: i64,
    pub doctors: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct HospitalStat {
    pub id: i64,
    pub name: String,
    pub num_doctors: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CategoryStat {
    pub id: i64,
    pub name: String,
    pub num_fields: i64,
    pub num_documents: i64,
}
