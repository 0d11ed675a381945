use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    extractors::AuthenticatedUser,
    models::{CategoryStat, DashboardTotals, HospitalStat},
    AppResult, AppState,
};

async fn count(db: &sqlx::PgPool, sql: &'static str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(sql).fetch_one(db).await
}

/// GET /api/admin-dashboard/
#[utoipa::path(
    get,
    path = "/api/admin-dashboard/",
    responses(
        (status = 200, description = "Record totals", body = DashboardTotals),
        (status = 403, description = "Admin only")
    ),
    tag = "dashboard",
    security(("bearer_auth" = []))
)]
pub async fn admin_dashboard(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> AppResult<Json<DashboardTotals>> {
    auth.require_admin()?;

    let db = &state.db;
    let (patients, documents, categories, hospitals, doctors) = tokio::try_join!(
        count(db, "SELECT COUNT(*) FROM patients"),
        count(db, "SELECT COUNT(*) FROM documents"),
        count(db, "SELECT COUNT(*) FROM categories"),
        count(db, "SELECT COUNT(*) FROM hospitals"),
        count(db, "SELECT COUNT(*) FROM users WHERE role = 'Doctor'"),
    )?;

    Ok(Json(DashboardTotals {
        patients,
        documents,
        categories,
        hospitals,
        doctors,
    }))
}

/// GET /api/hospitals/stats/
#[utoipa::path(
    get,
    path = "/api/hospitals/stats/",
    responses(
        (status = 200, description = "Doctors per hospital", body = Vec<HospitalStat>),
        (status = 403, description = "Admin only")
    ),
    tag = "dashboard",
    security(("bearer_auth" = []))
)]
pub async fn hospital_stats(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Vec<HospitalStat>>> {
    auth.require_admin()?;

    let stats = sqlx::query_as::<_, HospitalStat>(
        r#"
        SELECT h.id, h.name, COUNT(u.id) AS num_doctors
        FROM hospitals h
        LEFT JOIN users u ON u.hospital_id = h.id AND u.role = 'Doctor'
        GROUP BY h.id, h.name
        ORDER BY h.name, h.id
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(stats))
}

/// GET /api/categories/stats/
#[utoipa::path(
    get,
    path = "/api/categories/stats/",
    responses(
        (status = 200, description = "Fields and documents per category", body = Vec<CategoryStat>),
        (status = 403, description = "Admin only")
    ),
    tag = "dashboard",
    security(("bearer_auth" = []))
)]
pub async fn category_stats(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Vec<CategoryStat>>> {
    auth.require_admin()?;

    // Subqueries avoid the fields x documents fan-out of a double join.
    let stats = sqlx::query_as::<_, CategoryStat>(
        r#"
        SELECT c.id, c.name,
               (SELECT COUNT(*) FROM fields f WHERE f.category_id = c.id) AS num_fields,
               (SELECT COUNT(*) FROM documents d WHERE d.category_id = c.id) AS num_documents
        FROM categories c
        ORDER BY c.name, c.id
        "#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(stats))
}
