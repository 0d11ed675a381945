use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::{
    extractors::AuthenticatedUser,
    models::{Doctor, Hospital, HospitalInput},
    validation, AppError, AppResult, AppState,
};

fn validated_name(input: &HospitalInput) -> AppResult<String> {
    validation::validate_name("name", &input.name, 50).map_err(|e| AppError::Validation(vec![e]))?;
    Ok(input.name.trim().to_string())
}

/// GET /api/hospital/
#[utoipa::path(
    get,
    path = "/api/hospital/",
    responses(
        (status = 200, description = "List of hospitals", body = Vec<Hospital>)
    ),
    tag = "hospitals",
    security(("bearer_auth" = []))
)]
pub async fn list_hospitals(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
) -> AppResult<Json<Vec<Hospital>>> {
    let hospitals = sqlx::query_as::<_, Hospital>(r#"SELECT id, name FROM hospitals ORDER BY name, id"#)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(hospitals))
}

/// POST /api/hospital/
#[utoipa::path(
    post,
    path = "/api/hospital/",
    request_body = HospitalInput,
    responses(
        (status = 201, description = "Hospital created", body = Hospital),
        (status = 403, description = "Admin only"),
        (status = 422, description = "Validation failed")
    ),
    tag = "hospitals",
    security(("bearer_auth" = []))
)]
pub async fn create_hospital(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(input): Json<HospitalInput>,
) -> AppResult<(StatusCode, Json<Hospital>)> {
    auth.require_admin()?;
    let name = validated_name(&input)?;

    let hospital = sqlx::query_as::<_, Hospital>(
        r#"INSERT INTO hospitals (name) VALUES ($1) RETURNING id, name"#,
    )
    .bind(&name)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(hospital_id = hospital.id, "Hospital created");
    Ok((StatusCode::CREATED, Json(hospital)))
}

/// GET /api/hospital/{id}/
#[utoipa::path(
    get,
    path = "/api/hospital/{id}/",
    params(("id" = i64, Path, description = "Hospital ID")),
    responses(
        (status = 200, description = "Hospital", body = Hospital),
        (status = 404, description = "Hospital not found")
    ),
    tag = "hospitals",
    security(("bearer_auth" = []))
)]
pub async fn get_hospital(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Hospital>> {
    let hospital = sqlx::query_as::<_, Hospital>(r#"SELECT id, name FROM hospitals WHERE id = $1"#)
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Hospital {} not found", id)))?;

    Ok(Json(hospital))
}

/// PUT /api/hospital/{id}/
#[utoipa::path(
    put,
    path = "/api/hospital/{id}/",
    params(("id" = i64, Path, description = "Hospital ID")),
    request_body = HospitalInput,
    responses(
        (status = 200, description = "Hospital updated", body = Hospital),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Hospital not found")
    ),
    tag = "hospitals",
    security(("bearer_auth" = []))
)]
pub async fn update_hospital(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<HospitalInput>,
) -> AppResult<Json<Hospital>> {
    auth.require_admin()?;
    let name = validated_name(&input)?;

    let hospital = sqlx::query_as::<_, Hospital>(
        r#"UPDATE hospitals SET name = $1 WHERE id = $2 RETURNING id, name"#,
    )
    .bind(&name)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Hospital {} not found", id)))?;

    tracing::info!(hospital_id = id, "Hospital updated");
    Ok(Json(hospital))
}

/// DELETE /api/hospital/{id}/ - Doctors of the hospital are detached, not deleted
#[utoipa::path(
    delete,
    path = "/api/hospital/{id}/",
    params(("id" = i64, Path, description = "Hospital ID")),
    responses(
        (status = 204, description = "Hospital deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Hospital not found")
    ),
    tag = "hospitals",
    security(("bearer_auth" = []))
)]
pub async fn delete_hospital(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;

    let result = sqlx::query(r#"DELETE FROM hospitals WHERE id = $1"#)
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Hospital {} not found", id)));
    }

    tracing::info!(hospital_id = id, admin_id = auth.user_id, "Hospital deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/hospital/{id}/doctors/
#[utoipa::path(
    get,
    path = "/api/hospital/{id}/doctors/",
    params(("id" = i64, Path, description = "Hospital ID")),
    responses(
        (status = 200, description = "Doctors attached to the hospital", body = Vec<Doctor>),
        (status = 404, description = "Hospital not found")
    ),
    tag = "hospitals",
    security(("bearer_auth" = []))
)]
pub async fn list_doctors(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<Doctor>>> {
    let exists: bool = sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM hospitals WHERE id = $1)"#)
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    if !exists {
        return Err(AppError::NotFound(format!("Hospital {} not found", id)));
    }

    let doctors = sqlx::query_as::<_, Doctor>(
        r#"
        SELECT id, username, email, is_active, hospital_id, invitation_pending
        FROM users
        WHERE hospital_id = $1 AND role = 'Doctor'
        ORDER BY username, id
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(doctors))
}
