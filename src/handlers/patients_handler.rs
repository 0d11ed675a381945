use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::{
    extractors::AuthenticatedUser,
    models::{Patient, PatientInput, PatientQuery},
    validation::{self, FieldError},
    AppError, AppResult, AppState,
};

const DUPLICATE_PATIENT: &str = "A patient with this identity number or phone number already exists";

/// Escape LIKE metacharacters so a search term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn validated(input: PatientInput) -> AppResult<PatientInput> {
    input.validate(Utc::now().date_naive())?;
    Ok(input.normalized())
}

/// GET /api/auth/patients/
#[utoipa::path(
    get,
    path = "/api/auth/patients/",
    params(PatientQuery),
    responses(
        (status = 200, description = "Patients ordered by name", body = Vec<Patient>),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Invalid sex filter")
    ),
    tag = "patients",
    security(("bearer_auth" = []))
)]
pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Query(query): Query<PatientQuery>,
) -> AppResult<Json<Vec<Patient>>> {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(like_pattern);

    let sex = query.sex.as_deref().filter(|s| !s.is_empty());
    if let Some(sex) = sex {
        validation::validate_sex(sex).map_err(|e| AppError::Validation(vec![e]))?;
    }

    let patients = sqlx::query_as::<_, Patient>(
        r#"
        SELECT id, identity_number, last_name, first_name, birth_date, sex, phone_number
        FROM patients
        WHERE ($1::text IS NULL
               OR identity_number ILIKE $1
               OR last_name ILIKE $1
               OR first_name ILIKE $1)
          AND ($2::text IS NULL OR sex = $2)
        ORDER BY last_name, first_name, id
        "#,
    )
    .bind(search)
    .bind(sex)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(patients))
}

/// POST /api/auth/patients/
#[utoipa::path(
    post,
    path = "/api/auth/patients/",
    request_body = PatientInput,
    responses(
        (status = 201, description = "Patient created", body = Patient),
        (status = 409, description = "Identity or phone number already used"),
        (status = 422, description = "Validation failed", body = Vec<FieldError>)
    ),
    tag = "patients",
    security(("bearer_auth" = []))
)]
pub async fn create_patient(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(input): Json<PatientInput>,
) -> AppResult<(StatusCode, Json<Patient>)> {
    let input = validated(input)?;

    let patient = sqlx::query_as::<_, Patient>(
        r#"
        INSERT INTO patients (identity_number, last_name, first_name, birth_date, sex, phone_number)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, identity_number, last_name, first_name, birth_date, sex, phone_number
        "#,
    )
    .bind(&input.identity_number)
    .bind(&input.last_name)
    .bind(&input.first_name)
    .bind(input.birth_date)
    .bind(&input.sex)
    .bind(&input.phone_number)
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_constraint(e, DUPLICATE_PATIENT, "Not found"))?;

    tracing::info!(patient_id = patient.id, user_id = auth.user_id, "Patient created");
    Ok((StatusCode::CREATED, Json(patient)))
}

/// GET /api/auth/patients/{id}/
#[utoipa::path(
    get,
    path = "/api/auth/patients/{id}/",
    params(("id" = i64, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "Patient", body = Patient),
        (status = 404, description = "Patient not found")
    ),
    tag = "patients",
    security(("bearer_auth" = []))
)]
pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Patient>> {
    let patient = sqlx::query_as::<_, Patient>(
        r#"
        SELECT id, identity_number, last_name, first_name, birth_date, sex, phone_number
        FROM patients WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Patient {} not found", id)))?;

    Ok(Json(patient))
}

/// PUT /api/auth/patients/{id}/ - Replace every field of a patient
#[utoipa::path(
    put,
    path = "/api/auth/patients/{id}/",
    params(("id" = i64, Path, description = "Patient ID")),
    request_body = PatientInput,
    responses(
        (status = 200, description = "Patient updated", body = Patient),
        (status = 404, description = "Patient not found"),
        (status = 409, description = "Identity or phone number already used"),
        (status = 422, description = "Validation failed")
    ),
    tag = "patients",
    security(("bearer_auth" = []))
)]
pub async fn update_patient(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<PatientInput>,
) -> AppResult<Json<Patient>> {
    let input = validated(input)?;

    let patient = sqlx::query_as::<_, Patient>(
        r#"
        UPDATE patients
        SET identity_number = $1, last_name = $2, first_name = $3,
            birth_date = $4, sex = $5, phone_number = $6
        WHERE id = $7
        RETURNING id, identity_number, last_name, first_name, birth_date, sex, phone_number
        "#,
    )
    .bind(&input.identity_number)
    .bind(&input.last_name)
    .bind(&input.first_name)
    .bind(input.birth_date)
    .bind(&input.sex)
    .bind(&input.phone_number)
    .bind(id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::from_constraint(e, DUPLICATE_PATIENT, "Not found"))?
    .ok_or_else(|| AppError::NotFound(format!("Patient {} not found", id)))?;

    tracing::info!(patient_id = id, user_id = auth.user_id, "Patient updated");
    Ok(Json(patient))
}

/// DELETE /api/auth/patients/{id}/
#[utoipa::path(
    delete,
    path = "/api/auth/patients/{id}/",
    params(("id" = i64, Path, description = "Patient ID")),
    responses(
        (status = 204, description = "Patient deleted"),
        (status = 404, description = "Patient not found")
    ),
    tag = "patients",
    security(("bearer_auth" = []))
)]
pub async fn delete_patient(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    let result = sqlx::query(r#"DELETE FROM patients WHERE id = $1"#)
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Patient {} not found", id)));
    }

    tracing::info!(patient_id = id, user_id = auth.user_id, "Patient deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ould"), "%ould%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
