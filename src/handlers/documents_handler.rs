use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::categories_handler::load_fields;
use crate::{
    crypto,
    extractors::AuthenticatedUser,
    forms,
    models::{
        CreateDocumentInput, CreateDocumentResponse, DocumentQuery, DocumentRow, DocumentView,
        VerifyDocumentResponse,
    },
    AppError, AppResult, AppState,
};

const DOCUMENT_COLUMNS: &str =
    "id, patient_id, category_id, doctor_id, result, hash, created_at";

fn decrypt(row: DocumentRow, key: &[u8; 32]) -> AppResult<DocumentView> {
    let plaintext = crypto::open(&row.result, key)?;
    let result: BTreeMap<String, String> = serde_json::from_str(&plaintext)
        .map_err(|e| AppError::Internal(format!("Stored result is not a JSON object: {}", e)))?;

    Ok(DocumentView {
        id: row.id,
        patient_id: row.patient_id,
        category_id: row.category_id,
        doctor_id: row.doctor_id,
        result,
        hash: row.hash,
        created_at: row.created_at,
    })
}

async fn fetch_document(db: &sqlx::PgPool, id: i64) -> AppResult<DocumentRow> {
    sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {} FROM documents WHERE id = $1",
        DOCUMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Document {} not found", id)))
}

/// POST /api/documents/create/ - Validate, encrypt and store a result
#[utoipa::path(
    post,
    path = "/api/documents/create/",
    request_body = CreateDocumentInput,
    responses(
        (status = 201, description = "Document stored", body = CreateDocumentResponse),
        (status = 404, description = "Patient or category not found"),
        (status = 422, description = "Result does not match the category schema")
    ),
    tag = "documents",
    security(("bearer_auth" = []))
)]
pub async fn create_document(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(input): Json<CreateDocumentInput>,
) -> AppResult<(StatusCode, Json<CreateDocumentResponse>)> {
    let patient_exists: bool =
        sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM patients WHERE id = $1)"#)
            .bind(input.patient_id)
            .fetch_one(&state.db)
            .await?;
    if !patient_exists {
        return Err(AppError::NotFound(format!("Patient {} not found", input.patient_id)));
    }

    let category_exists: bool =
        sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)"#)
            .bind(input.category_id)
            .fetch_one(&state.db)
            .await?;
    if !category_exists {
        return Err(AppError::NotFound(format!("Category {} not found", input.category_id)));
    }

    let fields = load_fields(&state.db, input.category_id).await?;
    let cleaned = forms::clean_result(&fields, &input.result)?;

    let plaintext = serde_json::to_string(&cleaned)
        .map_err(|e| AppError::Internal(format!("Failed to serialize result: {}", e)))?;
    let sealed = crypto::seal(&plaintext, &state.config.document_key)?;

    let document_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO documents (patient_id, category_id, doctor_id, result, hash)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(input.patient_id)
    .bind(input.category_id)
    .bind(auth.user_id)
    .bind(&sealed.encoded)
    .bind(&sealed.hash)
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::from_constraint(e, "Document already exists", "Patient or category not found"))?;

    metrics::counter!("documents_created_total").increment(1);
    tracing::info!(
        document_id,
        patient_id = input.patient_id,
        category_id = input.category_id,
        doctor_id = auth.user_id,
        "Document stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateDocumentResponse {
            message: "Document created successfully".to_string(),
            document_id,
            hash: sealed.hash,
        }),
    ))
}

/// GET /api/documents/{id}/
#[utoipa::path(
    get,
    path = "/api/documents/{id}/",
    params(("id" = i64, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document with decrypted result", body = DocumentView),
        (status = 404, description = "Document not found")
    ),
    tag = "documents",
    security(("bearer_auth" = []))
)]
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<DocumentView>> {
    let row = fetch_document(&state.db, id).await?;
    Ok(Json(decrypt(row, &state.config.document_key)?))
}

/// GET /api/documents/last/ - Most recent document for a patient and category
#[utoipa::path(
    get,
    path = "/api/documents/last/",
    params(DocumentQuery),
    responses(
        (status = 200, description = "Latest document", body = DocumentView),
        (status = 404, description = "No document for this patient and category")
    ),
    tag = "documents",
    security(("bearer_auth" = []))
)]
pub async fn last_document(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Query(query): Query<DocumentQuery>,
) -> AppResult<Json<DocumentView>> {
    let row = sqlx::query_as::<_, DocumentRow>(&format!(
        r#"
        SELECT {} FROM documents
        WHERE patient_id = $1 AND category_id = $2
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
        DOCUMENT_COLUMNS
    ))
    .bind(query.patient_id)
    .bind(query.category_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("No document found".to_string()))?;

    Ok(Json(decrypt(row, &state.config.document_key)?))
}

/// GET /api/documents/history/ - Every document for a patient and category, newest first
#[utoipa::path(
    get,
    path = "/api/documents/history/",
    params(DocumentQuery),
    responses(
        (status = 200, description = "Document history", body = Vec<DocumentView>)
    ),
    tag = "documents",
    security(("bearer_auth" = []))
)]
pub async fn document_history(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Query(query): Query<DocumentQuery>,
) -> AppResult<Json<Vec<DocumentView>>> {
    let rows = sqlx::query_as::<_, DocumentRow>(&format!(
        r#"
        SELECT {} FROM documents
        WHERE patient_id = $1 AND category_id = $2
        ORDER BY created_at DESC, id DESC
        "#,
        DOCUMENT_COLUMNS
    ))
    .bind(query.patient_id)
    .bind(query.category_id)
    .fetch_all(&state.db)
    .await?;

    let documents = rows
        .into_iter()
        .map(|row| decrypt(row, &state.config.document_key))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(documents))
}

/// GET /api/documents/verify/{id}/ - Recompute the stored hash
#[utoipa::path(
    get,
    path = "/api/documents/verify/{id}/",
    params(("id" = i64, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Hash matches", body = VerifyDocumentResponse),
        (status = 400, description = "Hashes do not match"),
        (status = 404, description = "Document not found")
    ),
    tag = "documents",
    security(("bearer_auth" = []))
)]
pub async fn verify_document(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<VerifyDocumentResponse>> {
    let row = fetch_document(&state.db, id).await?;

    if !crypto::verify_integrity(&row.result, &row.hash) {
        tracing::warn!(document_id = id, "Document integrity check failed");
        return Err(AppError::BadRequest(
            "Hashes do not match: Data may be corrupted.".to_string(),
        ));
    }

    Ok(Json(VerifyDocumentResponse {
        verified: true,
        message: "Document verified: hashes match.".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_decrypt_restores_result_map() {
        let key = [3u8; 32];
        let mut result = BTreeMap::new();
        result.insert("glucose".to_string(), "5.4".to_string());
        let sealed = crypto::seal(&serde_json::to_string(&result).unwrap(), &key).unwrap();

        let row = DocumentRow {
            id: 1,
            patient_id: 2,
            category_id: 3,
            doctor_id: 4,
            result: sealed.encoded,
            hash: sealed.hash.clone(),
            created_at: Utc::now(),
        };

        let view = decrypt(row, &key).unwrap();
        assert_eq!(view.result, result);
        assert_eq!(view.hash, sealed.hash);
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let sealed = crypto::seal("{}", &[1u8; 32]).unwrap();
        let row = DocumentRow {
            id: 1,
            patient_id: 1,
            category_id: 1,
            doctor_id: 1,
            result: sealed.encoded,
            hash: sealed.hash,
            created_at: Utc::now(),
        };

        assert!(matches!(decrypt(row, &[2u8; 32]), Err(AppError::Internal(_))));
    }
}
