use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sqlx::{PgExecutor, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    extractors::AuthenticatedUser,
    models::{Category, CategoryRow, CreateCategoryInput, Field, FieldInput, UpdateCategoryInput},
    validation::{self, FieldError},
    AppError, AppResult, AppState,
};

const DUPLICATE_CATEGORY: &str = "A category with this name already exists";
const DUPLICATE_FIELD: &str = "This category already has a field with that name";

pub(crate) async fn load_fields<'e, E>(executor: E, category_id: i64) -> Result<Vec<Field>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Field>(
        r#"
        SELECT id, category_id, name, field_type, required, options
        FROM fields WHERE category_id = $1
        ORDER BY id
        "#,
    )
    .bind(category_id)
    .fetch_all(executor)
    .await
}

/// Load a category with its field schema, or 404.
pub(crate) async fn load_category(db: &sqlx::PgPool, id: i64) -> AppResult<Category> {
    let row = sqlx::query_as::<_, CategoryRow>(r#"SELECT id, name FROM categories WHERE id = $1"#)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))?;

    let fields = load_fields(db, id).await?;
    Ok(Category::from_row(row, fields))
}

async fn insert_field(
    tx: &mut Transaction<'_, Postgres>,
    category_id: i64,
    input: &FieldInput,
) -> AppResult<Field> {
    let options: Vec<String> = input
        .options
        .iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    sqlx::query_as::<_, Field>(
        r#"
        INSERT INTO fields (category_id, name, field_type, required, options)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, category_id, name, field_type, required, options
        "#,
    )
    .bind(category_id)
    .bind(input.name.trim())
    .bind(input.field_type.as_str())
    .bind(input.required)
    .bind(&options)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::from_constraint(e, DUPLICATE_FIELD, "Category not found"))
}

/// GET /api/category/
#[utoipa::path(
    get,
    path = "/api/category/",
    responses(
        (status = 200, description = "Categories with their fields", body = Vec<Category>)
    ),
    tag = "categories",
    security(("bearer_auth" = []))
)]
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
) -> AppResult<Json<Vec<Category>>> {
    let rows = sqlx::query_as::<_, CategoryRow>(r#"SELECT id, name FROM categories ORDER BY name, id"#)
        .fetch_all(&state.db)
        .await?;

    let all_fields = sqlx::query_as::<_, Field>(
        r#"SELECT id, category_id, name, field_type, required, options FROM fields ORDER BY id"#,
    )
    .fetch_all(&state.db)
    .await?;

    let mut by_category: HashMap<i64, Vec<Field>> = HashMap::new();
    for field in all_fields {
        by_category.entry(field.category_id).or_default().push(field);
    }

    let categories = rows
        .into_iter()
        .map(|row| {
            let fields = by_category.remove(&row.id).unwrap_or_default();
            Category::from_row(row, fields)
        })
        .collect();

    Ok(Json(categories))
}

/// POST /api/category/ - Create a category with optional initial fields
#[utoipa::path(
    post,
    path = "/api/category/",
    request_body = CreateCategoryInput,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Duplicate category name"),
        (status = 422, description = "Validation failed")
    ),
    tag = "categories",
    security(("bearer_auth" = []))
)]
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Json(input): Json<CreateCategoryInput>,
) -> AppResult<(StatusCode, Json<Category>)> {
    auth.require_admin()?;
    input.validate()?;

    let mut tx = state.db.begin().await?;

    let row = sqlx::query_as::<_, CategoryRow>(
        r#"INSERT INTO categories (name) VALUES ($1) RETURNING id, name"#,
    )
    .bind(input.name.trim())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| AppError::from_constraint(e, DUPLICATE_CATEGORY, "Not found"))?;

    let mut fields = Vec::with_capacity(input.fields.len());
    for field in &input.fields {
        fields.push(insert_field(&mut tx, row.id, field).await?);
    }

    tx.commit().await?;

    tracing::info!(category_id = row.id, fields = fields.len(), "Category created");
    Ok((StatusCode::CREATED, Json(Category::from_row(row, fields))))
}

/// GET /api/category/{id}/
#[utoipa::path(
    get,
    path = "/api/category/{id}/",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category with fields", body = Category),
        (status = 404, description = "Category not found")
    ),
    tag = "categories",
    security(("bearer_auth" = []))
)]
pub async fn get_category(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Category>> {
    Ok(Json(load_category(&state.db, id).await?))
}

/// PUT /api/category/{id}/ - Rename a category
#[utoipa::path(
    put,
    path = "/api/category/{id}/",
    params(("id" = i64, Path, description = "Category ID")),
    request_body = UpdateCategoryInput,
    responses(
        (status = 200, description = "Category updated", body = Category),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Category not found"),
        (status = 409, description = "Duplicate category name")
    ),
    tag = "categories",
    security(("bearer_auth" = []))
)]
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCategoryInput>,
) -> AppResult<Json<Category>> {
    auth.require_admin()?;
    validation::validate_name("name", &input.name, 50).map_err(|e| AppError::Validation(vec![e]))?;

    let updated = sqlx::query(r#"UPDATE categories SET name = $1 WHERE id = $2"#)
        .bind(input.name.trim())
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(|e| AppError::from_constraint(e, DUPLICATE_CATEGORY, "Not found"))?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Category {} not found", id)));
    }

    tracing::info!(category_id = id, "Category renamed");
    Ok(Json(load_category(&state.db, id).await?))
}

/// DELETE /api/category/{id}/ - Also removes its fields and documents
#[utoipa::path(
    delete,
    path = "/api/category/{id}/",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Category not found")
    ),
    tag = "categories",
    security(("bearer_auth" = []))
)]
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;

    let result = sqlx::query(r#"DELETE FROM categories WHERE id = $1"#)
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Category {} not found", id)));
    }

    tracing::info!(category_id = id, admin_id = auth.user_id, "Category deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/category/{id}/fields/
#[utoipa::path(
    get,
    path = "/api/category/{id}/fields/",
    params(("id" = i64, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Field schema of the category", body = Vec<Field>),
        (status = 404, description = "Category not found")
    ),
    tag = "categories",
    security(("bearer_auth" = []))
)]
pub async fn list_fields(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<Field>>> {
    let category = load_category(&state.db, id).await?;
    Ok(Json(category.fields))
}

/// POST /api/category/{id}/fields/
#[utoipa::path(
    post,
    path = "/api/category/{id}/fields/",
    params(("id" = i64, Path, description = "Category ID")),
    request_body = FieldInput,
    responses(
        (status = 201, description = "Field created", body = Field),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Category not found"),
        (status = 409, description = "Duplicate field name"),
        (status = 422, description = "Validation failed", body = Vec<FieldError>)
    ),
    tag = "categories",
    security(("bearer_auth" = []))
)]
pub async fn create_field(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<FieldInput>,
) -> AppResult<(StatusCode, Json<Field>)> {
    auth.require_admin()?;
    input.validate()?;

    let mut tx = state.db.begin().await?;
    let field = insert_field(&mut tx, id, &input).await?;
    tx.commit().await?;

    tracing::info!(category_id = id, field_id = field.id, "Field created");
    Ok((StatusCode::CREATED, Json(field)))
}

/// DELETE /api/category/{id}/fields/{field_id}/
#[utoipa::path(
    delete,
    path = "/api/category/{id}/fields/{field_id}/",
    params(
        ("id" = i64, Path, description = "Category ID"),
        ("field_id" = i64, Path, description = "Field ID")
    ),
    responses(
        (status = 204, description = "Field deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Field not found")
    ),
    tag = "categories",
    security(("bearer_auth" = []))
)]
pub async fn delete_field(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path((id, field_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;

    let result = sqlx::query(r#"DELETE FROM fields WHERE id = $1 AND category_id = $2"#)
        .bind(field_id)
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Field {} not found in category {}",
            field_id, id
        )));
    }

    tracing::info!(category_id = id, field_id, "Field deleted");
    Ok(StatusCode::NO_CONTENT)
}
