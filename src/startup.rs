use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    response::Html,
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

use crate::{
    auth,
    handlers::{
        self, auth_handler, categories_handler, dashboard_handler, documents_handler,
        hospitals_handler, patients_handler,
    },
    middleware::{metrics_middleware, rate_limit_middleware, request_id_middleware},
    models::Role,
    openapi::ApiDoc,
    AppError, AppState,
};

pub fn build_router(state: Arc<AppState>) -> Result<Router, header::InvalidHeaderValue> {
    let cors = CorsLayer::new()
        .allow_origin(state.config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true);

    let auth_limit = from_fn_with_state(state.auth_limiter.clone(), rate_limit_middleware);
    let write_limit = from_fn_with_state(state.write_limiter.clone(), rate_limit_middleware);

    // Credential endpoints share the strict per-client limit
    let credential_routes = Router::new()
        .route("/api/auth/register/", post(auth_handler::register))
        .route("/api/auth/login/", post(auth_handler::login))
        .route("/api/auth/verify-otp/", post(auth_handler::verify_otp))
        .route("/api/auth/token/refresh/", post(auth_handler::refresh_token))
        .route_layer(auth_limit);

    let account_routes = Router::new()
        .route("/api/auth/me/", get(auth_handler::get_me))
        .route("/api/auth/create-doctor/", post(auth_handler::create_doctor));

    let patient_routes = Router::new()
        .route(
            "/api/auth/patients/",
            get(patients_handler::list_patients).post(patients_handler::create_patient),
        )
        .route(
            "/api/auth/patients/{id}/",
            get(patients_handler::get_patient)
                .put(patients_handler::update_patient)
                .delete(patients_handler::delete_patient),
        );

    let category_routes = Router::new()
        .route(
            "/api/category/",
            get(categories_handler::list_categories).post(categories_handler::create_category),
        )
        .route(
            "/api/category/{id}/",
            get(categories_handler::get_category)
                .put(categories_handler::update_category)
                .delete(categories_handler::delete_category),
        )
        .route(
            "/api/category/{id}/fields/",
            get(categories_handler::list_fields).post(categories_handler::create_field),
        )
        .route(
            "/api/category/{id}/fields/{field_id}/",
            delete(categories_handler::delete_field),
        );

    let hospital_routes = Router::new()
        .route(
            "/api/hospital/",
            get(hospitals_handler::list_hospitals).post(hospitals_handler::create_hospital),
        )
        .route(
            "/api/hospital/{id}/",
            get(hospitals_handler::get_hospital)
                .put(hospitals_handler::update_hospital)
                .delete(hospitals_handler::delete_hospital),
        )
        .route("/api/hospital/{id}/doctors/", get(hospitals_handler::list_doctors));

    let document_routes = Router::new()
        .route("/api/documents/create/", post(documents_handler::create_document))
        .route("/api/documents/last/", get(documents_handler::last_document))
        .route("/api/documents/history/", get(documents_handler::document_history))
        .route("/api/documents/verify/{id}/", get(documents_handler::verify_document))
        .route("/api/documents/{id}/", get(documents_handler::get_document));

    // The write limiter ignores GET/HEAD/OPTIONS
    let limited_writes = Router::new()
        .merge(category_routes)
        .merge(hospital_routes)
        .merge(document_routes)
        .route_layer(write_limit);

    let dashboard_routes = Router::new()
        .route("/api/admin-dashboard/", get(dashboard_handler::admin_dashboard))
        .route("/api/hospitals/stats/", get(dashboard_handler::hospital_stats))
        .route("/api/categories/stats/", get(dashboard_handler::category_stats));

    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .merge(credential_routes)
        .merge(account_routes)
        .merge(patient_routes)
        .merge(limited_writes)
        .merge(dashboard_routes)
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/swagger-ui", get(swagger_ui))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(cors)
        .with_state(state);

    Ok(router)
}

/// Create the bootstrap admin account if no user holds that email yet.
pub async fn ensure_admin(db: &sqlx::PgPool, email: &str, password: &str) -> Result<(), AppError> {
    let email = email.trim().to_lowercase();

    let existing: Option<(i64, String)> =
        sqlx::query_as(r#"SELECT id, role FROM users WHERE LOWER(email) = $1"#)
            .bind(&email)
            .fetch_optional(db)
            .await?;

    if let Some((id, role)) = existing {
        if role != Role::Admin.as_str() {
            tracing::warn!(user_id = id, "Bootstrap admin email belongs to a non-admin account");
        }
        return Ok(());
    }

    let password_hash = auth::hash_password(password)?;
    let username: String = email.split('@').next().unwrap_or("admin").chars().take(50).collect();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&username)
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::Admin.as_str())
    .fetch_one(db)
    .await?;

    tracing::info!(user_id = id, "Bootstrap admin account created");
    Ok(())
}

async fn swagger_ui() -> Html<&'static str> {
    Html(r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Medical Records API</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script>
        window.onload = () => {
            window.ui = SwaggerUIBundle({
                url: '/api-docs/openapi.json',
                dom_id: '#swagger-ui',
                persistAuthorization: true
            });
        };
    </script>
</body>
</html>
    "#)
}
