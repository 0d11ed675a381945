pub mod auth;
pub mod client;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extractors;
pub mod forms;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod startup;
pub mod validation;

use std::sync::Arc;

pub use auth::{JwtKeys, Mailer};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use handlers::MetricsState;
pub use middleware::RateLimiter;

pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: AppConfig,
    pub jwt: JwtKeys,
    pub mailer: Arc<dyn Mailer>,
    pub metrics: Arc<MetricsState>,
    pub auth_limiter: Arc<RateLimiter>,
    pub write_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        db: sqlx::PgPool,
        config: AppConfig,
        mailer: Arc<dyn Mailer>,
        metrics: Arc<MetricsState>,
    ) -> Self {
        let jwt = JwtKeys::new(
            &config.jwt_secret,
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs,
        );
        let auth_limiter = Arc::new(
            RateLimiter::per_minute("auth", config.auth_rate_limit_per_min)
                .trust_forwarded_for(config.trust_proxy),
        );
        let write_limiter = Arc::new(
            RateLimiter::per_minute("admin_write", config.write_rate_limit_per_min)
                .writes_only()
                .trust_forwarded_for(config.trust_proxy),
        );

        Self {
            db,
            config,
            jwt,
            mailer,
            metrics,
            auth_limiter,
            write_limiter,
        }
    }
}
