pub mod auth_handler;
pub mod categories_handler;
pub mod dashboard_handler;
pub mod documents_handler;
pub mod health;
pub mod hospitals_handler;
pub mod metrics;
pub mod patients_handler;

pub use health::health_check;
pub use metrics::{metrics_handler, setup_metrics_recorder, MetricsState};
