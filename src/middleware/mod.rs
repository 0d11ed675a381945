pub mod metrics;
pub mod rate_limit;
pub mod request_id;

pub use metrics::metrics_middleware;
pub use rate_limit::{client_ident, rate_limit_middleware, RateLimiter};
pub use request_id::{request_id_middleware, RequestId};
