//! Middleware modules for the SolarTales API
//!
//! - `rate_limit`: per-IP request budget on `/api` routes
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .nest("/api", api_routes.layer(from_fn_with_state(rate_limit_state, rate_limit_middleware)))
//!     .layer(from_fn(observability_middleware))
//!     // Outermost
//!     .layer(cors)
//! ```

mod rate_limit;

pub use rate_limit::{client_ip, rate_limit_middleware, RateLimitState};
