//! Tower middleware applied in front of the API router

pub mod auth;
pub mod rate_limit;

pub use auth::AuthLayer;
pub use rate_limit::RateLimitLayer;
