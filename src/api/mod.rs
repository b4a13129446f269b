//! HTTP surface of the photo editor

pub mod form;
pub mod handlers;
pub mod routes;

pub use routes::create_router;
