//! Unit-level integration tests

mod http_backend_test;
mod response_test;
