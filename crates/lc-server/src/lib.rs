//! LogCurl HTTP API: library crate for the Axum server.
//!
//! Re-exports all modules so the binary (`main.rs`) and the end-to-end
//! tests can build the router over their own pipeline.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
