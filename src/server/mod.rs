//! HTTP surface for the indexing pipeline, behind the `server` feature.
//!
//! Thin by design: handlers validate, delegate to the library, and spawn
//! long work. Everything stateful lives in [`state::AppState`]; everything
//! that can fail maps to a client response through [`errors::AppError`].

pub mod errors;
pub mod handlers;
pub mod router;
pub mod state;

pub use errors::AppError;
pub use router::create_router;
pub use state::AppState;
