//! Application glue: game event handlers, HTTP router, shared state.

pub mod handlers;
pub mod models;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::{AppState, SharedState};
