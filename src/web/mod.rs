//! HTTP surface: session binding, handlers, router and shared state

pub mod handlers;
pub mod router;
pub mod session;
pub mod state;

pub use router::{build_router, serve};
pub use state::{AppState, MaintenanceReport, ServerSettings};
