//! REST API

pub mod caller;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
