//! Devory daemon library
//!
//! This module provides the core components for devoryd:
//! - REST API handlers over the collaboration allocator
//! - Layered configuration
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
