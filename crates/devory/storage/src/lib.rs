//! Devory storage abstractions.
//!
//! This crate defines the storage contract behind the collaboration
//! allocator:
//! - plain reads and single-row writes for posts, join requests and profiles
//! - an explicit unit of work (`CollaborationTx`) with a named per-post
//!   row lock for capacity-changing decisions
//! - a rolling-window counter for submission quotas
//!
//! Postgres is the transactional source of truth. The in-memory adapter
//! honours the same locking and all-or-nothing commit rules for tests and
//! single-process deployments.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::{CollaborationStore, CollaborationTx, QueryWindow, RateLimitStore};
