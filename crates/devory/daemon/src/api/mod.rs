//! API layer for devoryd

pub mod rest;

pub use rest::create_router;
