//! API request handlers

mod collaborations;
mod health;
mod requests;
mod users;

pub use collaborations::*;
pub use health::*;
pub use requests::*;
pub use users::*;
