//! Shared types for the developer-site console client

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
