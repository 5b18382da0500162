//! Cross-cutting API pieces: errors, health and the OpenAPI document.

pub mod doc;
pub mod error;
pub mod health;

pub use error::ApiError;
pub use health::health;
