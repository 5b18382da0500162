pub mod config;
pub mod error;
pub mod invoice;

pub use config::{AuditConfig, Config};
pub use error::*;
pub use invoice::*;
