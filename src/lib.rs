pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{Result, ServiceError};
pub use models::*;
pub use services::*;
