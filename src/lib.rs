pub mod bot;
pub mod ceremony;
pub mod config;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod parties;
pub mod persistence;
pub mod secrets;
pub mod vault;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
