pub mod logging;

pub mod config;
pub mod database;
pub mod errors;
pub mod models;
pub mod review_service;
pub mod scheduler;

pub use config::Config;
pub use database::Database;
pub use errors::*;
pub use models::*;
pub use review_service::ReviewService;
pub use scheduler::ReviewScheduler;
