pub mod analytics;
pub mod app;
pub mod cli;
pub mod config;
pub mod dates;
pub mod error;
pub mod groups;
pub mod history;
pub mod metadata;
pub mod model;
pub mod storage;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
