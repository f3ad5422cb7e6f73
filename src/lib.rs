// Core modules
pub mod config;
pub mod consensus;
pub mod db;
pub mod exchange;
pub mod format;
pub mod generator;
pub mod indicators;
pub mod models;
pub mod notifier;
pub mod quality;
pub mod strategy;
pub mod tracker;

// Re-export commonly used types
pub use models::*;
pub use strategy::SignalStrategy;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
