// EAV Records - entity types, typed attributes and records over SQLite

// Core types, validation, formulas and filters
pub mod core;

// Schema rows and record views
pub mod models;

// Storage layer
pub mod database;

// Record write pipeline
pub mod services;

// HTTP surface
pub mod web;

// Common utilities
pub mod app_state;
pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
