pub mod commands;
pub mod config;
pub mod error;
pub mod generator;
pub mod jobs;
pub mod lifecycle;
pub mod result;
pub mod store;
pub mod terminal;
pub mod types;
