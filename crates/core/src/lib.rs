//! Core library: image enumeration, annotation pipeline, results table, keyword tagging.

pub mod config;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod table;
