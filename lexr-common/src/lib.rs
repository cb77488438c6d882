//! # Lexr Common Library
//!
//! Shared code for the lexr dataset tools including:
//! - Error and Result types
//! - Root folder and TOML configuration resolution
//! - Database bootstrap for the word-occurrence table
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
