//! Core components, types, and utilities for the case registry.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - The emergency case data model and updatable fields.
//! - The typed error taxonomy and common result aliases.

pub mod config;
pub mod error;
pub mod types;
