//! Storage services for the case registry.
//!
//! This module contains the services the registry is built from:
//! - The case store (e.g., a JSON file)
//! - The conversation log (e.g., one text file per case)
//! - Pure demand aggregation over case snapshots
//!
//! Each storage service defines both a generic trait and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod aggregate;
pub mod fs;
pub mod log;
pub mod store;
