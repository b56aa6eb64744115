//! Library root for `disaster-relief`.
//!
//! Disaster-relief keeps the emergency case registry behind a dispatch assistant:
//! - Records emergency calls as cases with a severity and demanded responders
//! - Keeps each case's transcript, mirrored to a human-readable artifact
//! - Updates case fields as the conversation evolves
//! - Aggregates responder demand across open cases for dispatch
//!
//! Cases persist to a JSON file and transcripts to one text file per case.
//! The architecture is built around extensible traits that allow for different
//! implementations of each storage service.

pub mod base;
pub mod command;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use command::Command;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Loads the runtime context (case store and conversation log), runs one
/// command, and prints its result as pretty JSON.
pub async fn start(config: Config, command: Command) -> Void {
    info!("Starting disaster-relief ...");

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config).await?;

    // Run the command.
    let output = command.execute(&runtime).await?;

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
