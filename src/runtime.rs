//! Runtime services and shared state for the case registry.

use tracing::instrument;

use crate::{
    base::{config::Config, types::Res},
    service::{log::ConversationLog, store::CaseStore},
};

/// Runtime service context that can be shared across the application.
///
/// One is built per process (or per test); nothing is held in globals.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The case store, sole writer of cases and their conversation artifacts.
    pub store: CaseStore,
}

impl Runtime {
    /// Create a new runtime instance backed by files.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the conversation log.
        let log = ConversationLog::file(&config);

        // Load the case store.
        let store = CaseStore::json(&config, log).await?;

        Ok(Self { config, store })
    }
}
