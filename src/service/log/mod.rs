pub mod file;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::error::CaseRes;

// Traits.

/// Generic conversation log trait that transcript sinks must implement.
///
/// Each case has exactly one append-only, human-readable artifact named from its
/// `conversation_id`. The case store is the only writer, and it never reads the
/// artifact back into case state.
#[async_trait]
pub trait GenericConversationLog: Send + Sync + 'static {
    /// Deterministic artifact name for a case.
    fn artifact_name(&self, conversation_id: u64) -> String;

    /// Write the opening transcript for a case.
    ///
    /// When the artifact does not exist yet, a `Caller: {caller_name}` header line
    /// precedes the transcript. An existing artifact is extended instead.
    async fn open(&self, conversation_id: u64, caller_name: &str, transcript: &str) -> CaseRes<()>;

    /// Append one transcript entry to the case's artifact.
    async fn append(&self, conversation_id: u64, text: &str) -> CaseRes<()>;

    /// Read the artifact for diagnostics; `None` when it does not exist.
    async fn read(&self, conversation_id: u64) -> CaseRes<Option<String>>;
}

// Structs.

/// Conversation log for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ConversationLog {
    inner: Arc<dyn GenericConversationLog>,
}

impl Deref for ConversationLog {
    type Target = dyn GenericConversationLog;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ConversationLog {
    pub fn new(inner: Arc<dyn GenericConversationLog>) -> Self {
        Self { inner }
    }
}
