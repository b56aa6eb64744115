pub mod json;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    base::{
        error::{CaseError, CaseRes},
        types::{CaseField, CaseReport, Drift, EmergencyCase, ResponderDemand},
    },
    service::aggregate,
};

// Traits.

/// Generic case store trait that storage backends must implement.
///
/// The store is the sole writer of durable case state and of conversation
/// artifacts. Every mutation either fully succeeds (memory, durable copy, and
/// artifact) or reports failure with memory still matching the durable copy.
/// Reads hand out copies taken from a consistent snapshot.
#[async_trait]
pub trait GenericCaseStore: Send + Sync + 'static {
    /// Adds a case with a caller-chosen id, persists the collection, and opens its artifact.
    ///
    /// Fails with `DuplicateId` when the id is taken, and with `InvalidField` when the
    /// id is zero or `u64::MAX` (which would leave no successor), leaving the
    /// collection unchanged.
    async fn add_case(&self, case: EmergencyCase) -> CaseRes<()>;

    /// Assigns the next id to a report and adds it as an open case in one step.
    async fn open_case(&self, report: CaseReport) -> CaseRes<EmergencyCase>;

    /// Gets a copy of the case with the given id, if any.
    async fn get_case_by_id(&self, conversation_id: u64) -> Option<EmergencyCase>;

    /// Gets every case that is not closed, in store order.
    async fn get_open_cases(&self) -> Vec<EmergencyCase>;

    /// Gets every case, in store order.
    async fn all_cases(&self) -> Vec<EmergencyCase>;

    /// Sets one field of a case and persists the collection.
    async fn update_case_field(&self, conversation_id: u64, field: CaseField) -> CaseRes<()>;

    /// Replaces the demanded responder list of a case wholesale.
    async fn update_responders(&self, conversation_id: u64, responders: Vec<String>) -> CaseRes<()>;

    /// Appends `"\n" + text` to the case transcript and `text + "\n\n"` to its artifact.
    ///
    /// The durable record is written before the artifact.
    async fn append_to_conversation(&self, conversation_id: u64, text: &str) -> CaseRes<()>;

    /// `1` for an empty store, otherwise one past the largest id.
    ///
    /// Fails with `IdsExhausted` when the largest id has no successor.
    async fn next_conversation_id(&self) -> CaseRes<u64>;

    /// Compares every case against its artifact and reports disagreements.
    ///
    /// Artifacts are read for diagnostics only; case state is never derived from them.
    async fn audit(&self) -> CaseRes<Vec<Drift>>;

    /// Updates a field given by name with an untyped value.
    ///
    /// Unknown cases fail with `NotFound` before the name or value is checked.
    async fn update_case_field_by_name(&self, conversation_id: u64, name: &str, value: Value) -> CaseRes<()> {
        if self.get_case_by_id(conversation_id).await.is_none() {
            return Err(CaseError::NotFound(conversation_id));
        }

        let field = CaseField::parse(name, value)?;

        self.update_case_field(conversation_id, field).await
    }

    /// Counts demanded responders across the open cases.
    async fn count_responders_needed(&self) -> ResponderDemand {
        aggregate::count_responders_needed(&self.get_open_cases().await)
    }
}

// Structs.

/// Case store for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct CaseStore {
    inner: Arc<dyn GenericCaseStore>,
}

impl Deref for CaseStore {
    type Target = dyn GenericCaseStore;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl CaseStore {
    pub fn new(inner: Arc<dyn GenericCaseStore>) -> Self {
        Self { inner }
    }
}
