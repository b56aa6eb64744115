//! Dispatch summaries built from open-case demand.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    base::types::{EmergencyCase, ResponderDemand},
    service::{aggregate, store::CaseStore},
};

/// Everything a dispatcher needs to decide who goes where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Demanded responders across open cases.
    pub demand: ResponderDemand,
    /// Responders on hand.
    pub available: HashMap<String, usize>,
    /// Demand the available pool cannot cover.
    pub shortfall: ResponderDemand,
    /// Open cases, most severe first.
    pub queue: Vec<EmergencyCase>,
}

/// Summarizes current demand against the available pool.
#[instrument(skip_all)]
pub async fn summarize(store: &CaseStore, available: &HashMap<String, usize>, limit: Option<usize>) -> DispatchSummary {
    let open = store.get_open_cases().await;

    let demand = aggregate::count_responders_needed(&open);
    let shortfall = aggregate::shortfall(&demand, available);
    let queue = aggregate::triage_queue(&open, limit);

    if shortfall.is_empty() {
        info!("{} open cases, demand covered.", open.len());
    } else {
        warn!("{} open cases, short on {} responder types.", open.len(), shortfall.len());
    }

    DispatchSummary {
        demand,
        available: available.clone(),
        shortfall,
        queue,
    }
}
