//! Pure queries over case snapshots: responder demand and the severity queue.

use std::collections::HashMap;

use crate::base::types::{EmergencyCase, ResponderDemand};

/// Tally demanded responder labels across the open cases.
///
/// Duplicate entries within one case count separately. Closed cases are skipped,
/// so callers may pass either the open subset or the whole collection.
pub fn count_responders_needed<'a, I>(cases: I) -> ResponderDemand
where
    I: IntoIterator<Item = &'a EmergencyCase>,
{
    let mut demand = ResponderDemand::new();

    for case in cases.into_iter().filter(|c| !c.closed) {
        for responder in &case.first_responders_demanded {
            *demand.entry(responder.clone()).or_insert(0) += 1;
        }
    }

    demand
}

/// Demand that the available pool cannot cover, per label.
///
/// Labels that are fully covered are omitted.
pub fn shortfall(demand: &ResponderDemand, available: &HashMap<String, usize>) -> ResponderDemand {
    demand
        .iter()
        .filter_map(|(label, needed)| {
            let on_hand = available.get(label).copied().unwrap_or(0);
            (*needed > on_hand).then(|| (label.clone(), needed - on_hand))
        })
        .collect()
}

/// Open cases ordered by descending severity, ties kept in store order.
pub fn triage_queue(cases: &[EmergencyCase], limit: Option<usize>) -> Vec<EmergencyCase> {
    let mut open: Vec<&EmergencyCase> = cases.iter().filter(|c| !c.closed).collect();

    // Stable sort keeps insertion order among equal severities.
    open.sort_by(|a, b| b.need_severity.cmp(&a.need_severity));

    open.into_iter().take(limit.unwrap_or(usize::MAX)).cloned().collect()
}
