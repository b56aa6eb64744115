//! Recording transcript turns.

use tracing::{debug, instrument};

use crate::{
    base::types::{Speaker, Void},
    service::store::CaseStore,
};

/// Formats a turn as `{speaker}: {text}`.
pub fn format_turn(speaker: &Speaker, text: &str) -> String {
    format!("{speaker}: {}", text.trim())
}

/// Appends one spoken turn to a case's transcript.
#[instrument(skip(store, text))]
pub async fn record_turn(store: &CaseStore, conversation_id: u64, speaker: &Speaker, text: &str) -> Void {
    let turn = format_turn(speaker, text);

    store.append_to_conversation(conversation_id, &turn).await?;

    debug!("Recorded turn on case `{conversation_id}`.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_turn_trims_text() {
        assert_eq!(format_turn(&Speaker::Dispatcher, "  Is the patient conscious?\n"), "Dispatcher: Is the patient conscious?");
        assert_eq!(format_turn(&Speaker::Agent("Triage".to_string()), "Routing you now."), "Triage: Routing you now.");
    }
}
