//! Opening new cases from intake reports.

use tracing::{info, instrument};

use crate::{
    base::types::{CaseReport, EmergencyCase, Res},
    service::store::CaseStore,
};

/// Opens a case for a fresh report and returns it with its assigned id.
#[instrument(skip_all, fields(injury_type = %report.injury_type))]
pub async fn open_case(store: &CaseStore, report: CaseReport) -> Res<EmergencyCase> {
    let case = store.open_case(report).await?;

    info!(
        "Opened case `{}` for `{}` (severity {}).",
        case.conversation_id, case.caller_name, case.need_severity
    );

    Ok(case)
}

/// The walkthrough report used by the `demo` command.
pub fn demo_report() -> CaseReport {
    CaseReport {
        injury_type: "Fall".to_string(),
        caller_name: "AI Agent".to_string(),
        first_responders_demanded: vec!["paramedic".to_string()],
        need_severity: 6,
        conversation: "Initial report: Person fell down stairs and cannot move their left leg.".to_string(),
    }
}
