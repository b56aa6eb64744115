//! Command-line operations over the case registry.

use std::collections::BTreeMap;

use clap::Subcommand;
use serde_json::{Value, json};
use tracing::instrument;

use crate::{
    base::{
        error::CaseError,
        types::{CaseField, CaseReport, Res, Speaker},
    },
    interaction::{dispatch, intake, transcript},
    runtime::Runtime,
};

/// One registry operation, as exposed on the command line.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a new case with the next free id.
    Open {
        /// Short classification, e.g. "Heart attack".
        #[arg(long)]
        injury_type: String,
        /// Who is reporting.
        #[arg(long)]
        caller_name: String,
        /// Caller-defined severity, e.g. 1-10.
        #[arg(long)]
        severity: i64,
        /// Responder type to request; repeat for more.
        #[arg(short, long = "responder")]
        responders: Vec<String>,
        /// Initial transcript line.
        #[arg(short, long)]
        message: String,
    },
    /// Append text to a case transcript.
    Append {
        id: u64,
        /// Prefix the text with a speaker (`caller`, `dispatcher`, or an agent name).
        #[arg(short, long)]
        speaker: Option<String>,
        text: String,
    },
    /// Set one field by name; text fields take the value as-is, others parse it as JSON.
    Update { id: u64, field: String, value: String },
    /// Replace the demanded responder list.
    Responders { id: u64, responders: Vec<String> },
    /// Mark a case closed.
    Close { id: u64 },
    /// Print one case.
    Show { id: u64 },
    /// Print every open case.
    OpenCases,
    /// Print demanded responders across open cases.
    Demand,
    /// Print the dispatch summary with the severity queue.
    Queue {
        /// Show at most this many cases.
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Compare cases against their conversation artifacts.
    Audit,
    /// Open a sample case and append an update.
    Demo,
}

impl Command {
    /// Run the command and return what should be printed.
    #[instrument(skip(runtime))]
    pub async fn execute(self, runtime: &Runtime) -> Res<Value> {
        let store = &runtime.store;

        let output = match self {
            Command::Open {
                injury_type,
                caller_name,
                severity,
                responders,
                message,
            } => {
                let report = CaseReport {
                    injury_type,
                    caller_name,
                    first_responders_demanded: responders,
                    need_severity: severity,
                    conversation: message,
                };

                serde_json::to_value(intake::open_case(store, report).await?)?
            }
            Command::Append { id, speaker, text } => {
                match speaker {
                    Some(label) => transcript::record_turn(store, id, &parse_speaker(&label), &text).await?,
                    None => store.append_to_conversation(id, &text).await?,
                }

                show(runtime, id).await?
            }
            Command::Update { id, field, value } => {
                store.update_case_field_by_name(id, &field, parse_value(&field, &value)).await?;

                show(runtime, id).await?
            }
            Command::Responders { id, responders } => {
                store.update_responders(id, responders).await?;

                show(runtime, id).await?
            }
            Command::Close { id } => {
                store.update_case_field(id, CaseField::Closed(true)).await?;

                show(runtime, id).await?
            }
            Command::Show { id } => show(runtime, id).await?,
            Command::OpenCases => serde_json::to_value(store.get_open_cases().await)?,
            Command::Demand => {
                let demand: BTreeMap<_, _> = store.count_responders_needed().await.into_iter().collect();
                serde_json::to_value(demand)?
            }
            Command::Queue { limit } => serde_json::to_value(dispatch::summarize(store, &runtime.config.available_responders, limit).await)?,
            Command::Audit => serde_json::to_value(store.audit().await?)?,
            Command::Demo => {
                let case = intake::open_case(store, intake::demo_report()).await?;
                let id = case.conversation_id;

                store.append_to_conversation(id, "Update: Person reports pain when attempting to move leg.").await?;

                json!({ "started_conversation_id": id, "case": show(runtime, id).await? })
            }
        };

        Ok(output)
    }
}

async fn show(runtime: &Runtime, id: u64) -> Res<Value> {
    let case = runtime.store.get_case_by_id(id).await.ok_or(CaseError::NotFound(id))?;
    Ok(serde_json::to_value(case)?)
}

/// `caller` and `dispatcher` are the fixed roles; anything else names an agent.
pub fn parse_speaker(label: &str) -> Speaker {
    match label.to_ascii_lowercase().as_str() {
        "caller" => Speaker::Caller,
        "dispatcher" => Speaker::Dispatcher,
        _ => Speaker::Agent(label.to_string()),
    }
}

/// Parse a command-line value for the named field.
///
/// Text fields keep the raw string unless it is a quoted JSON string, so `42` or
/// `true` stay text. Other fields parse as JSON, falling back to a plain string
/// so the type error names the field.
pub fn parse_value(field: &str, raw: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(Value::String(text)) => Value::String(text),
        Ok(value) if !CaseField::is_text(field) => value,
        _ => Value::String(raw.to_string()),
    }
}
