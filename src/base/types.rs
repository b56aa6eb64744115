use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use super::error::{CaseError, CaseRes};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// Count of demanded entries per responder-type label.
pub type ResponderDemand = HashMap<String, usize>;

/// One emergency incident under active or closed handling.
///
/// Field names are the persisted names and must stay stable across versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmergencyCase {
    /// Short free-text classification (e.g. "Heart attack").
    pub injury_type: String,
    /// Free-text identifier of the reporting party.
    pub caller_name: String,
    /// Responder-type labels; duplicates count separately.
    pub first_responders_demanded: Vec<String>,
    /// Unique, store-assigned, never reused.
    pub conversation_id: u64,
    /// Caller-defined severity scale.
    pub need_severity: i64,
    /// Closed cases drop out of open-case aggregation.
    pub closed: bool,
    /// Newline-joined transcript so far.
    pub conversation: String,
}

/// What a caller knows when opening a new case; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub injury_type: String,
    pub caller_name: String,
    pub first_responders_demanded: Vec<String>,
    pub need_severity: i64,
    pub conversation: String,
}

impl CaseReport {
    /// Build the open case for the given id.
    pub fn into_case(self, conversation_id: u64) -> EmergencyCase {
        EmergencyCase {
            injury_type: self.injury_type,
            caller_name: self.caller_name,
            first_responders_demanded: self.first_responders_demanded,
            conversation_id,
            need_severity: self.need_severity,
            closed: false,
            conversation: self.conversation,
        }
    }
}

/// The closed set of fields that may be updated by name.
///
/// `conversation_id` is immutable and `conversation` only grows through appends,
/// so neither appears here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseField {
    InjuryType(String),
    CallerName(String),
    FirstRespondersDemanded(Vec<String>),
    NeedSeverity(i64),
    Closed(bool),
}

impl CaseField {
    /// The persisted name of the field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InjuryType(_) => "injury_type",
            Self::CallerName(_) => "caller_name",
            Self::FirstRespondersDemanded(_) => "first_responders_demanded",
            Self::NeedSeverity(_) => "need_severity",
            Self::Closed(_) => "closed",
        }
    }

    /// Whether the named field holds free text.
    pub fn is_text(name: &str) -> bool {
        matches!(name, "injury_type" | "caller_name")
    }

    /// Resolve a field name and an untyped value into a typed update.
    pub fn parse(name: &str, value: Value) -> CaseRes<Self> {
        match name {
            "injury_type" => Ok(Self::InjuryType(typed(name, value)?)),
            "caller_name" => Ok(Self::CallerName(typed(name, value)?)),
            "first_responders_demanded" => Ok(Self::FirstRespondersDemanded(typed(name, value)?)),
            "need_severity" => Ok(Self::NeedSeverity(typed(name, value)?)),
            "closed" => Ok(Self::Closed(typed(name, value)?)),
            "conversation_id" => Err(CaseError::invalid_field(name, "the conversation id is immutable")),
            "conversation" => Err(CaseError::invalid_field(name, "the conversation only changes through appends")),
            _ => Err(CaseError::invalid_field(name, "unknown field")),
        }
    }

    /// Write the value into the case.
    pub fn apply(self, case: &mut EmergencyCase) {
        match self {
            Self::InjuryType(value) => case.injury_type = value,
            Self::CallerName(value) => case.caller_name = value,
            Self::FirstRespondersDemanded(value) => case.first_responders_demanded = value,
            Self::NeedSeverity(value) => case.need_severity = value,
            Self::Closed(value) => case.closed = value,
        }
    }
}

fn typed<T: DeserializeOwned>(name: &str, value: Value) -> CaseRes<T> {
    serde_json::from_value(value).map_err(|e| CaseError::invalid_field(name, e.to_string()))
}

/// Who spoke a transcript turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Speaker {
    Caller,
    Dispatcher,
    Agent(String),
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller => f.write_str("Caller"),
            Self::Dispatcher => f.write_str("Dispatcher"),
            Self::Agent(name) => f.write_str(name),
        }
    }
}

/// A disagreement between a case and its conversation artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Drift {
    /// The case has no artifact at all.
    MissingArtifact { conversation_id: u64 },
    /// The artifact does not contain the case's full transcript.
    TranscriptBehind { conversation_id: u64 },
}
