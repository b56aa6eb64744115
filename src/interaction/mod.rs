//! Caller-facing flows over the case registry.
//!
//! The orchestration layer decides severity and which responders to request;
//! these flows only record what it reports and summarize demand:
//! - Opening cases from intake reports
//! - Recording transcript turns by speaker
//! - Summarizing responder demand for dispatch

pub mod dispatch;
pub mod intake;
pub mod transcript;
