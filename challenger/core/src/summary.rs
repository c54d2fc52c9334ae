use crate::{Error, Machine, Status, Word};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultReport {
    pub kind: &'static str,
    pub ip: Word,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opcode: Option<Word>,
    pub message: String,
}

impl From<&Error> for FaultReport {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            ip: err.ip(),
            opcode: err.opcode(),
            message: err.to_string(),
        }
    }
}

/// Final state of a run, as written by `challenger --summary-json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub image: String,
    /// `None` when the run ended in a fault.
    pub status: Option<Status>,
    pub steps: u64,
    pub ip: Word,
    pub registers: Vec<Word>,
    pub stack_depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultReport>,
}

impl RunSummary {
    pub fn new(
        image: impl Into<String>,
        machine: &Machine,
        outcome: &Result<Status, Error>,
    ) -> Self {
        let (status, fault) = match outcome {
            Ok(status) => (Some(*status), None),
            Err(err) => (None, Some(FaultReport::from(err))),
        };
        Self {
            image: image.into(),
            status,
            steps: machine.steps(),
            ip: machine.ip(),
            registers: machine.state().registers().to_vec(),
            stack_depth: machine.stack().len(),
            fault,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
