//! Sync orchestration
//!
//! [`SyncManager`] drives one run through explicit phases:
//! `Scanning → Planning → Executing → Reporting → Done`. Dry runs go
//! straight from planning to reporting.

mod manager;

pub use manager::SyncManager;

use crate::executor::ExecutionReport;
use crate::types::{ExecutionResult, LocalFile, Operation, RemoteObject};

/// Where a run currently stands, carrying what the next phase needs
#[derive(Debug)]
pub enum SyncPhase {
    Scanning,
    Planning {
        locals: Vec<LocalFile>,
        remotes: Vec<RemoteObject>,
    },
    Executing {
        plan: Vec<Operation>,
    },
    /// `report` is `None` when nothing was executed
    Reporting {
        plan: Vec<Operation>,
        report: Option<ExecutionReport>,
    },
    Done(ExecutionResult),
}

impl SyncPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SyncPhase::Scanning => "scanning",
            SyncPhase::Planning { .. } => "planning",
            SyncPhase::Executing { .. } => "executing",
            SyncPhase::Reporting { .. } => "reporting",
            SyncPhase::Done(_) => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, SyncPhase::Done(_))
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
