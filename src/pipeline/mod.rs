//! Pipeline module - the step-based state machine that turns report inputs
//! into a finished document and PDF.
//!
//! - `steps` - the canonical step table and step implementations
//! - `context` - state shared between steps, resumable across runs
//! - `audit` - per-run log entries
//! - `orchestrator` - ordering, criticality, timeouts, resumption

pub mod audit;
pub mod context;
pub mod orchestrator;
pub mod steps;

#[cfg(test)]
mod tests;

pub use audit::{LogEntry, LogLevel, RunLog};
pub use context::PipelineContext;
pub use orchestrator::{Orchestrator, RunError, RunOptions, RunOutcome, RunRequest, StepOutcome};
pub use steps::{
    step_index, title_font_size, Criticality, StepDescriptor, StepEnv, StepKind, StepReport, STEPS,
};
