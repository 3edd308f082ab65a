//! Lead-qualification workflow: create offer, upload batch, request scoring,
//! fetch and export results.

pub mod batch;
pub mod orchestrator;
pub mod stats;

pub use batch::BatchFile;
pub use orchestrator::{HydrateReport, Workflow, WorkflowProgress};
pub use stats::Stats;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
