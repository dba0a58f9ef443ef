//! Stage sequencing for chart jobs.

mod batch;
mod cache;
mod report;
mod sequencer;
mod stages;

#[cfg(test)]
pub(crate) mod testing;


pub use batch::{CommandBatch, ImagePair};
pub use cache::{acquire_archive, evict_stale_archive};
pub use report::{format_hms, JobSummary, RunReport, StageStatus};
pub use sequencer::Sequencer;
pub use stages::{Stage, StageContext, StageOutcome, TileMetadata};
