//! Downstream half of the pipeline and the orchestrator wiring all stages
//!
//! - `WindowedGrouper`: per-file tumbling windows with fire/close state
//! - `DynamicWriter`: one output shard per fired group
//! - `Pipeline`: discovery → read → redact → group → write over bounded channels

pub mod error;
pub mod pipeline;
pub mod report;
pub mod window;
pub mod writer;

pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineOptions};
pub use report::{PipelineReport, ReportingEventSink};
pub use window::{Admission, PaneState, WindowSettings, WindowedGrouper};
pub use writer::DynamicWriter;
