//! splitpress - Split large PDFs into parts and compress them
//!
//! A Rust engine for partitioning a paginated PDF into smaller files and
//! optionally shrinking each part through an external Ghostscript pass,
//! with rate-limited progress events and cooperative cancellation.
//!
//! # Features
//!
//! - **Partition planning** ([`planner`]) - Three strategies: fixed part
//!   count, max pages per part, target size per part
//! - **Document access** ([`document`]) - Opens the source PDF with a
//!   Ghostscript repair fallback for damaged files
//! - **Part writing** ([`part_writer`]) - Streams page ranges into new
//!   PDFs with page-granular progress and cancellation
//! - **Ghostscript adapter** ([`ghostscript`]) - Supervised external
//!   compression/repair processes with polling and hard cancellation
//! - **Compression orchestration** ([`compressor`]) - Sequential or
//!   bounded-parallel compression across all parts
//! - **Progress channel** ([`progress`]) - Tagged events on a bounded
//!   queue with a throttled single consumer
//! - **Batch driver** ([`batch`]) - Multi-document runs with per-document
//!   error isolation and a single summary event
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use splitpress::{
//!     BatchRunner, CancellationToken, Ghostscript, NullSink, SplitConfig,
//! };
//! use std::path::PathBuf;
//!
//! let config = SplitConfig::from_json(
//!     r#"{"splitMode": "parts", "splitValue": 3, "compression": "medium"}"#,
//! ).unwrap();
//!
//! let engine = Ghostscript::locate();
//! let token = CancellationToken::new();
//! let runner = BatchRunner::new(config, engine.as_ref());
//! let summary = runner.run(
//!     &[PathBuf::from("big.pdf")],
//!     &token,
//!     Box::new(NullSink),
//! );
//! println!("{} of {} files done", summary.completed, summary.total);
//! ```
//!
//! # Architecture
//!
//! ```text
//! strategy + parameters -> PartitionPlan
//!                             |
//! source PDF  ->  sequential part writing (page-granular progress)
//!                             |
//!              sequential or pooled Ghostscript compression
//!                             |
//!                   ordered output part files
//! ```
//!
//! The write phase owns the open document exclusively; the compression
//! phase shares only the cancellation flag and a completion counter across
//! workers.

pub mod batch;
pub mod cancel;
pub mod cli;
pub mod compressor;
pub mod config;
pub mod document;
pub mod ghostscript;
pub mod inspect;
pub mod part_writer;
pub mod planner;
pub mod progress;
pub mod splitter;
pub mod util;

#[cfg(test)]
pub(crate) mod test_pdf;

// Re-exports for convenience
pub use batch::{BatchRunner, BatchSummary};
pub use cancel::CancellationToken;
pub use cli::{
    create_page_progress_bar, Cli, Commands, ExitCode, InfoArgs, JsonSink, SplitArgs, TerminalSink,
};
pub use compressor::{compress_all, PartFile, MAX_WORKERS, MIN_WORKERS};
pub use config::{ConfigError, SplitConfig, SplitMode};
pub use document::{OpenError, SourceDocument};
pub use ghostscript::{EngineError, Ghostscript, Preset, Transcoder, UnknownPreset};
pub use inspect::{inspect, PdfInfo, PdfStatus};
pub use part_writer::{write_part, WriteContext, WriteError};
pub use planner::{
    plan_by_max_pages, plan_by_parts, plan_by_target_size, PartitionPlan, PlanError, SplitStrategy,
};
pub use progress::{
    Event, EventChannel, EventSender, NullSink, ProgressReporter, ProgressSink, PROGRESS_THROTTLE,
};
pub use splitter::{SplitError, SplitOptions, Splitter};
