//! Per-document split pipeline.
//!
//! Ties the planner, writer and compression orchestrator together for one
//! source document: open (with repair fallback), plan, write every part in
//! plan order, then optionally compress the parts. Output files are named
//! `{base}_part_{n}.{ext}` with 1-based part numbers encoding plan order.

use crate::cancel::CancellationToken;
use crate::compressor::{compress_all, PartFile};
use crate::document::{OpenError, SourceDocument};
use crate::ghostscript::{EngineError, Preset, Transcoder};
use crate::part_writer::{write_part, WriteContext, WriteError};
use crate::planner::{PlanError, SplitStrategy};
use crate::progress::{Event, EventSender};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Split operation error types, the operation-level taxonomy.
#[derive(Debug, Error)]
pub enum SplitError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("cannot open {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("compression engine (Ghostscript) is not available")]
    EngineUnavailable,

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SplitError>;

impl SplitError {
    /// Cancellation is a terminal state distinct from failure; callers use
    /// this to skip error reporting for it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SplitError::Cancelled)
    }
}

impl From<PlanError> for SplitError {
    fn from(error: PlanError) -> Self {
        match error {
            PlanError::InvalidParameter(msg) => SplitError::InvalidParameter(msg),
        }
    }
}

impl From<OpenError> for SplitError {
    fn from(error: OpenError) -> Self {
        match error {
            OpenError::NotFound(path) => SplitError::Open {
                path,
                reason: "file not found".into(),
            },
            OpenError::Unreadable { path, reason } => SplitError::Open { path, reason },
            OpenError::Cancelled => SplitError::Cancelled,
            OpenError::Io(e) => SplitError::Io(e),
        }
    }
}

impl From<WriteError> for SplitError {
    fn from(error: WriteError) -> Self {
        match error {
            WriteError::Cancelled => SplitError::Cancelled,
            WriteError::Io(e) => SplitError::Io(e),
            other => SplitError::Write(other.to_string()),
        }
    }
}

impl From<EngineError> for SplitError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Unavailable => SplitError::EngineUnavailable,
            EngineError::Cancelled => SplitError::Cancelled,
            EngineError::Failed { status, stderr } => SplitError::CompressionFailed(format!(
                "Ghostscript exited with status {}: {}",
                status, stderr
            )),
            EngineError::Io(e) => SplitError::Io(e),
        }
    }
}

/// Options shared by every split strategy.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Compress every part at this preset after writing; `None` skips the
    /// compression phase entirely.
    pub compression: Option<Preset>,
    /// Compression worker count; clamped to `[1, 8]` at use.
    pub workers: usize,
    /// Strip embedded images while copying pages.
    pub remove_images: bool,
    /// Only run the engine repair pass; no parts are produced.
    pub repair_only: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            compression: None,
            workers: 1,
            remove_images: false,
            repair_only: false,
        }
    }
}

/// Splits one document at a time against a (possibly absent) engine.
pub struct Splitter<'e, E: Transcoder> {
    engine: Option<&'e E>,
    options: SplitOptions,
}

impl<'e, E: Transcoder> Splitter<'e, E> {
    pub fn new(engine: Option<&'e E>, options: SplitOptions) -> Self {
        Self { engine, options }
    }

    /// Split into a fixed number of near-equal parts.
    pub fn split_by_parts(
        &self,
        input: &Path,
        num_parts: usize,
        output_dir: &Path,
        token: &CancellationToken,
        events: &EventSender,
    ) -> Result<Vec<PathBuf>> {
        self.split(input, SplitStrategy::Parts(num_parts), output_dir, token, events)
    }

    /// Split so no part exceeds `max_pages` pages.
    pub fn split_by_max_pages(
        &self,
        input: &Path,
        max_pages: usize,
        output_dir: &Path,
        token: &CancellationToken,
        events: &EventSender,
    ) -> Result<Vec<PathBuf>> {
        self.split(
            input,
            SplitStrategy::MaxPages(max_pages),
            output_dir,
            token,
            events,
        )
    }

    /// Split so each part lands approximately under `target_bytes`.
    pub fn split_by_target_size(
        &self,
        input: &Path,
        target_bytes: u64,
        output_dir: &Path,
        token: &CancellationToken,
        events: &EventSender,
    ) -> Result<Vec<PathBuf>> {
        self.split(
            input,
            SplitStrategy::TargetSize(target_bytes),
            output_dir,
            token,
            events,
        )
    }

    /// Run the full pipeline for one document. Returns the ordered output
    /// paths.
    pub fn split(
        &self,
        input: &Path,
        strategy: SplitStrategy,
        output_dir: &Path,
        token: &CancellationToken,
        events: &EventSender,
    ) -> Result<Vec<PathBuf>> {
        // Compression needs the engine; refuse before writing anything.
        if (self.options.compression.is_some() || self.options.repair_only)
            && self.engine.is_none()
        {
            return Err(SplitError::EngineUnavailable);
        }

        let source = SourceDocument::open(input, self.engine, token)?;

        if self.options.repair_only {
            return self.repair_only(&source, output_dir, token, events);
        }

        let total_pages = source.page_count();
        let plan = strategy.plan(total_pages, source.file_size())?;
        let total_parts = plan.len();
        let base_name = source.base_name();
        let extension = source.extension();

        // Phase 1: write all parts sequentially against the single open
        // source.
        let mut parts = Vec::with_capacity(total_parts);
        for (index, range) in plan.ranges().enumerate() {
            let dest = output_dir.join(format!("{}_part_{}.{}", base_name, index + 1, extension));
            let page_offset = range.start;
            let pages = range.len();

            let ctx = WriteContext {
                token,
                events,
                part_index: index,
                total_parts,
                page_offset,
                total_pages,
                remove_images: self.options.remove_images,
            };
            write_part(&source, range, &dest, &ctx)?;

            let bytes_written = std::fs::metadata(&dest).map(|m| m.len()).ok();
            events.send(Event::Progress {
                current_page: page_offset + pages,
                total_pages,
                current_part: index + 1,
                total_parts,
                status: format!("Part {}/{} written", index + 1, total_parts),
                bytes_written,
            });

            parts.push(PartFile {
                index,
                path: dest,
                pages,
                page_offset,
            });
        }

        // The write phase owns the source exclusively; close it before any
        // compression worker touches the part files.
        drop(source);

        // Phase 2: compression.
        if let Some(preset) = self.options.compression {
            let engine = self.engine.ok_or(SplitError::EngineUnavailable)?;
            compress_all(
                engine,
                &parts,
                total_pages,
                preset,
                self.options.workers,
                token,
                events,
            )?;
        }

        Ok(parts.into_iter().map(|part| part.path).collect())
    }

    /// Repair pass without splitting: rewrite the document at highest
    /// fidelity into `{base}_repaired.{ext}`.
    fn repair_only(
        &self,
        source: &SourceDocument,
        output_dir: &Path,
        token: &CancellationToken,
        events: &EventSender,
    ) -> Result<Vec<PathBuf>> {
        let engine = self.engine.ok_or(SplitError::EngineUnavailable)?;
        let dest = output_dir.join(format!(
            "{}_repaired.{}",
            source.base_name(),
            source.extension()
        ));

        engine.rewrite(source.path(), &dest, token)?;

        let total_pages = source.page_count();
        events.send(Event::Progress {
            current_page: total_pages,
            total_pages,
            current_part: 1,
            total_parts: 1,
            status: format!("Repaired {}", source.base_name()),
            bytes_written: std::fs::metadata(&dest).map(|m| m.len()).ok(),
        });
        Ok(vec![dest])
    }
}
