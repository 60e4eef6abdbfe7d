//! CLI interface module
//!
//! Provides command-line interface using clap derive macros.

use crate::config::{SplitConfig, SplitMode};
use crate::ghostscript::Preset;
use crate::progress::{Event, ProgressSink};
use crate::util::format_file_size;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// Exit codes for the CLI
///
/// These codes follow standard Unix conventions and provide
/// specific error categories for scripting and automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful run
    Success = 0,
    /// General error
    GeneralError = 1,
    /// Argument error
    InvalidArgs = 2,
    /// Input file not found or unreadable
    InputNotFound = 3,
    /// Output error (permission denied, disk full, etc.)
    OutputError = 4,
    /// Processing error
    ProcessingError = 5,
    /// Ghostscript missing or failed
    ExternalToolError = 7,
    /// Interrupted by cancellation
    Cancelled = 130,
}

impl ExitCode {
    /// Convert to process exit code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Get human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::InvalidArgs => "Invalid arguments",
            ExitCode::InputNotFound => "Input file not found",
            ExitCode::OutputError => "Output error (permission denied, disk full, etc.)",
            ExitCode::ProcessingError => "Processing error",
            ExitCode::ExternalToolError => "External tool error (Ghostscript)",
            ExitCode::Cancelled => "Cancelled",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.code()
    }
}

/// Split large PDFs into parts and compress them with Ghostscript
#[derive(Parser, Debug)]
#[command(name = "splitpress")]
#[command(version)]
#[command(about = "Split large PDFs into parts and compress them with Ghostscript", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Split PDF files, optionally compressing each part
    Split(SplitArgs),
    /// Inspect PDF files and report tool availability
    Info(InfoArgs),
}

/// Arguments for the split command
#[derive(clap::Args, Debug)]
pub struct SplitArgs {
    /// Input PDF files
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "./output")]
    pub output: PathBuf,

    /// Split mode: parts, pages, or size
    #[arg(short, long, default_value = "parts")]
    pub mode: SplitMode,

    /// Part count, max pages per part, or target megabytes per part
    #[arg(short, long, default_value_t = 4)]
    pub value: u64,

    /// Compression preset: low, medium, high, or maximum
    #[arg(short, long)]
    pub compress: Option<Preset>,

    /// Parallel compression workers (clamped to 1-8)
    #[arg(short, long, default_value_t = 2)]
    pub workers: usize,

    /// Strip embedded images from the output parts
    #[arg(long)]
    pub remove_images: bool,

    /// Only repair the input through Ghostscript; do not split
    #[arg(long)]
    pub repair_only: bool,

    /// Emit progress events as JSON lines instead of a progress bar
    #[arg(long)]
    pub json: bool,
}

impl SplitArgs {
    /// Fold the CLI flags into the shared configuration surface.
    pub fn to_config(&self) -> SplitConfig {
        SplitConfig {
            split_mode: self.mode,
            split_value: self.value,
            compression: self.compress,
            workers: self.workers,
            remove_images: self.remove_images,
            repair_only: self.repair_only,
            output_folder: self.output.clone(),
        }
    }
}

/// Arguments for the info command
#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    /// PDF files to inspect
    pub inputs: Vec<PathBuf>,

    /// Emit inspection results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Create a progress bar for page processing
pub fn create_page_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] Page {pos}/{len} ({percent}%) - {msg}",
            )
            .expect("Invalid progress bar template")
            .progress_chars("#>-"),
    );
    pb
}

/// Renders progress events on a terminal progress bar.
pub struct TerminalSink {
    bar: Option<ProgressBar>,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self { bar: None }
    }

    fn bar_for(&mut self, total: u64) -> &ProgressBar {
        let needs_new = self
            .bar
            .as_ref()
            .map(|bar| bar.length() != Some(total))
            .unwrap_or(true);
        if needs_new {
            if let Some(old) = self.bar.take() {
                old.finish_and_clear();
            }
            self.bar = Some(create_page_progress_bar(total));
        }
        self.bar.as_ref().expect("bar just created")
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalSink {
    fn emit(&mut self, event: Event) {
        match event {
            Event::Progress {
                current_page,
                total_pages,
                status,
                ..
            } => {
                let bar = self.bar_for(total_pages as u64);
                bar.set_position(current_page as u64);
                bar.set_message(status);
            }
            Event::PartComplete { filename, outputs } => {
                let line = format!("{} -> {}", filename, outputs.join(", "));
                match &self.bar {
                    Some(bar) => bar.println(line),
                    None => println!("{}", line),
                }
            }
            Event::CompressionPartStart { part } => {
                if let Some(bar) = &self.bar {
                    bar.set_message(format!("Compressing part {}...", part));
                }
            }
            Event::CompressionProgress {
                part,
                temp_size,
                estimated_output_size,
                ..
            } => {
                if let Some(bar) = &self.bar {
                    bar.set_message(format!(
                        "Compressing part {}: {} of ~{}",
                        part,
                        format_file_size(temp_size),
                        format_file_size(estimated_output_size)
                    ));
                }
            }
            Event::AllComplete {
                completed,
                total,
                total_parts,
                elapsed_seconds,
                cancelled,
            } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                if cancelled {
                    println!(
                        "Cancelled after {} of {} files ({} parts, {}s)",
                        completed, total, total_parts, elapsed_seconds
                    );
                } else {
                    println!(
                        "Done: {} of {} files, {} parts in {}s",
                        completed, total, total_parts, elapsed_seconds
                    );
                }
            }
            Event::Error { message } => match &self.bar {
                Some(bar) => bar.println(format!("error: {}", message)),
                None => eprintln!("error: {}", message),
            },
        }
    }
}

/// Streams every delivered event as one JSON object per line.
pub struct JsonSink;

impl ProgressSink for JsonSink {
    fn emit(&mut self, event: Event) {
        if let Ok(line) = serde_json::to_string(&event) {
            println!("{}", line);
        }
    }
}
