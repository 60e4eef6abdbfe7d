//! Quick PDF inspection.
//!
//! Extracts page count, size and health status without running the split
//! pipeline. Shares the opener's repair fallback: a document that only
//! parses after an engine rewrite is reported as `needs_repair`.

use crate::cancel::CancellationToken;
use crate::document::{OpenError, SourceDocument};
use crate::ghostscript::Transcoder;
use crate::util::format_file_size;
use serde::Serialize;
use std::path::Path;

/// Health classification of an inspected PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PdfStatus {
    /// Parses directly.
    Ok,
    /// Parses only after an engine repair pass.
    NeedsRepair,
    /// Unreadable even after repair (or repair unavailable).
    Error,
}

/// Inspection result for one file.
#[derive(Debug, Clone, Serialize)]
pub struct PdfInfo {
    pub path: String,
    pub name: String,
    pub pages: usize,
    pub size_bytes: u64,
    pub size_human: String,
    pub status: PdfStatus,
    /// Parse failure detail when `status` is `Error`.
    pub error: String,
}

/// Return page count, file size and health status for a PDF.
///
/// Inspection never fails: unreadable files come back with
/// [`PdfStatus::Error`] and the parse failure in `error`.
pub fn inspect<E: Transcoder>(path: &Path, engine: Option<&E>) -> PdfInfo {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    let token = CancellationToken::new();
    match SourceDocument::open(path, engine, &token) {
        Ok(document) => PdfInfo {
            path: path.display().to_string(),
            name,
            pages: document.page_count(),
            size_bytes,
            size_human: format_file_size(size_bytes),
            status: if document.needed_repair() {
                PdfStatus::NeedsRepair
            } else {
                PdfStatus::Ok
            },
            error: String::new(),
        },
        Err(error) => PdfInfo {
            path: path.display().to_string(),
            name,
            pages: 0,
            size_bytes,
            size_human: format_file_size(size_bytes),
            status: PdfStatus::Error,
            error: match error {
                OpenError::Unreadable { reason, .. } => reason,
                other => other.to_string(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ghostscript::{EngineError, Ghostscript, Preset, Result as EngineResult};
    use crate::test_pdf::write_test_pdf;

    struct RepairToFixture(u32);

    impl Transcoder for RepairToFixture {
        fn transcode(
            &self,
            _input: &Path,
            _preset: Preset,
            _token: &CancellationToken,
            _on_temp_size: Option<&(dyn Fn(u64) + Sync)>,
        ) -> EngineResult<()> {
            Ok(())
        }

        fn rewrite(
            &self,
            _input: &Path,
            output: &Path,
            _token: &CancellationToken,
        ) -> EngineResult<()> {
            write_test_pdf(output, self.0);
            Ok(())
        }
    }

    struct NoRepair;

    impl Transcoder for NoRepair {
        fn transcode(
            &self,
            _input: &Path,
            _preset: Preset,
            _token: &CancellationToken,
            _on_temp_size: Option<&(dyn Fn(u64) + Sync)>,
        ) -> EngineResult<()> {
            Ok(())
        }

        fn rewrite(
            &self,
            _input: &Path,
            _output: &Path,
            _token: &CancellationToken,
        ) -> EngineResult<()> {
            Err(EngineError::Failed {
                status: 1,
                stderr: "broken beyond repair".into(),
            })
        }
    }

    #[test]
    fn test_inspect_healthy_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fine.pdf");
        write_test_pdf(&path, 7);

        let info = inspect(&path, None::<&Ghostscript>);
        assert_eq!(info.status, PdfStatus::Ok);
        assert_eq!(info.pages, 7);
        assert_eq!(info.name, "fine.pdf");
        assert!(info.size_bytes > 0);
        assert!(info.error.is_empty());
    }

    #[test]
    fn test_inspect_repairable_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mangled.pdf");
        std::fs::write(&path, b"garbage").unwrap();

        let info = inspect(&path, Some(&RepairToFixture(2)));
        assert_eq!(info.status, PdfStatus::NeedsRepair);
        assert_eq!(info.pages, 2);
    }

    #[test]
    fn test_inspect_unreadable_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead.pdf");
        std::fs::write(&path, b"garbage").unwrap();

        let info = inspect(&path, Some(&NoRepair));
        assert_eq!(info.status, PdfStatus::Error);
        assert_eq!(info.pages, 0);
        assert!(!info.error.is_empty());
    }

    #[test]
    fn test_inspect_serializes_snake_case_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fine.pdf");
        write_test_pdf(&path, 1);

        let info = inspect(&path, None::<&Ghostscript>);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["pages"], 1);
    }
}
