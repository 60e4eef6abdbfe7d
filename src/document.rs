//! Source document access.
//!
//! Opens the PDF being split. A document that fails to parse gets one
//! repair attempt through the engine at highest fidelity; the repaired
//! temporary is always removed once loaded (or on any failure).

use crate::cancel::CancellationToken;
use crate::ghostscript::{EngineError, Transcoder};
use lopdf::{Document, ObjectId};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Document opening error types
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("cannot open {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OpenError>;

/// An opened source PDF, exclusively owned by the operation that opened it.
pub struct SourceDocument {
    document: Document,
    path: PathBuf,
    file_size: u64,
    /// Page object ids in page order.
    page_ids: Vec<ObjectId>,
    needed_repair: bool,
}

impl SourceDocument {
    /// Open `path`, attempting an engine repair pass if the direct parse
    /// fails. Without an engine the original parse error is surfaced.
    pub fn open<E: Transcoder>(
        path: impl AsRef<Path>,
        engine: Option<&E>,
        token: &CancellationToken,
    ) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(OpenError::NotFound(path.to_path_buf()));
        }
        let file_size = std::fs::metadata(path)?.len();

        match Document::load(path) {
            Ok(document) => Ok(Self::from_parts(document, path, file_size, false)),
            Err(first_err) => {
                let Some(engine) = engine else {
                    return Err(OpenError::Unreadable {
                        path: path.to_path_buf(),
                        reason: first_err.to_string(),
                    });
                };
                let document = Self::open_repaired(path, engine, token, &first_err)?;
                Ok(Self::from_parts(document, path, file_size, true))
            }
        }
    }

    /// Run the repair pass into a sibling temp file and load the result.
    /// The temp file is removed on every path out of here.
    fn open_repaired<E: Transcoder>(
        path: &Path,
        engine: &E,
        token: &CancellationToken,
        first_err: &lopdf::Error,
    ) -> Result<Document> {
        let repaired = PathBuf::from(format!("{}.tmp_repaired.pdf", path.display()));

        let result = engine
            .rewrite(path, &repaired, token)
            .map_err(|e| match e {
                EngineError::Cancelled => OpenError::Cancelled,
                other => OpenError::Unreadable {
                    path: path.to_path_buf(),
                    reason: format!("{} (repair failed: {})", first_err, other),
                },
            })
            .and_then(|()| {
                Document::load(&repaired).map_err(|e| OpenError::Unreadable {
                    path: path.to_path_buf(),
                    reason: format!("{} (repaired copy also unreadable: {})", first_err, e),
                })
            });

        if repaired.exists() {
            let _ = std::fs::remove_file(&repaired);
        }
        result
    }

    fn from_parts(document: Document, path: &Path, file_size: u64, needed_repair: bool) -> Self {
        // get_pages is keyed by 1-based page number; BTreeMap iteration
        // yields page order.
        let page_ids = document.get_pages().into_values().collect();
        Self {
            document,
            path: path.to_path_buf(),
            file_size,
            page_ids,
            needed_repair,
        }
    }

    /// Total page count.
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Size of the source file on disk, in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path the document was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether opening required the engine repair fallback.
    pub fn needed_repair(&self) -> bool {
        self.needed_repair
    }

    /// Object id of the 0-based page `index`.
    pub(crate) fn page_id(&self, index: usize) -> Option<ObjectId> {
        self.page_ids.get(index).copied()
    }

    /// Underlying parsed document.
    pub(crate) fn raw(&self) -> &Document {
        &self.document
    }

    /// File stem used to derive output names (`report.pdf` -> `report`).
    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }

    /// Extension used for output names, defaulting to `pdf`.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pdf".to_string())
    }
}
