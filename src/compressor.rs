//! Compression orchestration.
//!
//! Runs the engine across every written part, either strictly in plan order
//! or on a bounded worker pool. Workers share exactly two pieces of state:
//! the cancellation token and a lock-protected completion counter; progress
//! events are tagged with the originating part index so concurrent jobs do
//! not interfere.

use crate::cancel::CancellationToken;
use crate::ghostscript::{EngineError, Preset, Transcoder};
use crate::progress::{Event, EventSender};
use std::path::PathBuf;
use std::sync::Mutex;

/// Worker pool bounds.
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 8;

/// One written part queued for compression.
#[derive(Debug, Clone)]
pub struct PartFile {
    /// 0-based plan index; events carry it 1-based.
    pub index: usize,
    pub path: PathBuf,
    /// Pages in this part.
    pub pages: usize,
    /// Pages written by earlier parts.
    pub page_offset: usize,
}

/// Compress every part in `parts` with `preset`.
///
/// `workers` is clamped to `[1, 8]`. With one worker parts are processed in
/// plan order and the first failure leaves later parts untouched; with more
/// workers, jobs not yet started are abandoned after the first failure while
/// running jobs unwind through the shared token. A part whose compression
/// fails keeps its uncompressed file on disk.
pub fn compress_all<E: Transcoder>(
    engine: &E,
    parts: &[PartFile],
    total_pages: usize,
    preset: Preset,
    workers: usize,
    token: &CancellationToken,
    events: &EventSender,
) -> Result<(), EngineError> {
    let workers = workers.clamp(MIN_WORKERS, MAX_WORKERS);
    let total_parts = parts.len();

    if workers == 1 {
        for part in parts {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            events.send(Event::Progress {
                current_page: part.page_offset + part.pages,
                total_pages,
                current_part: part.index + 1,
                total_parts,
                status: format!("Compressing part {}/{}...", part.index + 1, total_parts),
                bytes_written: None,
            });
            compress_one(engine, part, preset, token, events)?;
        }
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;

    let first_failure: Mutex<Option<EngineError>> = Mutex::new(None);
    let parts_done: Mutex<usize> = Mutex::new(0);
    let failure_ref = &first_failure;
    let done_ref = &parts_done;

    pool.scope(|scope| {
        for part in parts {
            let events = events.clone();
            scope.spawn(move |_| {
                // Abandon queued jobs once the operation is doomed; only
                // jobs that have not started yet get here after a failure.
                if token.is_cancelled() || failure_ref.lock().expect("lock poisoned").is_some() {
                    return;
                }

                events.send(Event::CompressionPartStart {
                    part: part.index + 1,
                });

                match compress_one(engine, part, preset, token, &events) {
                    Ok(()) => {
                        let mut done = done_ref.lock().expect("lock poisoned");
                        *done += 1;
                        events.send(Event::Progress {
                            current_page: total_pages,
                            total_pages,
                            current_part: *done,
                            total_parts,
                            status: format!(
                                "Compressing ({} of {} parts done)...",
                                *done, total_parts
                            ),
                            bytes_written: None,
                        });
                    }
                    Err(error) => {
                        let mut slot = failure_ref.lock().expect("lock poisoned");
                        if slot.is_none() {
                            *slot = Some(error);
                        }
                    }
                }
            });
        }
    });

    if token.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    match first_failure.into_inner().expect("lock poisoned") {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Compress a single part, reporting sampled temporary-output sizes tagged
/// with the part's 1-based index.
fn compress_one<E: Transcoder>(
    engine: &E,
    part: &PartFile,
    preset: Preset,
    token: &CancellationToken,
    events: &EventSender,
) -> Result<(), EngineError> {
    let input_size = std::fs::metadata(&part.path).map(|m| m.len()).unwrap_or(1);
    let estimated_output_size = ((input_size as f64 * preset.output_ratio()) as u64).max(1);

    let part_number = part.index + 1;
    let on_temp_size = move |temp_size: u64| {
        events.try_send(Event::CompressionProgress {
            part: part_number,
            temp_size,
            input_size,
            estimated_output_size,
        });
    };

    engine.transcode(&part.path, preset, token, Some(&on_temp_size))
}
