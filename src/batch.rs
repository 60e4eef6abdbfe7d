//! Multi-document batch driver.
//!
//! Processes documents sequentially with one shared cancellation token and
//! one event channel. A document that fails is reported and skipped; the
//! batch presses on. Cancellation stops the batch without an error event,
//! and exactly one summary event fires at the end either way.

use crate::cancel::CancellationToken;
use crate::config::SplitConfig;
use crate::ghostscript::Transcoder;
use crate::progress::{Event, EventChannel, EventSender, ProgressReporter, ProgressSink};
use crate::splitter::Splitter;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Outcome of a batch run; mirrors the final [`Event::AllComplete`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Documents fully processed.
    pub completed: usize,
    /// Documents attempted (including failures and the cancelled one).
    pub total: usize,
    /// Part files produced across all completed documents.
    pub total_parts: usize,
    pub elapsed_seconds: f64,
    pub cancelled: bool,
}

/// Drives the split pipeline across a list of documents.
pub struct BatchRunner<'e, E: Transcoder> {
    config: SplitConfig,
    engine: Option<&'e E>,
}

impl<'e, E: Transcoder> BatchRunner<'e, E> {
    pub fn new(config: SplitConfig, engine: Option<&'e E>) -> Self {
        Self { config, engine }
    }

    /// Process every file, delivering throttled events to `sink`. Blocks
    /// until the batch (and the event channel) is done; callers wanting a
    /// responsive UI run this on a worker thread and keep a clone of the
    /// token.
    pub fn run(
        &self,
        files: &[PathBuf],
        token: &CancellationToken,
        sink: Box<dyn ProgressSink>,
    ) -> BatchSummary {
        let (events, channel) = EventChannel::spawn(ProgressReporter::new(sink));
        let summary = self.run_with_events(files, token, &events);
        events.send(Event::AllComplete {
            completed: summary.completed,
            total: summary.total,
            total_parts: summary.total_parts,
            elapsed_seconds: summary.elapsed_seconds,
            cancelled: summary.cancelled,
        });
        drop(events);
        channel.join();
        summary
    }

    /// Same as [`BatchRunner::run`] against an existing event channel. Does
    /// not emit the summary event; `run` layers that on.
    pub fn run_with_events(
        &self,
        files: &[PathBuf],
        token: &CancellationToken,
        events: &EventSender,
    ) -> BatchSummary {
        let started = Instant::now();
        let mut completed = 0usize;
        let mut total_parts = 0usize;

        if let Err(error) = std::fs::create_dir_all(&self.config.output_folder) {
            events.send(Event::Error {
                message: format!(
                    "Cannot create output folder {}: {}",
                    self.config.output_folder.display(),
                    error
                ),
            });
            return BatchSummary {
                completed: 0,
                total: files.len(),
                total_parts: 0,
                elapsed_seconds: round_elapsed(started),
                cancelled: token.is_cancelled(),
            };
        }

        let splitter = Splitter::new(self.engine, self.config.split_options());
        let strategy = self.config.strategy();

        for file in files {
            if token.is_cancelled() {
                break;
            }

            let filename = display_name(file);

            // New document: the throttle window reopens so its first event
            // is never dropped.
            events.reset_throttle();
            events.send(Event::Progress {
                current_page: 0,
                total_pages: 1,
                current_part: 0,
                total_parts: 1,
                status: format!("Starting {}...", filename),
                bytes_written: None,
            });

            match splitter.split(file, strategy, &self.config.output_folder, token, events) {
                Ok(outputs) => {
                    completed += 1;
                    total_parts += outputs.len();
                    events.send(Event::PartComplete {
                        filename,
                        outputs: outputs.iter().map(|p| display_name(p)).collect(),
                    });
                }
                Err(error) if error.is_cancelled() => break,
                Err(error) => {
                    events.send(Event::Error {
                        message: format!("Error processing {}: {}", filename, error),
                    });
                }
            }
        }

        BatchSummary {
            completed,
            total: files.len(),
            total_parts,
            elapsed_seconds: round_elapsed(started),
            cancelled: token.is_cancelled(),
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn round_elapsed(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitMode;
    use crate::ghostscript::Ghostscript;
    use crate::test_pdf::write_test_pdf;
    use std::sync::{Arc, Mutex};

    struct CollectingSink(Arc<Mutex<Vec<Event>>>);

    impl ProgressSink for CollectingSink {
        fn emit(&mut self, event: Event) {
            self.0.lock().expect("lock poisoned").push(event);
        }
    }

    fn collector() -> (Arc<Mutex<Vec<Event>>>, Box<dyn ProgressSink>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (events.clone(), Box::new(CollectingSink(events)))
    }

    fn config_for(dir: &Path) -> SplitConfig {
        SplitConfig {
            split_mode: SplitMode::Parts,
            split_value: 2,
            output_folder: dir.join("out"),
            ..Default::default()
        }
    }

    #[test]
    fn test_batch_processes_all_documents() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        write_test_pdf(&a, 4);
        write_test_pdf(&b, 6);

        let runner =
            BatchRunner::<Ghostscript>::new(config_for(dir.path()), None);
        let (collected, sink) = collector();
        let summary = runner.run(&[a, b], &CancellationToken::new(), sink);

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.total_parts, 4);
        assert!(!summary.cancelled);

        let delivered = collected.lock().unwrap();
        let completes = delivered
            .iter()
            .filter(|e| matches!(e, Event::PartComplete { .. }))
            .count();
        assert_eq!(completes, 2);
        let summaries: Vec<_> = delivered
            .iter()
            .filter(|e| matches!(e, Event::AllComplete { .. }))
            .collect();
        assert_eq!(summaries.len(), 1);
        assert_eq!(
            summaries[0],
            &Event::AllComplete {
                completed: 2,
                total: 2,
                total_parts: 4,
                elapsed_seconds: summary.elapsed_seconds,
                cancelled: false,
            }
        );
    }

    #[test]
    fn test_failed_document_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.pdf");
        let good = dir.path().join("good.pdf");
        std::fs::write(&bad, b"not a pdf").unwrap();
        write_test_pdf(&good, 4);

        let runner =
            BatchRunner::<Ghostscript>::new(config_for(dir.path()), None);
        let (collected, sink) = collector();
        let summary = runner.run(&[bad, good], &CancellationToken::new(), sink);

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.total, 2);

        let delivered = collected.lock().unwrap();
        let errors: Vec<String> = delivered
            .iter()
            .filter_map(|e| match e {
                Event::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("bad.pdf"));
    }

    #[test]
    fn test_invalid_parameters_fail_only_their_document() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.pdf");
        let large = dir.path().join("large.pdf");
        write_test_pdf(&small, 2); // fewer pages than requested parts
        write_test_pdf(&large, 8);

        let config = SplitConfig {
            split_value: 4,
            ..config_for(dir.path())
        };
        let runner = BatchRunner::<Ghostscript>::new(config, None);
        let (collected, sink) = collector();
        let summary = runner.run(&[small, large], &CancellationToken::new(), sink);

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.total_parts, 4);
        let delivered = collected.lock().unwrap();
        assert!(delivered
            .iter()
            .any(|e| matches!(e, Event::Error { message } if message.contains("small.pdf"))));
    }

    #[test]
    fn test_cancelled_batch_reports_no_error_event() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        write_test_pdf(&a, 4);

        let token = CancellationToken::new();
        token.cancel();

        let runner =
            BatchRunner::<Ghostscript>::new(config_for(dir.path()), None);
        let (collected, sink) = collector();
        let summary = runner.run(&[a], &token, sink);

        assert!(summary.cancelled);
        assert_eq!(summary.completed, 0);

        let delivered = collected.lock().unwrap();
        assert!(!delivered.iter().any(|e| matches!(e, Event::Error { .. })));
        assert!(matches!(
            delivered.last(),
            Some(Event::AllComplete {
                cancelled: true,
                ..
            })
        ));
    }

    #[test]
    fn test_summary_event_fires_exactly_once_even_on_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let runner =
            BatchRunner::<Ghostscript>::new(config_for(dir.path()), None);
        let (collected, sink) = collector();
        let summary = runner.run(&[], &CancellationToken::new(), sink);

        assert_eq!(summary.total, 0);
        let delivered = collected.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(matches!(delivered[0], Event::AllComplete { .. }));
    }
}
