//! Ghostscript integration.
//!
//! Drives the external `gs` binary to rewrite PDFs at a quality preset
//! (compression) or at highest fidelity (repair). The child process is
//! polled rather than waited on so the cancellation token is observed
//! promptly, and the growing temporary output is sampled periodically for
//! progress reporting.
//!
//! Preset mapping (label to Ghostscript `-dPDFSETTINGS` value):
//!
//! - `low`     -> `/screen`   (72 DPI, smallest files)
//! - `medium`  -> `/ebook`    (150 DPI, good balance)
//! - `high`    -> `/printer`  (300 DPI, print-ready)
//! - `maximum` -> `/prepress` (highest quality)

use crate::cancel::CancellationToken;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often the child process is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How often the temporary output size is sampled for progress.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Engine error types
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Ghostscript (gs) is not installed or not on PATH")]
    Unavailable,

    #[error("Ghostscript exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Quality/size tradeoff passed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Low,
    Medium,
    High,
    Maximum,
}

impl Preset {
    /// All presets, in increasing output-size order.
    pub const ALL: [Preset; 4] = [Preset::Low, Preset::Medium, Preset::High, Preset::Maximum];

    /// Ghostscript `-dPDFSETTINGS` value.
    pub fn gs_setting(self) -> &'static str {
        match self {
            Preset::Low => "/screen",
            Preset::Medium => "/ebook",
            Preset::High => "/printer",
            Preset::Maximum => "/prepress",
        }
    }

    /// Typical output/input size ratio, used for progress estimation only.
    pub fn output_ratio(self) -> f64 {
        match self {
            Preset::Low => 0.25,
            Preset::Medium => 0.4,
            Preset::High => 0.6,
            Preset::Maximum => 0.9,
        }
    }

    /// Label shown in UIs and accepted by [`Preset::from_str`].
    pub fn label(self) -> &'static str {
        match self {
            Preset::Low => "low",
            Preset::Medium => "medium",
            Preset::High => "high",
            Preset::Maximum => "maximum",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Unknown preset label. Raised before any process is launched.
#[derive(Debug, Error)]
#[error("unknown preset '{0}' (choose from: low, medium, high, maximum)")]
pub struct UnknownPreset(pub String);

impl FromStr for Preset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Preset::Low),
            "medium" => Ok(Preset::Medium),
            "high" => Ok(Preset::High),
            "maximum" => Ok(Preset::Maximum),
            other => Err(UnknownPreset(other.to_string())),
        }
    }
}

/// External transcoding capability.
///
/// The orchestrator and opener work against this seam so tests can stand in
/// a fake engine without a Ghostscript install.
pub trait Transcoder: Sync {
    /// Rewrite `input` in place at the given preset. `on_temp_size` receives
    /// periodic samples of the growing temporary output's size.
    fn transcode(
        &self,
        input: &Path,
        preset: Preset,
        token: &CancellationToken,
        on_temp_size: Option<&(dyn Fn(u64) + Sync)>,
    ) -> Result<()>;

    /// Rewrite `input` to `output` at highest fidelity, leaving `input`
    /// untouched. Used for the repair fallback.
    fn rewrite(&self, input: &Path, output: &Path, token: &CancellationToken) -> Result<()>;
}

/// Removes a file on drop unless disarmed. Keeps temporary engine outputs
/// from leaking on any exit path.
struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Ghostscript-backed [`Transcoder`].
pub struct Ghostscript {
    program: PathBuf,
}

impl Ghostscript {
    /// Locate `gs` on PATH. Returns `None` when it is not installed.
    pub fn locate() -> Option<Self> {
        which::which("gs").ok().map(|program| Self { program })
    }

    /// Whether Ghostscript is available on this host.
    pub fn available() -> bool {
        which::which("gs").is_ok()
    }

    /// Use a specific binary (tests, unusual installs).
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, output: &Path, setting: &str, input: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-o")
            .arg(output)
            .arg("-sDEVICE=pdfwrite")
            .arg("-dCompatibilityLevel=1.4")
            .arg(format!("-dPDFSETTINGS={}", setting))
            .arg("-dNOPAUSE")
            .arg("-dBATCH")
            .arg("-dSAFER")
            .arg(input)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    /// Poll the child until it exits, sampling `temp` and observing `token`.
    /// The child never outlives this call: any error path kills and reaps it.
    fn supervise(
        &self,
        mut child: Child,
        temp: &Path,
        token: &CancellationToken,
        on_temp_size: Option<&(dyn Fn(u64) + Sync)>,
    ) -> Result<()> {
        let result = Self::poll_until_exit(&mut child, temp, token, on_temp_size);
        if result.is_err() && matches!(child.try_wait(), Ok(None)) {
            let _ = child.kill();
            let _ = child.wait();
        }
        result
    }

    fn poll_until_exit(
        child: &mut Child,
        temp: &Path,
        token: &CancellationToken,
        on_temp_size: Option<&(dyn Fn(u64) + Sync)>,
    ) -> Result<()> {
        let mut last_sample = Instant::now();

        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None => std::thread::sleep(POLL_INTERVAL),
            }

            if let Some(callback) = on_temp_size {
                if last_sample.elapsed() >= SAMPLE_INTERVAL {
                    last_sample = Instant::now();
                    if let Ok(meta) = std::fs::metadata(temp) {
                        callback(meta.len());
                    }
                }
            }

            if token.is_cancelled() {
                // Child must be gone before the temp file is removed.
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Cancelled);
            }
        };

        if !status.success() {
            let stderr = child
                .stderr
                .take()
                .and_then(|mut err| {
                    use std::io::Read;
                    let mut buf = String::new();
                    err.read_to_string(&mut buf).ok().map(|_| buf)
                })
                .unwrap_or_default();
            return Err(EngineError::Failed {
                status: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

impl Transcoder for Ghostscript {
    fn transcode(
        &self,
        input: &Path,
        preset: Preset,
        token: &CancellationToken,
        on_temp_size: Option<&(dyn Fn(u64) + Sync)>,
    ) -> Result<()> {
        let temp = PathBuf::from(format!("{}.tmp_gs.pdf", input.display()));
        let mut guard = TempGuard::new(temp.clone());

        let child = self.command(&temp, preset.gs_setting(), input).spawn()?;
        self.supervise(child, &temp, token, on_temp_size)?;

        std::fs::rename(&temp, input)?;
        guard.disarm();
        Ok(())
    }

    fn rewrite(&self, input: &Path, output: &Path, token: &CancellationToken) -> Result<()> {
        let mut guard = TempGuard::new(output.to_path_buf());

        let child = self
            .command(output, Preset::Maximum.gs_setting(), input)
            .spawn()?;
        self.supervise(child, output, token, None)?;

        guard.disarm();
        Ok(())
    }
}
