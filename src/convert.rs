//! External ebook conversion.

mod cache;

pub use cache::{Artifact, ConversionCache, ConversionKey};

use crate::error::{AppError, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Trait for converters turning one ebook file into another format.
///
/// The output format is implied by the destination's extension. Calls may
/// be slow and block the calling thread.
pub trait Converter: Send + Sync {
    /// Convert `source` into `destination`.
    fn convert(&self, source: &Path, destination: &Path) -> Result<()>;

    /// Like [`convert`](Self::convert), but may give up once `cancel` fires.
    /// The default cannot stop early and ignores the token.
    fn convert_cancellable(
        &self,
        source: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _ = cancel;
        self.convert(source, destination)
    }
}

/// Number of stderr bytes kept for the log when a conversion fails.
const STDERR_TAIL: usize = 2048;

/// Converter backed by an external program such as Calibre's `ebook-convert`.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl CommandConverter {
    /// Locate `program` on `PATH`. When it cannot be found the bare name is
    /// kept and conversions fail at spawn time.
    pub fn new(program: &str, timeout_seconds: u64) -> Self {
        let program = match which::which(program) {
            Ok(path) => {
                tracing::info!(converter = %path.display(), "Found converter");
                path
            }
            Err(e) => {
                tracing::warn!(
                    converter = program,
                    error = %e,
                    "Converter not found in PATH; conversions will fail"
                );
                PathBuf::from(program)
            }
        };

        let timeout = (timeout_seconds > 0).then(|| Duration::from_secs(timeout_seconds));
        Self { program, timeout }
    }

    /// Resolved program path.
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Converter for CommandConverter {
    fn convert(&self, source: &Path, destination: &Path) -> Result<()> {
        self.convert_cancellable(source, destination, &CancellationToken::new())
    }

    fn convert_cancellable(
        &self,
        source: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut child = Command::new(&self.program)
            .arg(source)
            .arg(destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AppError::Conversion(format!("Failed to run {}: {}", self.program.display(), e))
            })?;

        // Drain stderr on its own thread so a chatty converter cannot fill the pipe.
        let stderr = child.stderr.take();
        let reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf);
            }
            buf
        });

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AppError::Conversion("Converter cancelled".to_string()));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AppError::Conversion(format!(
                    "Converter timed out after {:?}",
                    self.timeout.unwrap_or_default()
                )));
            }
            std::thread::sleep(Duration::from_millis(100));
        };

        let stderr = reader.join().unwrap_or_default();
        if !status.success() {
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL);
            tracing::warn!(
                source = %source.display(),
                status = %status,
                stderr = %String::from_utf8_lossy(&stderr[tail_start..]),
                "Converter failed"
            );
            return Err(AppError::Conversion(format!("Converter exited with {}", status)));
        }

        Ok(())
    }
}
