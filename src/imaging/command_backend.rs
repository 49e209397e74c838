//! External resize tool backend.
//!
//! Invokes an nconvert-compatible binary:
//!
//! ```text
//! <tool> -out jpeg -resize longest <N> -o <target> <source>
//! ```
//!
//! The tool must produce a JPEG at the target path or fail. The call is
//! bounded by a hard wait timeout; a tool that overruns is killed and the
//! conversion reported as failed for that file only.

use super::backend::{BackendError, Dimensions, ImageBackend, read_dimensions};
use super::params::ResizeParams;
use log::debug;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Resize by spawning an external program.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: PathBuf,
    timeout: Duration,
}

impl CommandBackend {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the tool for one resize.
    pub fn resize_args(params: &ResizeParams) -> Vec<OsString> {
        vec![
            "-out".into(),
            "jpeg".into(),
            "-resize".into(),
            "longest".into(),
            params.long_side.to_string().into(),
            "-o".into(),
            params.output.clone().into_os_string(),
            params.source.clone().into_os_string(),
        ]
    }

    fn wait_bounded(&self, child: &mut Child) -> Result<ExitStatus, BackendError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                // The process may exit between try_wait and kill
                let _ = child.kill();
                let _ = child.wait();
                return Err(BackendError::Timeout {
                    program: self.program.clone(),
                    timeout: self.timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ImageBackend for CommandBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        read_dimensions(path)
    }

    fn resize(&self, params: &ResizeParams) -> Result<(), BackendError> {
        debug!(
            "{} → {} (long side {})",
            params.source.display(),
            params.output.display(),
            params.long_side
        );
        let mut child = Command::new(&self.program)
            .args(Self::resize_args(params))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let status = self.wait_bounded(&mut child)?;
        if !status.success() {
            return Err(BackendError::ToolFailed {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }
        if !params.output.exists() {
            return Err(BackendError::ProcessingFailed(format!(
                "{} reported success but wrote no {}",
                self.program.display(),
                params.output.display()
            )));
        }
        Ok(())
    }
}
