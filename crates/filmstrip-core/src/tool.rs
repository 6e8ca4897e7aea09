//! External metadata tool (exiftool) invocation.
//!
//! The pipeline talks to the tool through [`ToolRunner`] so the subprocess
//! can be replaced in tests. [`ExifTool`] spawns the real program with a
//! hard timeout at the process boundary: output is drained on reader
//! threads and the child is killed if it does not finish in time.

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, warn};

use crate::config::ToolConfig;
use crate::error::{PipelineError, Result};

/// Runs the external tool with a list of arguments and returns its stdout.
pub trait ToolRunner: Send + Sync {
    /// Run once. Non-zero exit status, timeouts and spawn failures are errors.
    fn run(&self, args: &[OsString]) -> Result<Vec<u8>>;

    /// Whether the tool can be run at all.
    fn is_available(&self) -> bool;
}

/// The real exiftool subprocess.
#[derive(Debug)]
pub struct ExifTool {
    program: PathBuf,
    timeout: Duration,
    enabled: bool,
    available: OnceLock<bool>,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            enabled: true,
            available: OnceLock::new(),
        }
    }

    pub fn from_config(config: &ToolConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(&config.program, config.timeout())
        }
    }

    /// Tool version string from `-ver`, if it runs.
    pub fn version(&self) -> Option<String> {
        let out = self.spawn(&[OsString::from("-ver")]).ok()?;
        let version = String::from_utf8_lossy(&out).trim().to_string();
        (!version.is_empty()).then_some(version)
    }

    fn spawn(&self, args: &[OsString]) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PipelineError::ExternalToolUnavailable(format!(
                        "{} not found",
                        self.program.display()
                    ))
                } else {
                    PipelineError::ExternalToolFailed(format!("spawn failed: {}", e))
                }
            })?;

        let (tx, rx) = crossbeam_channel::bounded(1);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        thread::spawn(move || {
            let mut out = Vec::new();
            // stderr is drained on its own thread so neither pipe can fill up
            let err_reader = stderr.map(|mut s| {
                thread::spawn(move || {
                    let mut buf = Vec::new();
                    let _ = s.read_to_end(&mut buf);
                    buf
                })
            });
            let read = stdout.map(|mut s| s.read_to_end(&mut out).map(|_| ()));
            let err = err_reader
                .and_then(|handle| handle.join().ok())
                .unwrap_or_default();
            let _ = tx.send((read, out, err));
        });

        match rx.recv_timeout(self.timeout) {
            Ok((read, out, err)) => {
                if let Some(Err(e)) = read {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(PipelineError::ExternalToolFailed(format!(
                        "reading output failed: {}",
                        e
                    )));
                }
                let status = child
                    .wait()
                    .map_err(|e| PipelineError::ExternalToolFailed(e.to_string()))?;
                if !status.success() {
                    return Err(PipelineError::ExternalToolFailed(format!(
                        "exit {}: {}",
                        status.code().unwrap_or(-1),
                        String::from_utf8_lossy(&err).trim()
                    )));
                }
                Ok(out)
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = child.kill();
                let _ = child.wait();
                warn!(timeout_secs = self.timeout.as_secs(), "exiftool timed out");
                Err(PipelineError::ExternalToolFailed(format!(
                    "timed out after {:?}",
                    self.timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(PipelineError::ExternalToolFailed(
                    "output reader vanished".to_string(),
                ))
            }
        }
    }
}

impl ToolRunner for ExifTool {
    fn run(&self, args: &[OsString]) -> Result<Vec<u8>> {
        if !self.is_available() {
            return Err(PipelineError::ExternalToolUnavailable(
                self.program.display().to_string(),
            ));
        }
        self.spawn(args)
    }

    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            if !self.enabled {
                return false;
            }
            let version = self.version();
            match &version {
                Some(v) => debug!(version = %v, "exiftool available"),
                None => debug!(program = %self.program.display(), "exiftool not available"),
            }
            version.is_some()
        })
    }
}

/// Arguments for binary extraction of one embedded-image tag.
pub fn binary_tag_args(tag: &str, path: &Path) -> Vec<OsString> {
    vec![
        OsString::from("-b"),
        OsString::from(format!("-{}", tag)),
        path.as_os_str().to_owned(),
    ]
}

/// Arguments for reading numeric values of single tags as JSON.
pub fn numeric_tags_args(tags: &[&str], path: &Path) -> Vec<OsString> {
    let mut args = vec![OsString::from("-json"), OsString::from("-q")];
    args.extend(tags.iter().map(|t| OsString::from(format!("-{}#", t))));
    args.push(path.as_os_str().to_owned());
    args
}

/// Path arguments are everything that does not look like an option.
pub fn path_args(args: &[OsString]) -> Vec<&OsStr> {
    args.iter()
        .map(|a| a.as_os_str())
        .filter(|a| !a.to_string_lossy().starts_with('-'))
        .collect()
}
