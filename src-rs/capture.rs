//! Viewport capture. Only the background context holds a [`ViewportSource`]; the page side
//! never reads pixels itself.

use crate::error::CaptureError;
use crate::process::decode_png;
use crate::record::WindowId;
use image::RgbaImage;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

pub trait ViewportSource: Send + Sync {
    /// Pixels currently visible in `window`.
    fn capture_viewport(&self, window: WindowId) -> Result<RgbaImage, CaptureError>;
}

/// Serves a PNG from disk as the visible viewport of every window.
#[derive(Debug, Clone)]
pub struct FileViewportSource {
    path: PathBuf,
}

impl FileViewportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ViewportSource for FileViewportSource {
    fn capture_viewport(&self, _window: WindowId) -> Result<RgbaImage, CaptureError> {
        read_png(&self.path)
    }
}

/// Full-screen capture through macOS `screencapture`.
#[derive(Debug, Clone)]
pub struct ScreenViewportSource {
    timeout: Duration,
    scratch_dir: PathBuf,
}

impl ScreenViewportSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl ViewportSource for ScreenViewportSource {
    fn capture_viewport(&self, window: WindowId) -> Result<RgbaImage, CaptureError> {
        if !cfg!(target_os = "macos") || !command_exists("screencapture") {
            return Err(CaptureError::Unsupported);
        }

        let suffix = rand::thread_rng().gen_range(1000..9999);
        let out_path = self.scratch_dir.join(format!(
            "element-capture-{}-{}-{suffix}.png",
            window.0,
            std::process::id()
        ));

        let mut child = Command::new("screencapture")
            .arg("-x")
            .arg(&out_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| CaptureError::Denied(format!("screencapture spawn failed: {err}")))?;

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::Timeout(timeout_millis(self.timeout)));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::Denied(err.to_string()));
            }
        };

        if !status.success() {
            let code = status.code().unwrap_or(1);
            let _ = fs::remove_file(&out_path);
            return Err(CaptureError::Denied(format!(
                "screencapture exited with status {code}; check Screen Recording permission"
            )));
        }

        let result = read_png(&out_path);
        let _ = fs::remove_file(&out_path);
        result
    }
}

fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

fn read_png(path: &Path) -> Result<RgbaImage, CaptureError> {
    let bytes = fs::read(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => CaptureError::NoData,
        _ => CaptureError::Denied(format!("{}: {err}", path.display())),
    })?;
    if bytes.is_empty() {
        return Err(CaptureError::NoData);
    }
    let image = decode_png(&bytes)
        .map_err(|err| CaptureError::Denied(format!("unreadable capture {}: {err}", path.display())))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(CaptureError::NoData);
    }
    Ok(image)
}

fn command_exists(name: &str) -> bool {
    Command::new("bash")
        .arg("-lc")
        .arg(format!("command -v {name} >/dev/null 2>&1"))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
