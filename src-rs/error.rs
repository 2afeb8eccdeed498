//! Error taxonomy for the capture pipeline.
//!
//! Capture and processing failures only ever cost the record of the click that caused
//! them. Storage and export failures end the single operation that raised them.

use thiserror::Error;

/// The viewport could not be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture denied: {0}")]
    Denied(String),

    #[error("capture returned no data")]
    NoData,

    #[error("capture timed out after {0}ms")]
    Timeout(u64),

    #[error("viewport capture is not supported on this platform")]
    Unsupported,
}

/// Crop parameters could not be mapped onto the bitmap.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    #[error("bitmap is empty")]
    EmptyBitmap,

    #[error("invalid device pixel ratio: {0}")]
    InvalidScale(f64),

    #[error("element has zero area after scaling ({w}x{h})")]
    ZeroArea { w: i64, h: i64 },

    #[error("element lies outside the captured viewport")]
    OutOfBounds,

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage contents are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record id already present: {0}")]
    DuplicateId(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("nothing to export")]
    NothingToExport,

    #[error("record {id} has an unreadable image: {reason}")]
    BadImage { id: String, reason: String },

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive generation failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single click produced no record, or why a routed request failed.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("background context is not running")]
    Disconnected,
}
