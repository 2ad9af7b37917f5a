use thiserror::Error;

use crate::format::Format;

/// Errors surfaced by the capture engine.
///
/// Only structural failures appear here. Transient streaming conditions
/// (timeouts, `EAGAIN`, `EIO`, corrupted buffers) are absorbed by
/// [`Capture::read`](crate::Capture::read) returning `None`.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The supplied path does not refer to a character device node.
    #[error("not a character device")]
    NotACharacterDevice,

    /// Opening the device node failed; payload is the OS errno.
    #[error("failed to open device (errno {0})")]
    OpenFailed(i32),

    /// The driver lacks video capture or streaming support, or the active
    /// input is not a healthy camera.
    #[error("device does not support video capture streaming")]
    UnsupportedCapabilities,

    /// The driver altered the requested pixel format, width or height.
    #[error("format not supported: requested {requested}, driver offers {actual}")]
    FormatNotSupported { requested: Format, actual: Format },

    /// The driver granted fewer than two buffers.
    #[error("driver granted only {0} buffers")]
    InsufficientBuffers(u32),

    /// Querying or memory-mapping a buffer failed.
    #[error("failed to map buffer {index} (errno {errno})")]
    BufferMapFailed { index: u32, errno: i32 },

    /// The STREAMON ioctl failed.
    #[error("failed to start streaming (errno {0})")]
    StreamStartFailed(i32),

    /// The STREAMOFF ioctl failed. The ring is released regardless.
    #[error("failed to stop streaming (errno {0})")]
    StreamStopFailed(i32),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

pub(crate) fn errno(err: &std::io::Error) -> i32 {
    err.raw_os_error().unwrap_or(0)
}
