/// A single captured image.
///
/// The payload is copied out of the kernel buffer before the buffer is
/// requeued, so a frame stays valid for as long as the caller keeps it,
/// independent of the capture session.
#[derive(Debug, Clone)]
pub struct Frame {
    bytes: Vec<u8>,
    sequence: u32,
    timestamp_ns: u64,
}

impl Frame {
    pub(crate) fn new(bytes: Vec<u8>, sequence: u32, timestamp_ns: u64) -> Self {
        Frame {
            bytes,
            sequence,
            timestamp_ns,
        }
    }

    /// Image payload in the negotiated pixel format, `sizeimage` bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Driver frame counter. Gaps indicate frames dropped by the driver.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Capture instant in nanoseconds since the monotonic clock origin.
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// Consumes the frame, returning the payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
