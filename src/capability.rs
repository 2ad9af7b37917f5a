use bitflags::bitflags;
use std::fmt;

use crate::v4l2::videodev::{self, v4l2_capability};

bitflags! {
    /// Device capability flags as advertised by VIDIOC_QUERYCAP
    pub struct Flags: u32 {
        const VIDEO_CAPTURE     = videodev::V4L2_CAP_VIDEO_CAPTURE;
        const STREAMING         = videodev::V4L2_CAP_STREAMING;
        const DEVICE_CAPS       = videodev::V4L2_CAP_DEVICE_CAPS;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Self {
        Self::from_bits_truncate(flags)
    }
}

impl From<Flags> for u32 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
/// Device identity and capabilities
pub struct Capabilities {
    /// Driver name, e.g. uvc for usb video class devices
    pub driver: String,
    /// Card name
    pub card: String,
    /// Bus name, e.g. USB or PCI
    pub bus: String,
    /// Version number MAJOR.MINOR.PATCH
    pub version: (u8, u8, u8),

    /// Capability flags
    pub flags: Flags,
}

impl Capabilities {
    /// Whether the device can capture video frames through the streaming
    /// (buffer queue) interface.
    pub fn supports_video_streaming(&self) -> bool {
        self.flags.contains(Flags::VIDEO_CAPTURE | Flags::STREAMING)
    }
}

fn c_string(bytes: &[u8]) -> String {
    let terminated = bytes.split(|b| *b == 0).next().unwrap_or(bytes);
    String::from_utf8_lossy(terminated).into_owned()
}

impl From<v4l2_capability> for Capabilities {
    fn from(caps: v4l2_capability) -> Self {
        // device_caps describes the opened node; the capabilities field mixes
        // in the sibling nodes of the hardware. Prefer the former when the
        // driver advertises it.
        let flags = if caps.capabilities & videodev::V4L2_CAP_DEVICE_CAPS != 0 {
            caps.device_caps
        } else {
            caps.capabilities
        };

        Capabilities {
            driver: c_string(&caps.driver),
            card: c_string(&caps.card),
            bus: c_string(&caps.bus_info),
            version: (
                ((caps.version >> 16) & 0xff) as u8,
                ((caps.version >> 8) & 0xff) as u8,
                (caps.version & 0xff) as u8,
            ),
            flags: Flags::from(flags),
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Driver      : {}", self.driver)?;
        writeln!(f, "Card        : {}", self.card)?;
        writeln!(f, "Bus         : {}", self.bus)?;
        writeln!(
            f,
            "Version     : {}.{}.{}",
            self.version.0, self.version.1, self.version.2
        )?;
        writeln!(f, "Capabilities: {}", self.flags)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    fn raw_caps() -> v4l2_capability {
        let mut caps: v4l2_capability = unsafe { mem::zeroed() };
        caps.driver[..4].copy_from_slice(b"uvc\0");
        caps.card[..9].copy_from_slice(b"Test Cam\0");
        caps.bus_info[..4].copy_from_slice(b"usb\0");
        caps.version = 0x0005_0403;
        caps
    }

    #[test]
    fn device_caps_preferred_when_advertised() {
        let mut caps = raw_caps();
        caps.capabilities = videodev::V4L2_CAP_DEVICE_CAPS | videodev::V4L2_CAP_STREAMING;
        caps.device_caps = videodev::V4L2_CAP_VIDEO_CAPTURE | videodev::V4L2_CAP_STREAMING;

        let parsed = Capabilities::from(caps);
        assert!(parsed.supports_video_streaming());
    }

    #[test]
    fn streaming_alone_is_not_enough() {
        let mut caps = raw_caps();
        caps.capabilities = videodev::V4L2_CAP_STREAMING;

        let parsed = Capabilities::from(caps);
        assert!(!parsed.supports_video_streaming());
    }

    #[test]
    fn strings_stop_at_nul() {
        let parsed = Capabilities::from(raw_caps());
        assert_eq!(parsed.driver, "uvc");
        assert_eq!(parsed.card, "Test Cam");
        assert_eq!(parsed.version, (5, 4, 3));
    }
}
