use std::{fmt, mem};

use crate::fourcc::FourCC;
use crate::v4l2::videodev::{self, v4l2_fmtdesc, v4l2_pix_format};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Streaming format (single-planar)
pub struct Format {
    /// width in pixels
    pub width: u32,
    /// height in pixels
    pub height: u32,
    /// pixelformat code
    pub fourcc: FourCC,

    /// bytes per line
    pub stride: u32,
    /// maximum number of bytes required to store an image
    pub size: u32,
}

impl Format {
    /// Returns a capture format
    ///
    /// Stride and size are driver-assigned; they are zero until the format
    /// has been negotiated with a device.
    ///
    /// # Arguments
    ///
    /// * `width` - Width in pixels
    /// * `height` - Height in pixels
    /// * `fourcc` - Four character code (pixelformat)
    ///
    /// # Example
    ///
    /// ```
    /// use vcap::{Format, FourCC};
    /// let fmt = Format::new(640, 480, FourCC::new(b"YUYV"));
    /// ```
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Format {
            width,
            height,
            fourcc,
            stride: 0,
            size: 0,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.fourcc)
    }
}

impl From<v4l2_pix_format> for Format {
    fn from(fmt: v4l2_pix_format) -> Self {
        Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.pixelformat),
            stride: fmt.bytesperline,
            size: fmt.sizeimage,
        }
    }
}

impl From<Format> for v4l2_pix_format {
    fn from(format: Format) -> Self {
        v4l2_pix_format {
            width: format.width,
            height: format.height,
            pixelformat: format.fourcc.into(),
            // interlaced or progressive, whatever the driver prefers
            field: videodev::V4L2_FIELD_ANY,
            bytesperline: format.stride,
            sizeimage: format.size,
            ..unsafe { mem::zeroed() }
        }
    }
}

#[derive(Debug, Clone)]
/// Format description as returned by VIDIOC_ENUM_FMT
pub struct Description {
    pub index: u32,
    pub flags: u32,
    pub description: String,
    pub fourcc: FourCC,
}

impl From<v4l2_fmtdesc> for Description {
    fn from(desc: v4l2_fmtdesc) -> Self {
        let description = desc
            .description
            .split(|b| *b == 0)
            .next()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();

        Description {
            index: desc.index,
            flags: desc.flags,
            description,
            fourcc: FourCC::from(desc.pixelformat),
        }
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.fourcc, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pix_format_roundtrip_keeps_the_triple() {
        let fmt = Format::new(1280, 720, FourCC::new(b"MJPG"));
        let raw: v4l2_pix_format = fmt.into();
        assert_eq!(raw.field, videodev::V4L2_FIELD_ANY);
        assert_eq!(Format::from(raw), fmt);
    }

    #[test]
    fn display_is_compact() {
        let fmt = Format::new(640, 480, FourCC::new(b"YUYV"));
        assert_eq!(fmt.to_string(), "640x480 YUYV");
    }
}
