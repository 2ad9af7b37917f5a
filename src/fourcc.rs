use std::{fmt, str};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Four character code representing a pixelformat
pub struct FourCC {
    repr: [u8; 4],
}

impl FourCC {
    /// Returns a pixelformat as four character code
    ///
    /// # Arguments
    ///
    /// * `repr` - Four characters as raw bytes
    ///
    /// # Example
    ///
    /// ```
    /// use vcap::FourCC;
    /// let fourcc = FourCC::new(b"YUYV");
    /// ```
    pub const fn new(repr: &[u8; 4]) -> FourCC {
        FourCC { repr: *repr }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(string) = str::from_utf8(&self.repr) {
            write!(f, "{}", string)?;
        }
        Ok(())
    }
}

impl From<u32> for FourCC {
    fn from(code: u32) -> Self {
        FourCC::new(&code.to_le_bytes())
    }
}

impl From<FourCC> for u32 {
    fn from(fourcc: FourCC) -> Self {
        u32::from_le_bytes(fourcc.repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let fourcc = FourCC::new(b"MJPG");
        let code: u32 = fourcc.into();
        assert_eq!(FourCC::from(code), fourcc);
    }

    #[test]
    fn wire_encoding_is_little_endian() {
        // 'YUYV' as the kernel reports it
        assert_eq!(u32::from(FourCC::new(b"YUYV")), 0x5659_5559);
    }

    #[test]
    fn display() {
        assert_eq!(FourCC::new(b"YUYV").to_string(), "YUYV");
    }
}
