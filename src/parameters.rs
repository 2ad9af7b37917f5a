use bitflags::bitflags;
use std::{fmt, mem};

use crate::fraction::Fraction;
use crate::v4l2::videodev::{self, v4l2_captureparm};

bitflags! {
    pub struct Capabilities: u32 {
        const TIME_PER_FRAME    = videodev::V4L2_CAP_TIMEPERFRAME;
    }
}

impl From<u32> for Capabilities {
    fn from(caps: u32) -> Self {
        Capabilities::from_bits_truncate(caps)
    }
}

impl From<Capabilities> for u32 {
    fn from(capabilities: Capabilities) -> Self {
        capabilities.bits()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Copy, Clone)]
/// Streaming parameters (single-planar)
pub struct Parameters {
    pub capabilities: Capabilities,
    pub interval: Fraction,
}

impl Parameters {
    pub fn new(frac: Fraction) -> Self {
        Parameters {
            capabilities: Capabilities::from(0),
            interval: frac,
        }
    }

    /// Time-per-frame parameters for a target frame rate.
    ///
    /// # Example
    ///
    /// ```
    /// use vcap::Parameters;
    /// let params = Parameters::with_fps(30);
    /// ```
    pub fn with_fps(fps: u32) -> Self {
        Parameters {
            capabilities: Capabilities::from(0),
            interval: Fraction::new(1, fps),
        }
    }

    /// Effective frames per second (the reciprocal of the interval).
    pub fn fps(&self) -> u32 {
        if self.interval.numerator == 0 {
            return 0;
        }
        self.interval.denominator / self.interval.numerator
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "capabilities : {}", self.capabilities)?;
        writeln!(f, "interval     : {} [s]", self.interval)?;
        Ok(())
    }
}

impl From<v4l2_captureparm> for Parameters {
    fn from(params: v4l2_captureparm) -> Self {
        Parameters {
            capabilities: Capabilities::from(params.capability),
            interval: Fraction::from(params.timeperframe),
        }
    }
}

impl From<Parameters> for v4l2_captureparm {
    fn from(params: Parameters) -> Self {
        v4l2_captureparm {
            capability: params.capabilities.into(),
            timeperframe: params.interval.into(),
            ..unsafe { mem::zeroed() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_is_the_reciprocal() {
        assert_eq!(Parameters::with_fps(30).fps(), 30);
        assert_eq!(Parameters::new(Fraction::new(0, 30)).fps(), 0);
    }
}
