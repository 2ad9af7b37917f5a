use std::convert::TryFrom;
use std::fmt;

use crate::fourcc::FourCC;
use crate::fraction::Fraction;
use crate::v4l2::videodev::{self, v4l2_frmivalenum};

#[derive(Debug)]
/// Frame interval description as returned by VIDIOC_ENUM_FRAMEINTERVALS
pub struct FrameInterval {
    pub index: u32,
    pub fourcc: FourCC,
    pub width: u32,
    pub height: u32,
    pub interval: FrameIntervalEnum,
}

impl fmt::Display for FrameInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.interval.fmt(f)
    }
}

#[derive(Debug)]
pub enum FrameIntervalEnum {
    Discrete(Fraction),
    Stepwise(Stepwise),
}

impl fmt::Display for FrameIntervalEnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameIntervalEnum::Discrete(val) => write!(f, "Discrete({})", val)?,
            FrameIntervalEnum::Stepwise(val) => write!(f, "Stepwise({})", val)?,
        }

        Ok(())
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Stepwise {
    /// Minimum frame interval (in seconds).
    pub min: Fraction,
    /// Maximum frame interval (in seconds).
    pub max: Fraction,
    /// Frame interval step size (in seconds).
    pub step: Fraction,
}

impl fmt::Display for Stepwise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} with step {}", self.min, self.max, self.step)?;
        Ok(())
    }
}

impl TryFrom<v4l2_frmivalenum> for FrameIntervalEnum {
    type Error = String;

    fn try_from(desc: v4l2_frmivalenum) -> Result<Self, Self::Error> {
        unsafe {
            // Unsafe because of the access to the interval union
            match desc.type_ {
                videodev::V4L2_FRMIVAL_TYPE_DISCRETE => Ok(FrameIntervalEnum::Discrete(
                    Fraction::from(desc.interval.discrete),
                )),
                videodev::V4L2_FRMIVAL_TYPE_STEPWISE | videodev::V4L2_FRMIVAL_TYPE_CONTINUOUS => {
                    Ok(FrameIntervalEnum::Stepwise(Stepwise {
                        min: Fraction::from(desc.interval.stepwise.min),
                        max: Fraction::from(desc.interval.stepwise.max),
                        step: Fraction::from(desc.interval.stepwise.step),
                    }))
                }
                typ => Err(format!("Unknown frame interval type: {}", typ)),
            }
        }
    }
}

impl TryFrom<v4l2_frmivalenum> for FrameInterval {
    type Error = String;

    fn try_from(desc: v4l2_frmivalenum) -> Result<Self, Self::Error> {
        Ok(FrameInterval {
            index: desc.index,
            fourcc: FourCC::from(desc.pixel_format),
            width: desc.width,
            height: desc.height,
            interval: FrameIntervalEnum::try_from(desc)?,
        })
    }
}
