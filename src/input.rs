use bitflags::bitflags;
use std::fmt;

use crate::v4l2::videodev::{self, v4l2_input};

/// Video input type as reported by VIDIOC_ENUMINPUT
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InputType {
    Tuner,
    Camera,
    Touch,
    Unknown(u32),
}

impl From<u32> for InputType {
    fn from(typ: u32) -> Self {
        match typ {
            videodev::V4L2_INPUT_TYPE_TUNER => InputType::Tuner,
            videodev::V4L2_INPUT_TYPE_CAMERA => InputType::Camera,
            videodev::V4L2_INPUT_TYPE_TOUCH => InputType::Touch,
            other => InputType::Unknown(other),
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputType::Tuner => write!(f, "tuner"),
            InputType::Camera => write!(f, "camera"),
            InputType::Touch => write!(f, "touch"),
            InputType::Unknown(typ) => write!(f, "unknown ({})", typ),
        }
    }
}

bitflags! {
    /// Input health status flags
    pub struct InputStatus: u32 {
        const NO_POWER      = videodev::V4L2_IN_ST_NO_POWER;
        const NO_SIGNAL     = videodev::V4L2_IN_ST_NO_SIGNAL;
        const NO_COLOR      = videodev::V4L2_IN_ST_NO_COLOR;
    }
}

impl From<u32> for InputStatus {
    fn from(status: u32) -> Self {
        Self::from_bits_truncate(status)
    }
}

impl fmt::Display for InputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
/// A video input line of the device
pub struct Input {
    pub index: u32,
    pub name: String,
    pub typ: InputType,
    pub status: InputStatus,
}

impl Input {
    /// Whether this input is a camera with power and signal present.
    pub fn is_usable_camera(&self) -> bool {
        self.typ == InputType::Camera
            && !self
                .status
                .intersects(InputStatus::NO_POWER | InputStatus::NO_SIGNAL)
    }
}

impl From<v4l2_input> for Input {
    fn from(input: v4l2_input) -> Self {
        let name = input
            .name
            .split(|b| *b == 0)
            .next()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();

        Input {
            index: input.index,
            name,
            typ: InputType::from(input.type_),
            status: InputStatus::from(input.status),
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.typ, self.status)
    }
}
