pub mod v4l2;

mod driver;
mod ring;

#[cfg(test)]
pub(crate) mod mock;

pub mod capability;
pub use capability::Capabilities;

pub mod capture;
pub use capture::{Capture, CaptureState};

pub mod config;
pub use config::{CaptureConfig, Param, MAX_BUFFER_COUNT, MIN_BUFFER_COUNT};

pub mod device;
pub use device::Handle;

pub mod error;
pub use error::{CaptureError, Result};

pub mod format;
pub use format::{Description, Format};

pub mod fourcc;
pub use fourcc::FourCC;

pub mod fraction;
pub use fraction::Fraction;

pub mod frame;
pub use frame::Frame;

pub mod frameinterval;
pub use frameinterval::{FrameInterval, FrameIntervalEnum};

pub mod framesize;
pub use framesize::{FrameSize, FrameSizeEnum};

pub mod input;
pub use input::{Input, InputStatus, InputType};

pub mod parameters;
pub use parameters::Parameters;

pub mod probe;
pub use probe::CapabilityMap;

pub mod timestamp;
pub use timestamp::Timestamp;
