//! Read-only queries against the driver: identity, input health and the
//! format/size/interval enumerations.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::{io, mem};

use log::debug;

use crate::capability::Capabilities;
use crate::device::Handle;
use crate::format::Description;
use crate::fourcc::FourCC;
use crate::fraction::Fraction;
use crate::frameinterval::{FrameInterval, FrameIntervalEnum};
use crate::framesize::{FrameSize, FrameSizeEnum};
use crate::input::Input;
use crate::v4l2::videodev::*;
use crate::v4l2::vidioc;

/// Discrete capture modes advertised by a driver.
///
/// For every pixel format, maps each discrete resolution to the discrete
/// frame intervals the driver supports at that resolution. Continuous and
/// stepwise enumerations are reported by [`frame_sizes`] / [`frame_intervals`]
/// but do not participate in this map.
pub type CapabilityMap = BTreeMap<FourCC, BTreeMap<(u32, u32), Vec<Fraction>>>;

/// Queries driver identity and capability flags (VIDIOC_QUERYCAP).
pub fn identity(handle: &Handle) -> io::Result<Capabilities> {
    unsafe {
        let mut caps: v4l2_capability = mem::zeroed();
        handle.ioctl(
            vidioc::VIDIOC_QUERYCAP,
            &mut caps as *mut _ as *mut std::os::raw::c_void,
        )?;

        Ok(Capabilities::from(caps))
    }
}

/// Returns the currently selected input (VIDIOC_G_INPUT + VIDIOC_ENUMINPUT).
pub fn current_input(handle: &Handle) -> io::Result<Input> {
    unsafe {
        let mut index: std::os::raw::c_int = 0;
        handle.ioctl(
            vidioc::VIDIOC_G_INPUT,
            &mut index as *mut _ as *mut std::os::raw::c_void,
        )?;

        let mut input: v4l2_input = mem::zeroed();
        input.index = index as u32;
        handle.ioctl(
            vidioc::VIDIOC_ENUMINPUT,
            &mut input as *mut _ as *mut std::os::raw::c_void,
        )?;

        Ok(Input::from(input))
    }
}

/// Enumerates the pixel formats of the capture queue (VIDIOC_ENUM_FMT).
pub fn formats(handle: &Handle) -> io::Result<Vec<Description>> {
    let mut formats = Vec::new();

    loop {
        unsafe {
            let mut desc: v4l2_fmtdesc = mem::zeroed();
            desc.index = formats.len() as u32;
            desc.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;

            // The driver signals the end of the enumeration with an error.
            if handle
                .ioctl(
                    vidioc::VIDIOC_ENUM_FMT,
                    &mut desc as *mut _ as *mut std::os::raw::c_void,
                )
                .is_err()
            {
                break;
            }

            formats.push(Description::from(desc));
        }
    }

    Ok(formats)
}

/// Enumerates the frame sizes of a pixel format (VIDIOC_ENUM_FRAMESIZES).
pub fn frame_sizes(handle: &Handle, fourcc: FourCC) -> io::Result<Vec<FrameSize>> {
    let mut sizes = Vec::new();

    loop {
        unsafe {
            let mut desc: v4l2_frmsizeenum = mem::zeroed();
            desc.index = sizes.len() as u32;
            desc.pixel_format = fourcc.into();

            if handle
                .ioctl(
                    vidioc::VIDIOC_ENUM_FRAMESIZES,
                    &mut desc as *mut _ as *mut std::os::raw::c_void,
                )
                .is_err()
            {
                break;
            }

            match FrameSize::try_from(desc) {
                Ok(size) => sizes.push(size),
                Err(e) => {
                    debug!("skipping frame size entry: {}", e);
                    break;
                }
            }
        }
    }

    Ok(sizes)
}

/// Enumerates the frame intervals of a (format, resolution) pair
/// (VIDIOC_ENUM_FRAMEINTERVALS).
pub fn frame_intervals(
    handle: &Handle,
    fourcc: FourCC,
    width: u32,
    height: u32,
) -> io::Result<Vec<FrameInterval>> {
    let mut intervals = Vec::new();

    loop {
        unsafe {
            let mut desc: v4l2_frmivalenum = mem::zeroed();
            desc.index = intervals.len() as u32;
            desc.pixel_format = fourcc.into();
            desc.width = width;
            desc.height = height;

            if handle
                .ioctl(
                    vidioc::VIDIOC_ENUM_FRAMEINTERVALS,
                    &mut desc as *mut _ as *mut std::os::raw::c_void,
                )
                .is_err()
            {
                break;
            }

            match FrameInterval::try_from(desc) {
                Ok(interval) => intervals.push(interval),
                Err(e) => {
                    debug!("skipping frame interval entry: {}", e);
                    break;
                }
            }
        }
    }

    Ok(intervals)
}

/// Builds the map of discrete capture modes the driver advertises.
///
/// Continuous and stepwise entries are observed and traced but do not enter
/// the map; format negotiation only consumes discrete modes.
pub fn enumerate(handle: &Handle) -> io::Result<CapabilityMap> {
    let mut map = CapabilityMap::new();

    for desc in formats(handle)? {
        let mut modes: BTreeMap<(u32, u32), Vec<Fraction>> = BTreeMap::new();

        for size in frame_sizes(handle, desc.fourcc)? {
            let discrete = match size.size {
                FrameSizeEnum::Discrete(discrete) => discrete,
                FrameSizeEnum::Stepwise(stepwise) => {
                    debug!("{}: non-discrete frame size {}", desc.fourcc, stepwise);
                    continue;
                }
            };

            let mut rates = Vec::new();
            for ival in frame_intervals(handle, desc.fourcc, discrete.width, discrete.height)? {
                match ival.interval {
                    FrameIntervalEnum::Discrete(fraction) => rates.push(fraction),
                    FrameIntervalEnum::Stepwise(stepwise) => {
                        debug!(
                            "{} {}: non-discrete frame interval {}",
                            desc.fourcc, discrete, stepwise
                        );
                    }
                }
            }

            modes.insert((discrete.width, discrete.height), rates);
        }

        map.insert(desc.fourcc, modes);
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use std::path::Path;
    use std::sync::Arc;

    fn handle() -> Handle {
        let driver = Arc::new(MockDriver::new());
        Handle::open_with(driver, Path::new("/dev/video0")).expect("open failed")
    }

    #[test]
    fn identity_reports_driver_and_card() {
        let caps = identity(&handle()).expect("query failed");
        assert_eq!(caps.driver, "mockdrv");
        assert_eq!(caps.card, "Mock Camera");
        assert!(caps.supports_video_streaming());
    }

    #[test]
    fn current_input_is_a_camera() {
        let input = current_input(&handle()).expect("query failed");
        assert_eq!(input.index, 0);
        assert!(input.is_usable_camera());
    }

    #[test]
    fn enumeration_walks_formats_sizes_and_intervals() {
        let map = enumerate(&handle()).expect("enumeration failed");

        assert_eq!(map.len(), 2);
        let modes = map
            .get(&FourCC::new(b"YUYV"))
            .expect("YUYV not enumerated");
        assert_eq!(modes.len(), 2);
        let rates = modes.get(&(640, 480)).expect("640x480 not enumerated");
        assert_eq!(rates, &vec![Fraction::new(1, 30), Fraction::new(1, 15)]);
    }
}
