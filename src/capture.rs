use std::mem;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::capability::Capabilities;
use crate::config::{CaptureConfig, Param};
use crate::device::Handle;
use crate::driver::{Driver, V4l2Driver};
use crate::error::{errno, CaptureError, Result};
use crate::format::Format;
use crate::frame::Frame;
use crate::parameters::{self, Parameters};
use crate::probe;
use crate::ring::Ring;
use crate::timestamp::Timestamp;
use crate::v4l2::videodev::*;
use crate::v4l2::vidioc;

/// Lifecycle state of a capture session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CaptureState {
    /// No descriptor held.
    Closed,
    /// Valid descriptor; nothing negotiated yet.
    Opened,
    /// Negotiated format committed; ring not mapped.
    Configured,
    /// Ring mapped and fully enqueued; driver streaming.
    Streaming,
    /// Streaming ended; ring released.
    Stopped,
}

/// A pull-mode video capture session on one V4L2 device.
///
/// The session owns the device descriptor, the negotiated format and the
/// memory-mapped buffer ring, and drives the driver through the
/// `Opened -> Streaming -> Stopped` lifecycle. Frames are pulled one at a
/// time with [`read`]; each delivered frame is a copy, so it outlives the
/// session.
///
/// All operations run on the caller's thread; the only blocking point is the
/// readiness wait inside [`read`], bounded by the configured timeout.
///
/// # Example
///
/// ```no_run
/// use vcap::{Capture, CaptureConfig};
///
/// let mut capture = Capture::new("/dev/video0", CaptureConfig::default())?;
/// capture.start()?;
/// while let Some(frame) = capture.read() {
///     println!("frame {}: {} bytes", frame.sequence(), frame.bytes().len());
/// }
/// capture.stop()?;
/// # Ok::<(), vcap::CaptureError>(())
/// ```
///
/// [`read`]: Capture::read
pub struct Capture {
    handle: Arc<Handle>,
    ring: Ring,
    config: CaptureConfig,
    caps: Option<Capabilities>,
    format: Option<Format>,
    state: CaptureState,
}

impl Capture {
    /// Opens the device node and validates it, leaving the session in the
    /// `Opened` state.
    ///
    /// Out-of-range configuration values are replaced by their defaults with
    /// a warning.
    ///
    /// # Arguments
    ///
    /// * `path` - Device node path, usually `/dev/videoN`
    /// * `config` - Capture parameters
    pub fn new<P: AsRef<Path>>(path: P, config: CaptureConfig) -> Result<Self> {
        Self::with_driver(Arc::new(V4l2Driver), path.as_ref(), config)
    }

    pub(crate) fn with_driver(
        driver: Arc<dyn Driver>,
        path: &Path,
        config: CaptureConfig,
    ) -> Result<Self> {
        let handle = Arc::new(Handle::open_with(driver, path)?);
        let ring = Ring::new(handle.clone());

        // QUERYCAP is immutable per session; cache it at open. A failure
        // here is not fatal to construction, the first start retries.
        let caps = match probe::identity(&handle) {
            Ok(caps) => {
                debug!("{} ({}) on {}", caps.card, caps.driver, caps.bus);
                Some(caps)
            }
            Err(e) => {
                warn!("cannot query device capabilities: {}", e);
                None
            }
        };

        Ok(Capture {
            handle,
            ring,
            config: Self::sanitized(config),
            caps,
            format: None,
            state: CaptureState::Opened,
        })
    }

    fn sanitized(config: CaptureConfig) -> CaptureConfig {
        let mut sane = CaptureConfig {
            read_timeout: config.read_timeout,
            ..CaptureConfig::default()
        };

        for param in [
            Param::PixelFormat,
            Param::Width,
            Param::Height,
            Param::FrameRate,
            Param::BufferCount,
        ] {
            if !sane.set(param, config.get(param)) {
                warn!(
                    "configured {:?} = {} is out of range, using default {}",
                    param,
                    config.get(param),
                    sane.get(param)
                );
            }
        }

        sane
    }

    /// Whether the device descriptor is held.
    pub fn is_opened(&self) -> bool {
        self.state != CaptureState::Closed && self.handle.is_opened()
    }

    /// Whether the session is delivering frames.
    pub fn is_streaming(&self) -> bool {
        self.state == CaptureState::Streaming
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// The format installed by the last successful negotiation, with the
    /// driver-assigned stride and image size.
    pub fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    /// Reads a capture parameter.
    pub fn get(&self, param: Param) -> u32 {
        self.config.get(param)
    }

    /// Updates a capture parameter.
    ///
    /// Rejected (returning false, with the configuration untouched) while
    /// streaming or when the value is out of range.
    pub fn set(&mut self, param: Param, value: u32) -> bool {
        if self.state == CaptureState::Streaming {
            return false;
        }

        self.config.set(param, value)
    }

    /// Negotiates the configured format with the driver, allocates and maps
    /// the buffer ring, and starts streaming.
    ///
    /// A no-op when already streaming. On failure the ring is rolled back
    /// and the session returns to its previous state.
    pub fn start(&mut self) -> Result<()> {
        if self.state == CaptureState::Streaming {
            return Ok(());
        }
        let entry_state = self.state;

        self.check_capabilities()?;

        let format = self.negotiate_format()?;
        info!(
            "negotiated {} (stride {}, {} bytes/frame)",
            format, format.stride, format.size
        );
        self.format = Some(format);
        self.negotiate_frame_rate();
        self.state = CaptureState::Configured;

        match self.ring.allocate(self.config.buffer_count) {
            Ok(granted) => self.config.buffer_count = granted,
            Err(e) => {
                self.state = entry_state;
                return Err(e);
            }
        }

        if let Err(e) = self.ring.queue_all() {
            warn!("cannot enqueue buffers: {}", e);
            self.ring.release();
            self.state = entry_state;
            return Err(CaptureError::StreamStartFailed(errno(&e)));
        }

        let mut typ: std::os::raw::c_int = V4L2_BUF_TYPE_VIDEO_CAPTURE as std::os::raw::c_int;
        if let Err(e) = unsafe {
            self.handle.ioctl(
                vidioc::VIDIOC_STREAMON,
                &mut typ as *mut _ as *mut std::os::raw::c_void,
            )
        } {
            warn!("cannot enable streaming: {}", e);
            self.ring.release();
            self.state = entry_state;
            return Err(CaptureError::StreamStartFailed(errno(&e)));
        }

        self.state = CaptureState::Streaming;
        info!(
            "streaming on {} with {} buffers",
            self.handle.path().display(),
            self.ring.len()
        );
        Ok(())
    }

    /// Stops streaming and releases the buffer ring.
    ///
    /// A no-op outside the `Streaming` state. The ring is released and the
    /// session reaches `Stopped` even when the STREAMOFF ioctl fails; the
    /// failure is still reported.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != CaptureState::Streaming {
            return Ok(());
        }

        let mut result = Ok(());
        let mut typ: std::os::raw::c_int = V4L2_BUF_TYPE_VIDEO_CAPTURE as std::os::raw::c_int;
        if let Err(e) = unsafe {
            self.handle.ioctl(
                vidioc::VIDIOC_STREAMOFF,
                &mut typ as *mut _ as *mut std::os::raw::c_void,
            )
        } {
            warn!("cannot disable streaming: {}", e);
            result = Err(CaptureError::StreamStopFailed(errno(&e)));
        }

        self.ring.release();
        self.state = CaptureState::Stopped;
        result
    }

    /// Pulls the next frame.
    ///
    /// Returns `None` outside the `Streaming` state, on the readiness-wait
    /// timeout, and on transient driver conditions (`EAGAIN`, `EIO`,
    /// corrupted buffers); the session keeps running in all of these cases.
    pub fn read(&mut self) -> Option<Frame> {
        if self.state != CaptureState::Streaming {
            return None;
        }

        if !self.handle.wait_readable(self.config.read_timeout) {
            return None;
        }

        let desc = match self.ring.dequeue() {
            Ok(desc) => desc,
            Err(e) => {
                match e.raw_os_error() {
                    // spurious wakeup
                    Some(libc::EAGAIN) => {}
                    Some(libc::EIO) => warn!("I/O error on dequeue, driver may recover: {}", e),
                    _ => warn!("VIDIOC_DQBUF failed: {}", e),
                }
                return None;
            }
        };

        let sizeimage = match &self.format {
            Some(format) => format.size,
            None => return None,
        };

        if desc.flags & V4L2_BUF_FLAG_ERROR != 0 || desc.bytesused != sizeimage {
            warn!(
                "dequeued corrupted buffer {} ({}/{} bytes)",
                desc.index, desc.bytesused, sizeimage
            );
            // requeue with a fresh descriptor, i.e. bytesused cleared
            if let Err(e) = self.ring.queue(desc.index) {
                warn!("cannot requeue buffer {}: {}", desc.index, e);
            }
            return None;
        }

        let bytes = match self.ring.get(desc.index) {
            Some(buf) => buf.as_slice()[..desc.bytesused as usize].to_vec(),
            None => {
                warn!("driver handed out unknown buffer index {}", desc.index);
                return None;
            }
        };

        if let Err(e) = self.ring.queue(desc.index) {
            warn!("cannot requeue buffer {}: {}", desc.index, e);
        }

        Some(Frame::new(
            bytes,
            desc.sequence,
            Timestamp::from(desc.timestamp).as_nanos(),
        ))
    }

    fn check_capabilities(&mut self) -> Result<()> {
        // Normally cached at open; query here only if that attempt failed.
        if self.caps.is_none() {
            let caps = probe::identity(&self.handle).map_err(|e| {
                warn!("cannot query device capabilities: {}", e);
                CaptureError::UnsupportedCapabilities
            })?;
            self.caps = Some(caps);
        }

        let supported = self
            .caps
            .as_ref()
            .map(Capabilities::supports_video_streaming)
            .unwrap_or(false);
        if !supported {
            warn!("device lacks video capture or streaming support");
            return Err(CaptureError::UnsupportedCapabilities);
        }

        let input = probe::current_input(&self.handle).map_err(|e| {
            warn!("cannot query current input: {}", e);
            CaptureError::UnsupportedCapabilities
        })?;
        if !input.is_usable_camera() {
            warn!("current input {} is not a usable camera", input);
            return Err(CaptureError::UnsupportedCapabilities);
        }

        Ok(())
    }

    fn negotiate_format(&self) -> Result<Format> {
        let requested = Format::new(
            self.config.width,
            self.config.height,
            self.config.pixel_format,
        );

        unsafe {
            let mut fmt = v4l2_format {
                type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
                fmt: v4l2_format_union {
                    pix: requested.into(),
                },
            };
            if self
                .handle
                .ioctl(
                    vidioc::VIDIOC_TRY_FMT,
                    &mut fmt as *mut _ as *mut std::os::raw::c_void,
                )
                .is_err()
            {
                return Err(CaptureError::FormatNotSupported {
                    requested,
                    actual: Format::from(fmt.fmt.pix),
                });
            }

            fmt.fmt.pix = requested.into();
            if self
                .handle
                .ioctl(
                    vidioc::VIDIOC_S_FMT,
                    &mut fmt as *mut _ as *mut std::os::raw::c_void,
                )
                .is_err()
            {
                return Err(CaptureError::FormatNotSupported {
                    requested,
                    actual: Format::from(fmt.fmt.pix),
                });
            }

            // Read back what the driver actually installed. It may have
            // silently altered any part of the request.
            let mut current = v4l2_format {
                type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
                fmt: mem::zeroed(),
            };
            let actual = match self.handle.ioctl(
                vidioc::VIDIOC_G_FMT,
                &mut current as *mut _ as *mut std::os::raw::c_void,
            ) {
                Ok(()) => Format::from(current.fmt.pix),
                Err(e) => {
                    warn!("cannot read back the installed format: {}", e);
                    Format::from(fmt.fmt.pix)
                }
            };

            if actual.fourcc != requested.fourcc
                || actual.width != requested.width
                || actual.height != requested.height
            {
                return Err(CaptureError::FormatNotSupported { requested, actual });
            }

            Ok(actual)
        }
    }

    /// Commits the configured frame rate.
    ///
    /// Never fatal: drivers without time-per-frame support keep their
    /// default rate, and a silently rounded rate is adopted into the
    /// configuration.
    fn negotiate_frame_rate(&mut self) {
        unsafe {
            let mut parm = v4l2_streamparm {
                type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
                parm: mem::zeroed(),
            };
            if let Err(e) = self.handle.ioctl(
                vidioc::VIDIOC_G_PARM,
                &mut parm as *mut _ as *mut std::os::raw::c_void,
            ) {
                warn!("cannot query streaming parameters: {}", e);
                return;
            }

            let current = Parameters::from(parm.parm.capture);
            if !current
                .capabilities
                .contains(parameters::Capabilities::TIME_PER_FRAME)
            {
                warn!("driver does not support frame rate selection, keeping its default");
                return;
            }

            let mut parm = v4l2_streamparm {
                type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
                parm: v4l2_streamparm_union {
                    capture: Parameters::with_fps(self.config.frame_rate_fps).into(),
                },
            };
            if let Err(e) = self.handle.ioctl(
                vidioc::VIDIOC_S_PARM,
                &mut parm as *mut _ as *mut std::os::raw::c_void,
            ) {
                warn!("cannot set the frame rate: {}", e);
                return;
            }

            let actual = Parameters::from(parm.parm.capture);
            let effective = actual.interval.denominator;
            if effective != 0 && effective != self.config.frame_rate_fps {
                info!(
                    "frame rate adjusted by the driver: {} -> {} fps",
                    self.config.frame_rate_fps, effective
                );
                self.config.frame_rate_fps = effective;
            }
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if self.state == CaptureState::Streaming {
            if let Err(e) = self.stop() {
                warn!("cannot stop streaming on teardown: {}", e);
            }
        }
        self.state = CaptureState::Closed;
    }
}
