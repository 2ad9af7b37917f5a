//! Scripted in-memory driver used to exercise the capture engine without
//! hardware.
//!
//! The mock interprets the same ioctl request codes the production driver
//! forwards to the kernel, keeps its own buffer queue and backing memory,
//! and records every state-changing interaction in an ordered event log so
//! tests can assert teardown ordering.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::time;

use crate::driver::Driver;
use crate::v4l2::videodev::*;
use crate::v4l2::vidioc;

/// Kernel interactions recorded by the mock, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Reqbufs(u32),
    ReqbufsZero,
    Mmap(u32),
    Munmap,
    Queue(u32),
    StreamOn,
    StreamOff,
    Close,
}

/// Outcome of the next readiness wait / DQBUF pair.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// Deliver a good frame filled with the given byte.
    Frame(u8),
    /// Deliver a frame carrying V4L2_BUF_FLAG_ERROR.
    Corrupted,
    /// Deliver a frame with a payload shorter than sizeimage.
    Short(u32),
    /// Fail the dequeue with EAGAIN (spurious wakeup).
    Eagain,
    /// Fail the dequeue with EIO.
    Eio,
    /// Let the readiness wait time out once.
    Stall,
}

struct State {
    // behavior knobs
    char_device: bool,
    caps: u32,
    input_type: u32,
    input_status: u32,
    max_width: u32,
    max_height: u32,
    grant: Option<u32>,
    timeperframe: bool,
    rounded_fps: Option<u32>,
    script: VecDeque<Outcome>,

    // driver-side state
    streaming: bool,
    pix: v4l2_pix_format,
    fps: u32,
    allocated: u32,
    alloc_base: usize,
    queued: VecDeque<u32>,
    sequence: u32,
    clock_usec: i64,
    // Backing memory lives for the whole mock lifetime so stale pointers in
    // a misbehaving caller fault in the test allocator, not in freed pages.
    regions: Vec<Box<[u8]>>,
    events: Vec<Event>,
}

pub struct MockDriver {
    state: RefCell<State>,
}

fn default_pix(width: u32, height: u32, fourcc: &[u8; 4]) -> v4l2_pix_format {
    let mut pix: v4l2_pix_format = unsafe { std::mem::zeroed() };
    pix.width = width;
    pix.height = height;
    pix.pixelformat = u32::from_le_bytes(*fourcc);
    pix.bytesperline = width * 2;
    pix.sizeimage = width * height * 2;
    pix
}

impl MockDriver {
    pub fn new() -> Self {
        MockDriver {
            state: RefCell::new(State {
                char_device: true,
                caps: V4L2_CAP_VIDEO_CAPTURE | V4L2_CAP_STREAMING,
                input_type: V4L2_INPUT_TYPE_CAMERA,
                input_status: 0,
                max_width: 1920,
                max_height: 1080,
                grant: None,
                timeperframe: true,
                rounded_fps: None,
                script: VecDeque::new(),
                streaming: false,
                pix: default_pix(640, 480, b"YUYV"),
                fps: 30,
                allocated: 0,
                alloc_base: 0,
                queued: VecDeque::new(),
                sequence: 0,
                clock_usec: 0,
                regions: Vec::new(),
                events: Vec::new(),
            }),
        }
    }

    pub fn set_char_device(&self, yes: bool) {
        self.state.borrow_mut().char_device = yes;
    }

    pub fn set_caps(&self, caps: u32) {
        self.state.borrow_mut().caps = caps;
    }

    pub fn set_input(&self, typ: u32, status: u32) {
        let mut state = self.state.borrow_mut();
        state.input_type = typ;
        state.input_status = status;
    }

    /// Grant exactly `count` buffers regardless of the requested count.
    pub fn set_grant(&self, count: u32) {
        self.state.borrow_mut().grant = Some(count);
    }

    pub fn set_max_resolution(&self, width: u32, height: u32) {
        let mut state = self.state.borrow_mut();
        state.max_width = width;
        state.max_height = height;
    }

    pub fn disable_timeperframe(&self) {
        self.state.borrow_mut().timeperframe = false;
    }

    /// Make S_PARM round every requested rate to `fps`.
    pub fn set_rounded_fps(&self, fps: u32) {
        self.state.borrow_mut().rounded_fps = Some(fps);
    }

    pub fn push(&self, outcome: Outcome) {
        self.state.borrow_mut().script.push_back(outcome);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.state.borrow().streaming
    }

    pub fn sizeimage(&self) -> u32 {
        self.state.borrow().pix.sizeimage
    }
}

impl State {
    fn adjust(&self, pix: &mut v4l2_pix_format) {
        if pix.width == 0 || pix.width > self.max_width {
            pix.width = 640;
        }
        if pix.height == 0 || pix.height > self.max_height {
            pix.height = 480;
        }
        pix.bytesperline = pix.width * 2;
        pix.sizeimage = pix.width * pix.height * 2;
    }

    fn next_timestamp(&mut self) -> libc::timeval {
        self.clock_usec += 33_333;
        libc::timeval {
            tv_sec: self.clock_usec / 1_000_000,
            tv_usec: self.clock_usec % 1_000_000,
        }
    }

    fn fill_buffer_desc(&mut self, desc: &mut v4l2_buffer, index: u32) {
        desc.index = index;
        desc.bytesused = self.pix.sizeimage;
        desc.flags = 0;
        desc.sequence = self.sequence;
        desc.timestamp = self.next_timestamp();
        self.sequence += 1;
    }
}

fn os_err(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

fn put_str(dst: &mut [u8], src: &str) {
    let bytes = src.as_bytes();
    dst[..bytes.len()].copy_from_slice(bytes);
}

impl Driver for MockDriver {
    fn is_character_device(&self, _path: &Path) -> io::Result<bool> {
        Ok(self.state.borrow().char_device)
    }

    fn open(&self, _path: &Path) -> io::Result<RawFd> {
        Ok(42)
    }

    fn close(&self, _fd: RawFd) -> io::Result<()> {
        self.state.borrow_mut().events.push(Event::Close);
        Ok(())
    }

    unsafe fn ioctl(
        &self,
        _fd: RawFd,
        request: vidioc::_IOC_TYPE,
        argp: *mut std::os::raw::c_void,
    ) -> io::Result<()> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        match request {
            vidioc::VIDIOC_QUERYCAP => {
                let caps = &mut *(argp as *mut v4l2_capability);
                *caps = std::mem::zeroed();
                put_str(&mut caps.driver, "mockdrv");
                put_str(&mut caps.card, "Mock Camera");
                put_str(&mut caps.bus_info, "platform:mock");
                caps.version = 0x0006_0100;
                caps.capabilities = state.caps | V4L2_CAP_DEVICE_CAPS;
                caps.device_caps = state.caps;
                Ok(())
            }
            vidioc::VIDIOC_G_INPUT => {
                let index = &mut *(argp as *mut std::os::raw::c_int);
                *index = 0;
                Ok(())
            }
            vidioc::VIDIOC_ENUMINPUT => {
                let input = &mut *(argp as *mut v4l2_input);
                if input.index != 0 {
                    return Err(os_err(libc::EINVAL));
                }
                let index = input.index;
                *input = std::mem::zeroed();
                input.index = index;
                put_str(&mut input.name, "Mock Input");
                input.type_ = state.input_type;
                input.status = state.input_status;
                Ok(())
            }
            vidioc::VIDIOC_ENUM_FMT => {
                let desc = &mut *(argp as *mut v4l2_fmtdesc);
                let fourcc: &[u8; 4] = match desc.index {
                    0 => b"YUYV",
                    1 => b"MJPG",
                    _ => return Err(os_err(libc::EINVAL)),
                };
                desc.pixelformat = u32::from_le_bytes(*fourcc);
                put_str(&mut desc.description, "Mock format");
                Ok(())
            }
            vidioc::VIDIOC_ENUM_FRAMESIZES => {
                let desc = &mut *(argp as *mut v4l2_frmsizeenum);
                let (width, height) = match desc.index {
                    0 => (640, 480),
                    1 => (1280, 720),
                    _ => return Err(os_err(libc::EINVAL)),
                };
                desc.type_ = V4L2_FRMSIZE_TYPE_DISCRETE;
                desc.size.discrete = v4l2_frmsize_discrete { width, height };
                Ok(())
            }
            vidioc::VIDIOC_ENUM_FRAMEINTERVALS => {
                let desc = &mut *(argp as *mut v4l2_frmivalenum);
                let denominator = match desc.index {
                    0 => 30,
                    1 => 15,
                    _ => return Err(os_err(libc::EINVAL)),
                };
                desc.type_ = V4L2_FRMIVAL_TYPE_DISCRETE;
                desc.interval.discrete = v4l2_fract {
                    numerator: 1,
                    denominator,
                };
                Ok(())
            }
            vidioc::VIDIOC_TRY_FMT => {
                let fmt = &mut *(argp as *mut v4l2_format);
                state.adjust(&mut fmt.fmt.pix);
                Ok(())
            }
            vidioc::VIDIOC_S_FMT => {
                let fmt = &mut *(argp as *mut v4l2_format);
                state.adjust(&mut fmt.fmt.pix);
                state.pix = fmt.fmt.pix;
                Ok(())
            }
            vidioc::VIDIOC_G_FMT => {
                let fmt = &mut *(argp as *mut v4l2_format);
                fmt.fmt.pix = state.pix;
                Ok(())
            }
            vidioc::VIDIOC_G_PARM => {
                let parm = &mut *(argp as *mut v4l2_streamparm);
                let mut capture: v4l2_captureparm = std::mem::zeroed();
                capture.capability = if state.timeperframe {
                    V4L2_CAP_TIMEPERFRAME
                } else {
                    0
                };
                capture.timeperframe = v4l2_fract {
                    numerator: 1,
                    denominator: state.fps,
                };
                parm.parm.capture = capture;
                Ok(())
            }
            vidioc::VIDIOC_S_PARM => {
                let parm = &mut *(argp as *mut v4l2_streamparm);
                let requested = parm.parm.capture.timeperframe.denominator;
                let effective = state.rounded_fps.unwrap_or(requested);
                state.fps = effective;
                parm.parm.capture.timeperframe = v4l2_fract {
                    numerator: 1,
                    denominator: effective,
                };
                Ok(())
            }
            vidioc::VIDIOC_REQBUFS => {
                let reqbufs = &mut *(argp as *mut v4l2_requestbuffers);
                if reqbufs.count == 0 {
                    state.allocated = 0;
                    state.queued.clear();
                    state.events.push(Event::ReqbufsZero);
                    return Ok(());
                }

                let granted = state.grant.unwrap_or(reqbufs.count);
                let sizeimage = state.pix.sizeimage as usize;
                state.alloc_base = state.regions.len();
                for _ in 0..granted {
                    state
                        .regions
                        .push(vec![0u8; sizeimage].into_boxed_slice());
                }
                state.allocated = granted;
                state.events.push(Event::Reqbufs(granted));
                reqbufs.count = granted;
                Ok(())
            }
            vidioc::VIDIOC_QUERYBUF => {
                let desc = &mut *(argp as *mut v4l2_buffer);
                if desc.index >= state.allocated {
                    return Err(os_err(libc::EINVAL));
                }
                desc.length = state.pix.sizeimage;
                desc.m.offset = (state.alloc_base as u32) + desc.index;
                Ok(())
            }
            vidioc::VIDIOC_QBUF => {
                let desc = &mut *(argp as *mut v4l2_buffer);
                if desc.index >= state.allocated {
                    return Err(os_err(libc::EINVAL));
                }
                let index = desc.index;
                state.queued.push_back(index);
                state.events.push(Event::Queue(index));
                Ok(())
            }
            vidioc::VIDIOC_DQBUF => {
                if !state.streaming {
                    return Err(os_err(libc::EINVAL));
                }
                let desc = &mut *(argp as *mut v4l2_buffer);
                let outcome = state.script.pop_front().unwrap_or(Outcome::Eagain);
                match outcome {
                    Outcome::Eagain | Outcome::Stall => Err(os_err(libc::EAGAIN)),
                    Outcome::Eio => Err(os_err(libc::EIO)),
                    Outcome::Frame(fill) => {
                        let index = match state.queued.pop_front() {
                            Some(index) => index,
                            None => return Err(os_err(libc::EAGAIN)),
                        };
                        let slot = state.alloc_base + index as usize;
                        for byte in state.regions[slot].iter_mut() {
                            *byte = fill;
                        }
                        state.fill_buffer_desc(desc, index);
                        Ok(())
                    }
                    Outcome::Corrupted => {
                        let index = match state.queued.pop_front() {
                            Some(index) => index,
                            None => return Err(os_err(libc::EAGAIN)),
                        };
                        state.fill_buffer_desc(desc, index);
                        desc.flags = V4L2_BUF_FLAG_ERROR;
                        Ok(())
                    }
                    Outcome::Short(bytesused) => {
                        let index = match state.queued.pop_front() {
                            Some(index) => index,
                            None => return Err(os_err(libc::EAGAIN)),
                        };
                        state.fill_buffer_desc(desc, index);
                        desc.bytesused = bytesused;
                        Ok(())
                    }
                }
            }
            vidioc::VIDIOC_STREAMON => {
                state.streaming = true;
                state.events.push(Event::StreamOn);
                Ok(())
            }
            vidioc::VIDIOC_STREAMOFF => {
                state.streaming = false;
                state.queued.clear();
                state.events.push(Event::StreamOff);
                Ok(())
            }
            _ => Err(os_err(libc::ENOTTY)),
        }
    }

    unsafe fn mmap(&self, _fd: RawFd, length: usize, offset: libc::off_t) -> io::Result<*mut u8> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let slot = offset as usize;
        let index = slot.saturating_sub(state.alloc_base) as u32;
        match state.regions.get_mut(slot) {
            Some(region) if region.len() == length => {
                let ptr = region.as_mut_ptr();
                state.events.push(Event::Mmap(index));
                Ok(ptr)
            }
            _ => Err(os_err(libc::EINVAL)),
        }
    }

    unsafe fn munmap(&self, _start: *mut u8, _length: usize) -> io::Result<()> {
        self.state.borrow_mut().events.push(Event::Munmap);
        Ok(())
    }

    fn wait_readable(&self, _fd: RawFd, _timeout: time::Duration) -> io::Result<bool> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if !state.streaming {
            return Ok(false);
        }
        if matches!(state.script.front(), Some(Outcome::Stall)) {
            state.script.pop_front();
            return Ok(false);
        }
        Ok(true)
    }
}
