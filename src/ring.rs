use std::sync::Arc;
use std::{io, mem, slice};

use log::{debug, warn};

use crate::config::MIN_BUFFER_COUNT;
use crate::device::Handle;
use crate::driver::Driver;
use crate::error::{errno, CaptureError};
use crate::v4l2::videodev::*;
use crate::v4l2::vidioc;

/// One memory-mapped kernel buffer.
///
/// Uniquely owned by the [`Ring`]; the mapping is released exactly once when
/// the value drops, regardless of which exit path tears the ring down.
pub(crate) struct MappedBuffer {
    driver: Arc<dyn Driver>,
    ptr: *mut u8,
    length: usize,
    index: u32,
}

impl MappedBuffer {
    /// Read view of the mapped region.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr, self.length) }
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.driver.munmap(self.ptr, self.length) } {
            warn!("cannot unmap buffer {}: {}", self.index, e);
        }
    }
}

/// The set of kernel capture buffers shared with the driver.
///
/// Lifecycle: [`allocate`] requests and maps the buffers, [`queue_all`] hands
/// them all to the driver before STREAMON, and [`release`] unmaps everything
/// and tells the driver to free its side with a zero-count REQBUFS. Release
/// is idempotent and runs on normal stop, on any start-time failure after the
/// request succeeded, and on drop.
///
/// At any instant either the ring is empty or the driver holds a non-zero
/// buffer allocation, never both.
///
/// [`allocate`]: Ring::allocate
/// [`queue_all`]: Ring::queue_all
/// [`release`]: Ring::release
pub(crate) struct Ring {
    handle: Arc<Handle>,
    bufs: Vec<MappedBuffer>,
    requested: bool,
}

impl Ring {
    pub fn new(handle: Arc<Handle>) -> Self {
        Ring {
            handle,
            bufs: Vec::new(),
            requested: false,
        }
    }

    fn buffer_desc(index: u32) -> v4l2_buffer {
        v4l2_buffer {
            index,
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            memory: V4L2_MEMORY_MMAP,
            ..unsafe { mem::zeroed() }
        }
    }

    fn requestbuffers_desc(count: u32) -> v4l2_requestbuffers {
        v4l2_requestbuffers {
            count,
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            memory: V4L2_MEMORY_MMAP,
            ..unsafe { mem::zeroed() }
        }
    }

    /// Requests `count` buffers from the driver and maps each of them.
    ///
    /// The driver may grant fewer buffers than requested; the granted count
    /// is adopted and returned. Fewer than two granted buffers or any
    /// query/map failure rolls the ring back to its released state.
    pub fn allocate(&mut self, count: u32) -> Result<u32, CaptureError> {
        let mut reqbufs = Self::requestbuffers_desc(count);
        unsafe {
            self.handle
                .ioctl(
                    vidioc::VIDIOC_REQBUFS,
                    &mut reqbufs as *mut _ as *mut std::os::raw::c_void,
                )
                .map_err(|e| {
                    if e.raw_os_error() == Some(libc::EINVAL) {
                        warn!("device does not support memory-mapped streaming I/O");
                        CaptureError::UnsupportedCapabilities
                    } else {
                        warn!("VIDIOC_REQBUFS failed: {}", e);
                        CaptureError::InsufficientBuffers(0)
                    }
                })?;
        }

        self.requested = true;

        if reqbufs.count < MIN_BUFFER_COUNT {
            let granted = reqbufs.count;
            self.release();
            return Err(CaptureError::InsufficientBuffers(granted));
        }

        if reqbufs.count != count {
            warn!(
                "buffer ring on {} resized by the driver: {} -> {}",
                self.handle.path().display(),
                count,
                reqbufs.count
            );
        }

        for index in 0..reqbufs.count {
            if let Err(e) = self.map_buffer(index) {
                self.release();
                return Err(CaptureError::BufferMapFailed {
                    index,
                    errno: errno(&e),
                });
            }
        }

        Ok(reqbufs.count)
    }

    fn map_buffer(&mut self, index: u32) -> io::Result<()> {
        let mut desc = Self::buffer_desc(index);
        unsafe {
            self.handle.ioctl(
                vidioc::VIDIOC_QUERYBUF,
                &mut desc as *mut _ as *mut std::os::raw::c_void,
            )?;

            let length = desc.length as usize;
            let offset = desc.m.offset as libc::off_t;
            let driver = self.handle.driver();
            let ptr = driver.mmap(self.handle.fd(), length, offset)?;

            self.bufs.push(MappedBuffer {
                driver,
                ptr,
                length,
                index,
            });
        }

        Ok(())
    }

    /// Hands a buffer back to the driver's incoming queue.
    pub fn queue(&self, index: u32) -> io::Result<()> {
        let mut desc = Self::buffer_desc(index);
        unsafe {
            self.handle.ioctl(
                vidioc::VIDIOC_QBUF,
                &mut desc as *mut _ as *mut std::os::raw::c_void,
            )
        }
    }

    /// Enqueues every buffer; the driver expects a full queue before
    /// STREAMON.
    pub fn queue_all(&self) -> io::Result<()> {
        for index in 0..self.bufs.len() as u32 {
            self.queue(index)?;
        }

        Ok(())
    }

    /// Takes the next filled buffer from the driver's outgoing queue.
    pub fn dequeue(&self) -> io::Result<v4l2_buffer> {
        let mut desc = Self::buffer_desc(0);
        unsafe {
            self.handle.ioctl(
                vidioc::VIDIOC_DQBUF,
                &mut desc as *mut _ as *mut std::os::raw::c_void,
            )?;
        }

        Ok(desc)
    }

    pub fn get(&self, index: u32) -> Option<&MappedBuffer> {
        self.bufs.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    /// Unmaps every buffer and frees the kernel-side allocation.
    pub fn release(&mut self) {
        // Unmapping must precede the zero-count REQBUFS.
        self.bufs.clear();

        if !self.requested {
            return;
        }

        let mut reqbufs = Self::requestbuffers_desc(0);
        unsafe {
            if let Err(e) = self.handle.ioctl(
                vidioc::VIDIOC_REQBUFS,
                &mut reqbufs as *mut _ as *mut std::os::raw::c_void,
            ) {
                warn!("cannot release driver-side buffers: {}", e);
            }
        }

        self.requested = false;
        debug!("buffer ring released");
    }
}

impl Drop for Ring {
    fn drop(&mut self) {
        self.release();
    }
}
