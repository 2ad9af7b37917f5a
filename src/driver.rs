use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::{io, mem, ptr, time};

use crate::v4l2::vidioc;

/// Kernel primitives consumed by the capture engine.
///
/// Everything that crosses the userspace/kernel boundary funnels through this
/// trait so that the state machine, ring and negotiation logic can be driven
/// against a scripted driver in tests. The production implementation is
/// [`V4l2Driver`].
pub(crate) trait Driver {
    /// Whether the path refers to a character device node.
    fn is_character_device(&self, path: &Path) -> io::Result<bool>;

    fn open(&self, path: &Path) -> io::Result<RawFd>;

    fn close(&self, fd: RawFd) -> io::Result<()>;

    /// Single ioctl invocation, no retry semantics.
    ///
    /// # Safety
    ///
    /// `argp` must point to a live instance of the argument type encoded in
    /// `request`.
    unsafe fn ioctl(
        &self,
        fd: RawFd,
        request: vidioc::_IOC_TYPE,
        argp: *mut std::os::raw::c_void,
    ) -> io::Result<()>;

    /// Maps `length` bytes of device memory at `offset`, read/write, shared.
    ///
    /// # Safety
    ///
    /// The returned pointer is only valid for `length` bytes and until the
    /// matching [`Driver::munmap`].
    unsafe fn mmap(&self, fd: RawFd, length: usize, offset: libc::off_t) -> io::Result<*mut u8>;

    /// # Safety
    ///
    /// `start` must be a pointer previously returned by [`Driver::mmap`] with
    /// the same `length`, not unmapped yet.
    unsafe fn munmap(&self, start: *mut u8, length: usize) -> io::Result<()>;

    /// Waits for read-readiness on the descriptor.
    ///
    /// Returns `Ok(false)` on timeout, `Ok(true)` when a buffer can be
    /// dequeued.
    fn wait_readable(&self, fd: RawFd, timeout: time::Duration) -> io::Result<bool>;
}

/// Production driver backed by the V4L2 character device ABI.
pub(crate) struct V4l2Driver;

impl Driver for V4l2Driver {
    fn is_character_device(&self, path: &Path) -> io::Result<bool> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut status: libc::stat = unsafe { mem::zeroed() };
        let ret = unsafe { libc::stat(c_path.as_ptr(), &mut status) };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(status.st_mode & libc::S_IFMT == libc::S_IFCHR)
    }

    fn open(&self, path: &Path) -> io::Result<RawFd> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR | libc::O_NONBLOCK) };

        if fd == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(fd)
        }
    }

    fn close(&self, fd: RawFd) -> io::Result<()> {
        let ret = unsafe { libc::close(fd) };

        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    unsafe fn ioctl(
        &self,
        fd: RawFd,
        request: vidioc::_IOC_TYPE,
        argp: *mut std::os::raw::c_void,
    ) -> io::Result<()> {
        /*
         * It turns out the libc crate (and libc itself!) defines ioctl() with
         * different, incompatible argument types on different platforms. To
         * hack around this without conditional compilation, use syscall()
         * instead as a drop-in replacement. Details:
         * https://github.com/rust-lang/libc/issues/1036
         */
        let ret = libc::syscall(libc::SYS_ioctl, fd, request, argp) as std::os::raw::c_int;

        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    unsafe fn mmap(&self, fd: RawFd, length: usize, offset: libc::off_t) -> io::Result<*mut u8> {
        let ret = libc::mmap(
            ptr::null_mut(),
            length,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            offset,
        );

        if ret == libc::MAP_FAILED {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret as *mut u8)
        }
    }

    unsafe fn munmap(&self, start: *mut u8, length: usize) -> io::Result<()> {
        let ret = libc::munmap(start as *mut std::os::raw::c_void, length);

        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn wait_readable(&self, fd: RawFd, timeout: time::Duration) -> io::Result<bool> {
        unsafe {
            let mut readfds = {
                let mut raw = mem::MaybeUninit::<libc::fd_set>::uninit();
                libc::FD_ZERO(raw.as_mut_ptr());
                raw.assume_init()
            };
            libc::FD_SET(fd, &mut readfds);

            let timespec = libc::timespec {
                tv_sec: timeout.as_secs() as i64,
                tv_nsec: timeout.subsec_nanos() as i64,
            };

            match libc::pselect(
                fd + 1,
                &mut readfds,
                ptr::null_mut(),
                ptr::null_mut(),
                &timespec,
                ptr::null(),
            ) {
                -1 => Err(io::Error::last_os_error()),
                0 => Ok(false),
                _ => Ok(true),
            }
        }
    }
}
