use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time;

use log::{debug, warn};

use crate::driver::{Driver, V4l2Driver};
use crate::error::{errno, CaptureError, Result};
use crate::v4l2::vidioc;

/// Scoped owner of an open video device node.
///
/// The descriptor is opened read/write and non-blocking, validated to refer
/// to a character device, and closed exactly once when the handle is
/// dropped. All kernel traffic of the crate goes through the [`ioctl`] and
/// [`wait_readable`] methods of this type.
///
/// [`ioctl`]: Handle::ioctl
/// [`wait_readable`]: Handle::wait_readable
pub struct Handle {
    driver: Arc<dyn Driver>,
    path: PathBuf,
    fd: RawFd,
}

impl Handle {
    /// Opens a device node.
    ///
    /// # Arguments
    ///
    /// * `path` - Node path, usually `/dev/videoN`
    ///
    /// # Example
    ///
    /// ```
    /// use vcap::Handle;
    /// let handle = Handle::open("/dev/video0");
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(Arc::new(V4l2Driver), path.as_ref())
    }

    pub(crate) fn open_with(driver: Arc<dyn Driver>, path: &Path) -> Result<Self> {
        match driver.is_character_device(path) {
            Ok(true) => {}
            Ok(false) => return Err(CaptureError::NotACharacterDevice),
            Err(e) => {
                warn!("cannot stat {}: {}", path.display(), e);
                return Err(CaptureError::OpenFailed(errno(&e)));
            }
        }

        let fd = driver
            .open(path)
            .map_err(|e| CaptureError::OpenFailed(errno(&e)))?;
        debug!("opened {} (fd = {})", path.display(), fd);

        Ok(Handle {
            driver,
            path: PathBuf::from(path),
            fd,
        })
    }

    /// Returns the raw fd of the device
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Returns the node path the handle was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the descriptor is held.
    pub fn is_opened(&self) -> bool {
        self.fd >= 0
    }

    pub(crate) fn driver(&self) -> Arc<dyn Driver> {
        self.driver.clone()
    }

    /// Performs an ioctl, retrying while the call is interrupted by signals.
    ///
    /// Any error other than `EINTR` is returned verbatim; the failing request
    /// name is traced for diagnostics.
    ///
    /// # Safety
    ///
    /// `argp` must point to a live instance of the argument type encoded in
    /// `request`.
    pub(crate) unsafe fn ioctl(
        &self,
        request: vidioc::_IOC_TYPE,
        argp: *mut std::os::raw::c_void,
    ) -> std::io::Result<()> {
        loop {
            match self.driver.ioctl(self.fd, request, argp) {
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) => {
                    debug!("{} failed: {}", vidioc::request_name(request), e);
                    return Err(e);
                }
                Ok(()) => return Ok(()),
            }
        }
    }

    /// Waits until the descriptor becomes readable.
    ///
    /// Timeouts and wait errors both report `false`; errors are additionally
    /// logged. A signal arriving during the wait counts as "not ready".
    pub(crate) fn wait_readable(&self, timeout: time::Duration) -> bool {
        match self.driver.wait_readable(self.fd, timeout) {
            Ok(ready) => ready,
            Err(e) => {
                warn!("select() failed on fd {}: {}", self.fd, e);
                false
            }
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if self.fd < 0 {
            return;
        }

        if let Err(e) = self.driver.close(self.fd) {
            warn!("cannot close {} (fd = {}): {}", self.path.display(), self.fd, e);
        }
        self.fd = -1;
    }
}
