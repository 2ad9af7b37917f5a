//! The `videodev2` kernel ABI: structure layouts in [`videodev`], ioctl
//! request codes in [`vidioc`]. The syscalls that consume them live in the
//! production driver.

pub mod videodev;
pub mod vidioc;
