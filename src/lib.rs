//! V4L2 capture core: device sessions, format negotiation, hardware
//! controls and mmap-buffer streaming for Video4Linux2 capture devices.
//!
//! The crate sits between the raw kernel ioctl/mmap primitives and any
//! higher-level frame consumer. A [`Camera`] session owns the open
//! device, negotiates the pixel format, enumerates controls, manages
//! the kernel-shared buffer pool and serves frames through a
//! pull-based [`Camera::capture`] call. Every frame is copied out of
//! the shared buffer before that buffer is requeued, so frames are
//! safe to hold indefinitely.
//!
//! Sessions are not internally thread-safe: all calls against one
//! device must be externally serialized (a `Mutex` around the session,
//! or a dedicated capture thread).

pub mod device;
mod enumerate;
pub mod error;
pub mod pool;
pub mod session;
pub mod traits;
pub mod types;
mod v4l2;

#[cfg(test)]
pub mod mock;

pub use device::V4l2Api;
pub use error::{CameraError, Result};
pub use session::{Camera, REQUESTED_BUFFERS};
pub use traits::{DequeuedBuffer, RawControl, VideoDevice};
pub use types::{
    Capabilities, Control, ControlKind, FormatDescription, FourCC, Frame, FrameMetadata,
    PixelFormat, StreamState,
};
