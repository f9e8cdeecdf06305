//! The seam between the device session and the kernel video API.
//!
//! [`VideoDevice`] mirrors the synchronous request/response calls the
//! kernel exposes for a capture device. The production implementation
//! is [`crate::device::V4l2Api`]; tests substitute a scriptable mock.
//! Methods return plain [`io::Result`]s — mapping onto the crate's
//! error taxonomy is the session's job.

use std::io;
use std::time::Duration;

use crate::pool::MappedBuffer;
use crate::types::{Capabilities, FormatDescription, PixelFormat};

/// One control as reported by a device control query, before it is
/// shaped into a [`crate::types::Control`].
#[derive(Debug, Clone)]
pub struct RawControl {
    /// Numeric control id.
    pub id: u32,
    /// Human-readable name.
    pub name: String,
    /// Raw control type tag.
    pub control_type: u32,
    /// Minimum accepted value.
    pub minimum: i32,
    /// Maximum accepted value.
    pub maximum: i32,
    /// Value step size.
    pub step: i32,
    /// Default value.
    pub default_value: i32,
    /// Whether the device reports the control as disabled.
    pub disabled: bool,
}

/// Identity and bookkeeping of a dequeued buffer holding a completed
/// frame.
#[derive(Debug, Clone, Copy)]
pub struct DequeuedBuffer {
    /// Pool index of the filled buffer.
    pub index: u32,
    /// Bytes the driver filled for this frame.
    pub bytes_used: u32,
    /// Driver frame sequence number.
    pub sequence: u32,
    /// Driver capture timestamp.
    pub timestamp: Duration,
}

/// Synchronous kernel video API for one open capture device.
///
/// Implementations are not required to be thread-safe; callers must
/// serialize access per device (see the crate docs).
pub trait VideoDevice {
    /// Query device identity and capability flags.
    fn capabilities(&self) -> io::Result<Capabilities>;

    /// Read the currently active pixel format.
    fn current_format(&self) -> io::Result<PixelFormat>;

    /// Submit a format request and return the format the driver
    /// actually configured, which may differ from the request.
    fn request_format(&mut self, request: &PixelFormat) -> io::Result<PixelFormat>;

    /// Describe the supported format at `index`, or `None` once the
    /// device signals the end of the list.
    fn format_description(&self, index: u32) -> io::Result<Option<FormatDescription>>;

    /// Query a single control by exact id.
    fn query_control(&self, id: u32) -> io::Result<RawControl>;

    /// Query the next control after `id` (which carries the
    /// next-control flag), or `None` when enumeration is exhausted.
    fn next_control(&self, id: u32) -> io::Result<Option<RawControl>>;

    /// The label for one legal value of a menu control, or `None` if
    /// the device declines to label it.
    fn menu_label(&self, id: u32, index: u32) -> Option<String>;

    /// Read a control's current value.
    fn control_value(&self, id: u32) -> io::Result<i32>;

    /// Write a control value. The value is forwarded as-is; the device
    /// is the source of truth for legality.
    fn write_control(&mut self, id: u32, value: i32) -> io::Result<()>;

    /// Ask the kernel to reserve `count` mmap buffers (0 frees the
    /// reservation). Returns the count actually granted.
    fn request_buffers(&mut self, count: u32) -> io::Result<u32>;

    /// Map one granted buffer into the process.
    fn map_buffer(&mut self, index: u32) -> io::Result<MappedBuffer>;

    /// Hand a buffer to the device for filling.
    fn queue_buffer(&mut self, index: u32) -> io::Result<()>;

    /// Block until a filled buffer is available and take it from the
    /// device's ready queue.
    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer>;

    /// Enable the hardware stream.
    fn stream_on(&mut self) -> io::Result<()>;

    /// Disable the hardware stream.
    fn stream_off(&mut self) -> io::Result<()>;
}
