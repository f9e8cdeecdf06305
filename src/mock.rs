//! Scriptable mock of the kernel video API for testing without
//! hardware.
//!
//! The mock models driver behavior the session must survive: granting
//! fewer buffers than requested, silently substituting a different
//! format, rejecting format or control requests, and failing any step
//! of the buffer lifecycle on demand.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::pool::MappedBuffer;
use crate::traits::{DequeuedBuffer, RawControl, VideoDevice};
use crate::types::{Capabilities, FormatDescription, FourCC, PixelFormat};
use crate::v4l2;

fn os_err(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

/// One mock control: its query snapshot, stored value, menu labels and
/// rejection behavior.
pub struct MockControl {
    raw: RawControl,
    value: i32,
    labels: Vec<Option<String>>,
    strict: bool,
}

impl MockControl {
    /// An integer control.
    #[must_use]
    pub fn integer(id: u32, name: &str, minimum: i32, maximum: i32, default_value: i32) -> Self {
        Self {
            raw: RawControl {
                id,
                name: name.to_owned(),
                control_type: v4l2::V4L2_CTRL_TYPE_INTEGER,
                minimum,
                maximum,
                step: 1,
                default_value,
                disabled: false,
            },
            value: default_value,
            labels: Vec::new(),
            strict: false,
        }
    }

    /// A boolean control defaulting to off.
    #[must_use]
    pub fn boolean(id: u32, name: &str) -> Self {
        let mut control = Self::integer(id, name, 0, 1, 0);
        control.raw.control_type = v4l2::V4L2_CTRL_TYPE_BOOLEAN;
        control
    }

    /// A menu control; `None` entries are values the device refuses to
    /// label.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn menu(id: u32, name: &str, labels: Vec<Option<String>>) -> Self {
        let maximum = labels.len().saturating_sub(1) as i32;
        let mut control = Self::integer(id, name, 0, maximum, 0);
        control.raw.control_type = v4l2::V4L2_CTRL_TYPE_MENU;
        control.labels = labels;
        control
    }

    /// A control with an arbitrary raw type tag.
    #[must_use]
    pub fn of_type(id: u32, name: &str, control_type: u32) -> Self {
        let mut control = Self::integer(id, name, 0, 0, 0);
        control.raw.control_type = control_type;
        control
    }

    /// Mark the control as disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.raw.disabled = true;
        self
    }

    /// Make the device reject values outside `[minimum, maximum]`.
    /// Without this, the device is permissive — it accepts whatever it
    /// is sent, like drivers that clamp internally.
    #[must_use]
    pub const fn strict_range(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// Observable state shared with [`MockProbe`], so tests can inspect the
/// device after the session is dropped.
#[derive(Default)]
struct SharedState {
    streaming: AtomicBool,
    buffers: Mutex<Vec<Arc<Mutex<Vec<u8>>>>>,
}

/// A handle onto a mock device's observable state that outlives the
/// session owning the mock.
pub struct MockProbe {
    shared: Arc<SharedState>,
}

impl MockProbe {
    /// Whether the mock device believes it is streaming.
    #[must_use]
    pub fn streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::SeqCst)
    }

    /// Number of buffers still mapped outside the device.
    #[must_use]
    pub fn live_mappings(&self) -> usize {
        self.shared
            .buffers
            .lock()
            .map_or(0, |buffers| count_live(&buffers))
    }
}

fn count_live(buffers: &[Arc<Mutex<Vec<u8>>>]) -> usize {
    buffers
        .iter()
        .filter(|cell| Arc::strong_count(cell) > 1)
        .count()
}

/// Mock kernel video API.
pub struct MockApi {
    shared: Arc<SharedState>,
    capabilities: Capabilities,
    format: PixelFormat,
    substituted: Option<PixelFormat>,
    reject_format: bool,
    format_requests: u32,
    descriptions: Vec<FormatDescription>,
    controls: Vec<MockControl>,
    received_writes: Vec<(u32, i32)>,
    grant: u32,
    map_failure_at: Option<u32>,
    queue_fails: bool,
    requeue_fails: bool,
    dequeue_fails: bool,
    stream_on_fails: bool,
    stream_off_fails: bool,
    queued: VecDeque<u32>,
    sequence: u32,
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockApi {
    /// A well-behaved 640x480 YUYV capture device granting 4 buffers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SharedState::default()),
            capabilities: Capabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                version: 0,
                can_capture: true,
                can_read_write: false,
                can_stream: true,
            },
            format: complete(&PixelFormat::request(640, 480, FourCC::YUYV)),
            substituted: None,
            reject_format: false,
            format_requests: 0,
            descriptions: Vec::new(),
            controls: Vec::new(),
            received_writes: Vec::new(),
            grant: 4,
            map_failure_at: None,
            queue_fails: false,
            requeue_fails: false,
            dequeue_fails: false,
            stream_on_fails: false,
            stream_off_fails: false,
            queued: VecDeque::new(),
            sequence: 0,
        }
    }

    /// Limit how many buffers the driver grants regardless of the
    /// requested count.
    #[must_use]
    pub const fn with_buffer_grant(mut self, grant: u32) -> Self {
        self.grant = grant;
        self
    }

    /// Fail the mapping of the buffer at `index`.
    #[must_use]
    pub const fn with_map_failure_at(mut self, index: u32) -> Self {
        self.map_failure_at = Some(index);
        self
    }

    /// Make every format request configure `format` instead of what was
    /// asked for, the way drivers silently substitute.
    #[must_use]
    pub fn with_substituted_format(mut self, format: PixelFormat) -> Self {
        self.substituted = Some(format);
        self
    }

    /// Make the device error on format requests.
    #[must_use]
    pub const fn with_format_rejection(mut self) -> Self {
        self.reject_format = true;
        self
    }

    /// Supported-format list reported by enumeration.
    #[must_use]
    pub fn with_format_descriptions(mut self, descriptions: Vec<FormatDescription>) -> Self {
        self.descriptions = descriptions;
        self
    }

    /// Controls reported by enumeration, kept ordered by id.
    #[must_use]
    pub fn with_controls(mut self, mut controls: Vec<MockControl>) -> Self {
        controls.sort_by_key(|control| control.raw.id);
        self.controls = controls;
        self
    }

    /// Fail the initial buffer queueing during stream start.
    #[must_use]
    pub const fn with_queue_failure(mut self) -> Self {
        self.queue_fails = true;
        self
    }

    /// Fail enabling the stream.
    #[must_use]
    pub const fn with_stream_on_failure(mut self) -> Self {
        self.stream_on_fails = true;
        self
    }

    /// Fail disabling the stream.
    #[must_use]
    pub const fn with_stream_off_failure(mut self) -> Self {
        self.stream_off_fails = true;
        self
    }

    /// Fail the next dequeue, as a disconnected device would.
    pub fn fail_dequeue(&mut self) {
        self.dequeue_fails = true;
    }

    /// Fail requeueing while streaming.
    pub fn fail_requeue(&mut self) {
        self.requeue_fails = true;
    }

    /// Number of format requests the device received.
    #[must_use]
    pub const fn format_requests(&self) -> u32 {
        self.format_requests
    }

    /// Raw `(id, value)` control writes the device received, in order.
    #[must_use]
    pub fn received_control_writes(&self) -> &[(u32, i32)] {
        &self.received_writes
    }

    /// Number of buffers currently mapped outside the device.
    #[must_use]
    pub fn live_mappings(&self) -> usize {
        self.shared
            .buffers
            .lock()
            .map_or(0, |buffers| count_live(&buffers))
    }

    /// Size of the current kernel-side buffer reservation.
    #[must_use]
    pub fn reserved_buffers(&self) -> usize {
        self.shared.buffers.lock().map_or(0, |buffers| buffers.len())
    }

    /// Whether the device believes it is streaming.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::SeqCst)
    }

    /// A probe onto the device's observable state that survives the
    /// session being dropped.
    #[must_use]
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    fn control(&self, id: u32) -> Option<&MockControl> {
        self.controls.iter().find(|control| control.raw.id == id)
    }

    fn control_mut(&mut self, id: u32) -> Option<&mut MockControl> {
        self.controls.iter_mut().find(|control| control.raw.id == id)
    }
}

/// Fill in the driver-owned fields of a format request the way a YUYV
/// device would (2 bytes per pixel).
fn complete(request: &PixelFormat) -> PixelFormat {
    let mut format = request.clone();
    format.bytes_per_line = format.width * 2;
    format.size_image = format.bytes_per_line * format.height;
    format
}

impl VideoDevice for MockApi {
    fn capabilities(&self) -> io::Result<Capabilities> {
        Ok(self.capabilities.clone())
    }

    fn current_format(&self) -> io::Result<PixelFormat> {
        Ok(self.format.clone())
    }

    fn request_format(&mut self, request: &PixelFormat) -> io::Result<PixelFormat> {
        self.format_requests += 1;
        if self.reject_format {
            return Err(os_err(libc::EINVAL));
        }
        let actual = self
            .substituted
            .clone()
            .unwrap_or_else(|| complete(request));
        self.format = actual.clone();
        Ok(actual)
    }

    fn format_description(&self, index: u32) -> io::Result<Option<FormatDescription>> {
        Ok(self.descriptions.get(index as usize).cloned())
    }

    fn query_control(&self, id: u32) -> io::Result<RawControl> {
        self.control(id)
            .map(|control| control.raw.clone())
            .ok_or_else(|| os_err(libc::EINVAL))
    }

    fn next_control(&self, id: u32) -> io::Result<Option<RawControl>> {
        let base = id & !v4l2::V4L2_CTRL_FLAG_NEXT_CTRL;
        Ok(self
            .controls
            .iter()
            .find(|control| control.raw.id > base)
            .map(|control| control.raw.clone()))
    }

    fn menu_label(&self, id: u32, index: u32) -> Option<String> {
        self.control(id)
            .and_then(|control| control.labels.get(index as usize))
            .cloned()
            .flatten()
    }

    fn control_value(&self, id: u32) -> io::Result<i32> {
        self.control(id)
            .map(|control| control.value)
            .ok_or_else(|| os_err(libc::EINVAL))
    }

    fn write_control(&mut self, id: u32, value: i32) -> io::Result<()> {
        self.received_writes.push((id, value));
        let Some(control) = self.control_mut(id) else {
            return Err(os_err(libc::EINVAL));
        };
        if control.strict && (value < control.raw.minimum || value > control.raw.maximum) {
            return Err(os_err(libc::ERANGE));
        }
        control.value = value;
        Ok(())
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        let mut buffers = self
            .shared
            .buffers
            .lock()
            .map_err(|_| os_err(libc::EIO))?;
        self.queued.clear();
        if count == 0 {
            buffers.clear();
            return Ok(0);
        }
        let granted = count.min(self.grant);
        let size = self.format.size_image as usize;
        *buffers = (0..granted)
            .map(|_| Arc::new(Mutex::new(vec![0u8; size])))
            .collect();
        Ok(granted)
    }

    fn map_buffer(&mut self, index: u32) -> io::Result<MappedBuffer> {
        if self.map_failure_at == Some(index) {
            return Err(os_err(libc::ENOMEM));
        }
        let buffers = self
            .shared
            .buffers
            .lock()
            .map_err(|_| os_err(libc::EIO))?;
        buffers
            .get(index as usize)
            .map(|cell| MappedBuffer::shared(Arc::clone(cell)))
            .ok_or_else(|| os_err(libc::EINVAL))
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        let streaming = self.is_streaming();
        if streaming && self.requeue_fails {
            return Err(os_err(libc::EIO));
        }
        if !streaming && self.queue_fails {
            return Err(os_err(libc::EINVAL));
        }
        let len = self.reserved_buffers();
        if (index as usize) >= len {
            return Err(os_err(libc::EINVAL));
        }
        self.queued.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        if self.dequeue_fails {
            return Err(os_err(libc::ENODEV));
        }
        if !self.is_streaming() {
            return Err(os_err(libc::EINVAL));
        }
        let index = self.queued.pop_front().ok_or_else(|| os_err(libc::EAGAIN))?;
        let sequence = self.sequence;
        self.sequence += 1;

        // Fill the buffer the way the hardware would, before handing
        // ownership to the process side.
        let buffers = self
            .shared
            .buffers
            .lock()
            .map_err(|_| os_err(libc::EIO))?;
        if let Some(cell) = buffers.get(index as usize) {
            if let Ok(mut bytes) = cell.lock() {
                #[allow(clippy::cast_possible_truncation)]
                bytes.fill(sequence as u8);
            }
        }

        Ok(DequeuedBuffer {
            index,
            bytes_used: self.format.size_image,
            sequence,
            timestamp: Duration::from_millis(u64::from(sequence) * 33),
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        if self.stream_on_fails {
            return Err(os_err(libc::EIO));
        }
        self.shared.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        // Even a failing disable leaves the kernel-side stream state
        // undefined; the mock mirrors that by always dropping out of
        // streaming.
        self.shared.streaming.store(false, Ordering::SeqCst);
        if self.stream_off_fails {
            return Err(os_err(libc::EIO));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_grants_at_most_its_limit() {
        let mut api = MockApi::new().with_buffer_grant(2);
        assert_eq!(api.request_buffers(4).expect("request should succeed"), 2);
        assert_eq!(api.reserved_buffers(), 2);
        assert_eq!(api.request_buffers(0).expect("free should succeed"), 0);
        assert_eq!(api.reserved_buffers(), 0);
    }

    #[test]
    fn test_mock_fills_dequeued_buffers_with_sequence_pattern() {
        let mut api = MockApi::new();
        api.request_buffers(4).expect("request should succeed");
        let buffer = api.map_buffer(0).expect("mapping should succeed");
        api.queue_buffer(0).expect("queue should succeed");
        api.stream_on().expect("stream on should succeed");

        let first = api.dequeue_buffer().expect("dequeue should succeed");
        assert_eq!(first.sequence, 0);
        assert_eq!(buffer.copy_out(4), vec![0u8; 4]);

        api.queue_buffer(0).expect("requeue should succeed");
        let second = api.dequeue_buffer().expect("dequeue should succeed");
        assert_eq!(second.sequence, 1);
        assert_eq!(buffer.copy_out(4), vec![1u8; 4]);
    }

    #[test]
    fn test_mock_dequeue_requires_streaming() {
        let mut api = MockApi::new();
        api.request_buffers(4).expect("request should succeed");
        api.queue_buffer(0).expect("queue should succeed");
        assert!(api.dequeue_buffer().is_err());
    }
}
