//! Device session: the stateful owner of an open capture device.
//!
//! The session is not internally thread-safe. `capture()`, `start()`,
//! `stop()` and control mutation issue ioctls against a single file
//! descriptor and must be serialized externally per device.

use std::io;
use std::path::Path;

use tracing::{info, info_span, warn, Span};

use crate::device::V4l2Api;
use crate::enumerate;
use crate::error::{CameraError, Result};
use crate::pool::BufferPool;
use crate::traits::VideoDevice;
use crate::types::{
    Capabilities, Control, FormatDescription, FourCC, Frame, FrameMetadata, PixelFormat,
    StreamState,
};

/// Buffers requested from the driver on `start()`. The driver may
/// grant fewer; anything below 2 refuses to stream.
pub const REQUESTED_BUFFERS: u32 = 4;

/// A capture session over one open device.
///
/// Generic over the kernel seam so the full protocol can be exercised
/// against a mock; production code uses [`Camera<V4l2Api>`] via
/// [`Camera::open`].
pub struct Camera<A: VideoDevice = V4l2Api> {
    api: A,
    capabilities: Capabilities,
    format: PixelFormat,
    pool: Option<BufferPool>,
    state: StreamState,
    span: Span,
}

impl Camera<V4l2Api> {
    /// Open the device at `path` and query its capabilities and
    /// currently active format.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let label = path.as_ref().display().to_string();
        let api = V4l2Api::open(path.as_ref()).map_err(|source| CameraError::DeviceOpen {
            path: label.clone(),
            source,
        })?;
        Self::from_api(api, &label)
    }
}

impl<A: VideoDevice> Camera<A> {
    /// Build a session over an already-constructed kernel seam.
    /// `label` identifies the device in diagnostics.
    pub fn from_api(api: A, label: &str) -> Result<Self> {
        let span = info_span!("camera", device = %label);
        let capabilities;
        let format;
        {
            let _enter = span.enter();
            capabilities = api.capabilities().map_err(|source| CameraError::DeviceOpen {
                path: label.to_owned(),
                source,
            })?;
            format = api.current_format().map_err(|source| CameraError::DeviceOpen {
                path: label.to_owned(),
                source,
            })?;
            info!(
                driver = %capabilities.driver,
                card = %capabilities.card,
                bus = %capabilities.bus_info,
                read_write = capabilities.can_read_write,
                streaming = capabilities.can_stream,
                "device opened"
            );
            info!(format = %format, "current pixel format");
        }
        Ok(Self {
            api,
            capabilities,
            format,
            pool: None,
            state: StreamState::Opened,
            span,
        })
    }

    /// Cached device capability flags.
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The session's lifecycle state.
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// The currently negotiated format — always the driver-reported
    /// ground truth, never a caller's unconfirmed request.
    pub const fn current_format(&self) -> &PixelFormat {
        &self.format
    }

    /// A filesystem-friendly device name derived from the card name.
    pub fn camera_name(&self) -> String {
        self.capabilities.card.to_lowercase().replace(' ', "_")
    }

    /// List the device's supported pixel formats. Restartable: every
    /// call re-queries from scratch.
    pub fn list_formats(&self) -> Result<Vec<FormatDescription>> {
        enumerate::formats(&self.api)
    }

    /// List the device's available controls. Restartable; the returned
    /// snapshot goes stale if the device is reconfigured.
    pub fn list_controls(&self) -> Result<Vec<Control>> {
        enumerate::controls(&self.api)
    }

    /// Read a single control value by numeric id.
    pub fn control_value(&self, id: u32) -> Result<i32> {
        self.api
            .control_value(id)
            .map_err(|source| CameraError::ControlQuery { id, source })
    }

    /// Write a single control value by numeric id.
    ///
    /// The control must be settable on this device; the value itself is
    /// forwarded unmodified — no software range check — and the device
    /// decides whether to accept it.
    pub fn set_control(&mut self, id: u32, value: i32) -> Result<()> {
        let _enter = self.span.enter();
        self.api
            .query_control(id)
            .map_err(|source| CameraError::ControlUnsupported { id, source })?;
        self.api.write_control(id, value).map_err(|source| {
            warn!(id, value, error = %source, "control rejected");
            CameraError::ControlRejected { id, value, source }
        })?;
        info!(id, value, "control set");
        Ok(())
    }

    /// Negotiate pixel format and size.
    ///
    /// If the request already matches the current format this is a
    /// no-op returning success. Otherwise the request is submitted and
    /// whatever format the driver actually configured — which may
    /// silently differ from the request — is stored and returned. After
    /// a rejected request the current format is re-read so the session
    /// keeps reflecting ground truth.
    ///
    /// Must not be called while streaming; stop first.
    pub fn negotiate_format(
        &mut self,
        width: u32,
        height: u32,
        fourcc: FourCC,
    ) -> Result<PixelFormat> {
        let _enter = self.span.clone().entered();
        if self.state == StreamState::Streaming {
            return Err(CameraError::InvalidState {
                operation: "negotiate a format",
                state: self.state,
            });
        }

        if self.format.matches(width, height, fourcc) {
            self.note_negotiated();
            return Ok(self.format.clone());
        }

        info!(request = %PixelFormat::request(width, height, fourcc), "requesting format");
        match self
            .api
            .request_format(&PixelFormat::request(width, height, fourcc))
        {
            Ok(actual) => {
                info!(format = %actual, "format negotiated");
                self.format = actual.clone();
                self.note_negotiated();
                Ok(actual)
            }
            Err(source) => {
                // Last-known-good: the device keeps whatever was active
                // before; re-read it rather than trusting our cache.
                if let Ok(current) = self.api.current_format() {
                    self.format = current;
                }
                warn!(error = %source, "format request rejected");
                Err(CameraError::FormatRejected(source))
            }
        }
    }

    /// Allocate and queue the buffer pool, then enable the hardware
    /// stream. On any failure the pool is fully torn down and the
    /// session stays out of the streaming state.
    pub fn start(&mut self) -> Result<()> {
        let _enter = self.span.enter();
        if self.state == StreamState::Streaming {
            return Err(CameraError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }

        let pool = BufferPool::allocate(&mut self.api, REQUESTED_BUFFERS)?;

        #[allow(clippy::cast_possible_truncation)]
        let count = pool.len() as u32;
        for index in 0..count {
            if let Err(source) = self.api.queue_buffer(index) {
                pool.release(&mut self.api);
                return Err(CameraError::StreamStart { source });
            }
        }

        if let Err(source) = self.api.stream_on() {
            pool.release(&mut self.api);
            return Err(CameraError::StreamStart { source });
        }

        info!(buffers = count, "streaming started");
        self.pool = Some(pool);
        self.state = StreamState::Streaming;
        Ok(())
    }

    /// Disable the hardware stream and release the buffer pool.
    ///
    /// Best-effort: the pool is unmapped and freed even if the disable
    /// ioctl fails, since kernel-side buffers are undefined once
    /// streaming is off. A no-op when not streaming.
    pub fn stop(&mut self) -> Result<()> {
        let _enter = self.span.enter();
        if self.state != StreamState::Streaming {
            return Ok(());
        }

        let disabled = self.api.stream_off();
        if let Some(pool) = self.pool.take() {
            pool.release(&mut self.api);
        }
        self.state = StreamState::Negotiated;
        info!("streaming stopped");
        disabled.map_err(|source| CameraError::StreamStop { source })
    }

    /// Capture one frame: dequeue a filled buffer, copy its bytes into
    /// an owned [`Frame`], requeue the buffer, return the frame.
    ///
    /// Blocks until the device has a frame ready. A requeue failure is
    /// surfaced as an error — the buffer is lost to the pool and the
    /// caller should stop and restart streaming.
    pub fn capture(&mut self) -> Result<Frame> {
        let pool = self.pool.as_ref().ok_or(CameraError::InvalidState {
            operation: "capture",
            state: self.state,
        })?;

        let dequeued = self
            .api
            .dequeue_buffer()
            .map_err(|source| CameraError::Capture { source })?;

        // The copy is the safety boundary: it must finish before the
        // buffer is handed back to the kernel.
        let wanted = self.format.size_image as usize;
        let data = match pool.buffer(dequeued.index) {
            Some(buffer) if buffer.len() >= wanted => buffer.copy_out(wanted),
            _ => {
                let _ = self.api.queue_buffer(dequeued.index);
                return Err(CameraError::Capture {
                    source: io::Error::new(
                        io::ErrorKind::InvalidData,
                        "dequeued buffer does not cover the negotiated image size",
                    ),
                });
            }
        };

        self.api
            .queue_buffer(dequeued.index)
            .map_err(|source| CameraError::Capture { source })?;

        Ok(Frame {
            data,
            width: self.format.width,
            height: self.format.height,
            stride: self.format.bytes_per_line,
            fourcc: self.format.fourcc,
            metadata: FrameMetadata {
                sequence: dequeued.sequence,
                timestamp: dequeued.timestamp,
                bytes_used: dequeued.bytes_used,
            },
        })
    }

    /// Look up a control snapshot by name from a fresh enumeration.
    /// Convenience for callers addressing controls symbolically.
    pub fn find_control(&self, name: &str) -> Result<Option<Control>> {
        Ok(self
            .list_controls()?
            .into_iter()
            .find(|control| control.name == name))
    }

    fn note_negotiated(&mut self) {
        if self.state == StreamState::Opened {
            self.state = StreamState::Negotiated;
        }
    }
}

impl<A: VideoDevice> Drop for Camera<A> {
    fn drop(&mut self) {
        if self.state == StreamState::Streaming {
            let _ = self.stop();
        }
    }
}
