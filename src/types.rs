//! Core data types shared across the capture pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Pixel format code (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");

    /// The 32-bit little-endian code the kernel uses for this format.
    #[must_use]
    pub const fn code(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Build a `FourCC` from the kernel's 32-bit code.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        Self(code.to_le_bytes())
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

/// Negotiated frame layout: code, dimensions, stride and byte size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat {
    /// Pixel format code.
    pub fourcc: FourCC,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per line (stride); filled in by the driver.
    pub bytes_per_line: u32,
    /// Total image size in bytes; filled in by the driver.
    pub size_image: u32,
}

impl PixelFormat {
    /// Build a format request. Stride and image size are left for the
    /// driver to report back after negotiation.
    #[must_use]
    pub const fn request(width: u32, height: u32, fourcc: FourCC) -> Self {
        Self {
            fourcc,
            width,
            height,
            bytes_per_line: 0,
            size_image: 0,
        }
    }

    /// Whether this format already satisfies a negotiation request for
    /// the given dimensions and code.
    #[must_use]
    pub fn matches(&self, width: u32, height: u32, fourcc: FourCC) -> bool {
        self.width == width && self.height == height && self.fourcc == fourcc
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}x{}", self.fourcc, self.width, self.height)
    }
}

/// One entry of the device's supported-format list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescription {
    /// Pixel format code.
    pub fourcc: FourCC,
    /// Human-readable description reported by the driver.
    pub description: String,
}

/// Device identity and capability flags.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Driver version.
    pub version: u32,
    /// Whether the device is a video capture device.
    pub can_capture: bool,
    /// Whether the device supports read/write I/O.
    pub can_read_write: bool,
    /// Whether the device supports streaming I/O.
    pub can_stream: bool,
}

/// The kind of a hardware control, with kind-specific data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    /// Plain integer control.
    Integer,
    /// On/off control.
    Boolean,
    /// Enumerated-choice control with its legal values and labels.
    Menu {
        /// Ordered mapping from legal integer value to label. Entries
        /// the device failed to label are absent.
        items: BTreeMap<i64, String>,
    },
    /// A control type this crate does not model.
    Unsupported {
        /// The raw type tag reported by the device.
        raw: u32,
    },
}

/// Snapshot of one hardware control. Becomes stale if the device is
/// reconfigured; re-enumerate when in doubt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    /// Numeric control id.
    pub id: u32,
    /// Human-readable name.
    pub name: String,
    /// Minimum accepted value.
    pub minimum: i32,
    /// Maximum accepted value.
    pub maximum: i32,
    /// Value step size.
    pub step: i32,
    /// Default value.
    pub default_value: i32,
    /// Control kind and kind-specific data.
    pub kind: ControlKind,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Bytes the driver reported as filled for this frame.
    pub bytes_used: u32,
}

/// An owned, self-contained captured frame. Independent of any device
/// buffer: its bytes are copied out before the source buffer is handed
/// back to the kernel.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame bytes, exactly `size_image` long for the format the
    /// frame was captured under.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per line.
    pub stride: u32,
    /// Pixel encoding.
    pub fourcc: FourCC,
    /// Driver-reported frame metadata.
    pub metadata: FrameMetadata,
}

/// Session lifecycle state. `Closed` is represented by dropping the
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Device is open; capabilities and current format are known.
    Opened,
    /// A format has been negotiated (or the current one accepted).
    Negotiated,
    /// The device is actively filling queued buffers.
    Streaming,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened => write!(f, "opened"),
            Self::Negotiated => write!(f, "negotiated"),
            Self::Streaming => write!(f, "streaming"),
        }
    }
}
