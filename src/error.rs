//! Error taxonomy for capture operations.

use std::io;

use thiserror::Error;

use crate::types::StreamState;

/// Error type for camera operations.
///
/// Failed format and control requests leave the device in its
/// last-known-good state; the session re-reads ground truth from the
/// device after any rejected attempt.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The device could not be opened or its capabilities queried.
    #[error("failed to open device {path}: {source}")]
    DeviceOpen {
        /// Device path.
        path: String,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The device refused a format request.
    #[error("device rejected format request: {0}")]
    FormatRejected(#[source] io::Error),

    /// The control cannot be set on this device.
    #[error("control {id:#010x} is not settable: {source}")]
    ControlUnsupported {
        /// Numeric control id.
        id: u32,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The device refused the specific value for a control.
    #[error("device rejected value {value} for control {id:#010x}: {source}")]
    ControlRejected {
        /// Numeric control id.
        id: u32,
        /// The forwarded value.
        value: i32,
        /// Underlying OS error.
        source: io::Error,
    },

    /// Reading a control value failed.
    #[error("failed to read control {id:#010x}: {source}")]
    ControlQuery {
        /// Numeric control id.
        id: u32,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The driver granted fewer buffers than streaming requires.
    #[error("driver granted {granted} buffer(s), streaming requires at least 2")]
    InsufficientBuffers {
        /// Number of buffers the driver actually granted.
        granted: u32,
    },

    /// Mapping a granted buffer into the process failed.
    #[error("failed to map buffer {index}: {source}")]
    MemoryMap {
        /// Buffer index within the pool.
        index: u32,
        /// Underlying OS error.
        source: io::Error,
    },

    /// Queueing buffers or enabling the stream failed.
    #[error("failed to start streaming: {source}")]
    StreamStart {
        /// Underlying OS error.
        source: io::Error,
    },

    /// Disabling the stream failed. Buffers are released regardless.
    #[error("failed to stop streaming: {source}")]
    StreamStop {
        /// Underlying OS error.
        source: io::Error,
    },

    /// A single dequeue or requeue failed. Not retried by the core;
    /// repeated failures usually indicate device disconnection.
    #[error("capture failed: {source}")]
    Capture {
        /// Underlying OS error.
        source: io::Error,
    },

    /// The operation is not valid in the session's current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The session state at the time of the call.
        state: StreamState,
    },

    /// Other I/O error (e.g., during enumeration).
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;
