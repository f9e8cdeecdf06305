//! Real kernel backend: `VideoDevice` over an open V4L2 file handle.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::time::Duration;

use crate::pool::MappedBuffer;
use crate::traits::{DequeuedBuffer, RawControl, VideoDevice};
use crate::types::{Capabilities, FormatDescription, FourCC, PixelFormat};
use crate::v4l2;

/// An open V4L2 capture device. The file handle closes on drop.
pub struct V4l2Api {
    file: File,
}

impl V4l2Api {
    /// Open the device node read/write.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

fn pixel_format_from(pix: &v4l2::v4l2_pix_format) -> PixelFormat {
    PixelFormat {
        fourcc: FourCC::from_code(pix.pixelformat),
        width: pix.width,
        height: pix.height,
        bytes_per_line: pix.bytesperline,
        size_image: pix.sizeimage,
    }
}

fn raw_control_from(query: &v4l2::v4l2_queryctrl) -> RawControl {
    RawControl {
        id: query.id,
        name: v4l2::text(&query.name),
        control_type: query.type_,
        minimum: query.minimum,
        maximum: query.maximum,
        step: query.step,
        default_value: query.default_value,
        disabled: query.flags & v4l2::V4L2_CTRL_FLAG_DISABLED != 0,
    }
}

/// V4L2 timestamps are non-negative in practice.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn timestamp_from(tv: &libc::timeval) -> Duration {
    let secs = tv.tv_sec.max(0) as u64;
    let nanos = (tv.tv_usec.max(0) as u32).saturating_mul(1000);
    Duration::new(secs, nanos)
}

/// Enumeration loops treat these as the expected end-of-list signal
/// rather than an error.
fn ends_enumeration(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EINVAL) | Some(libc::ENOTTY)
    )
}

impl VideoDevice for V4l2Api {
    fn capabilities(&self) -> io::Result<Capabilities> {
        let mut caps = v4l2::v4l2_capability {
            driver: [0; 16],
            card: [0; 32],
            bus_info: [0; 32],
            version: 0,
            capabilities: 0,
            device_caps: 0,
            reserved: [0; 3],
        };
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_QUERYCAP, &mut caps)?;
        Ok(Capabilities {
            driver: v4l2::text(&caps.driver),
            card: v4l2::text(&caps.card),
            bus_info: v4l2::text(&caps.bus_info),
            version: caps.version,
            can_capture: caps.capabilities & v4l2::V4L2_CAP_VIDEO_CAPTURE != 0,
            can_read_write: caps.capabilities & v4l2::V4L2_CAP_READWRITE != 0,
            can_stream: caps.capabilities & v4l2::V4L2_CAP_STREAMING != 0,
        })
    }

    fn current_format(&self) -> io::Result<PixelFormat> {
        let mut format = v4l2::v4l2_format::capture();
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_G_FMT, &mut format)?;
        Ok(pixel_format_from(format.pix()))
    }

    fn request_format(&mut self, request: &PixelFormat) -> io::Result<PixelFormat> {
        let mut format = v4l2::v4l2_format::capture();
        {
            let pix = format.pix_mut();
            pix.width = request.width;
            pix.height = request.height;
            pix.pixelformat = request.fourcc.code();
        }
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_S_FMT, &mut format)?;
        // The driver writes back whatever it actually configured.
        Ok(pixel_format_from(format.pix()))
    }

    fn format_description(&self, index: u32) -> io::Result<Option<FormatDescription>> {
        let mut desc = v4l2::v4l2_fmtdesc::at_index(index);
        match v4l2::xioctl(self.fd(), v4l2::VIDIOC_ENUM_FMT, &mut desc) {
            Ok(()) => Ok(Some(FormatDescription {
                fourcc: FourCC::from_code(desc.pixelformat),
                description: v4l2::text(&desc.description),
            })),
            Err(err) if ends_enumeration(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn query_control(&self, id: u32) -> io::Result<RawControl> {
        let mut query = v4l2::v4l2_queryctrl::for_id(id);
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_QUERYCTRL, &mut query)?;
        Ok(raw_control_from(&query))
    }

    fn next_control(&self, id: u32) -> io::Result<Option<RawControl>> {
        let mut query = v4l2::v4l2_queryctrl::for_id(id);
        match v4l2::xioctl(self.fd(), v4l2::VIDIOC_QUERYCTRL, &mut query) {
            Ok(()) => Ok(Some(raw_control_from(&query))),
            Err(err) if ends_enumeration(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn menu_label(&self, id: u32, index: u32) -> Option<String> {
        let mut query = v4l2::v4l2_querymenu::for_item(id, index);
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_QUERYMENU, &mut query)
            .ok()
            .map(|()| query.label())
    }

    fn control_value(&self, id: u32) -> io::Result<i32> {
        let mut control = v4l2::v4l2_control { id, value: 0 };
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_G_CTRL, &mut control)?;
        Ok(control.value)
    }

    fn write_control(&mut self, id: u32, value: i32) -> io::Result<()> {
        let mut control = v4l2::v4l2_control { id, value };
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_S_CTRL, &mut control)
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        let mut request = v4l2::v4l2_requestbuffers::mmap(count);
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_REQBUFS, &mut request)?;
        Ok(request.count)
    }

    fn map_buffer(&mut self, index: u32) -> io::Result<MappedBuffer> {
        let mut buffer = v4l2::v4l2_buffer::mmap(Some(index));
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_QUERYBUF, &mut buffer)?;
        let region = v4l2::MmapRegion::map(self.fd(), buffer.offset(), buffer.length)?;
        Ok(MappedBuffer::from_region(region))
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        let mut buffer = v4l2::v4l2_buffer::mmap(Some(index));
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_QBUF, &mut buffer)
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        let mut buffer = v4l2::v4l2_buffer::mmap(None);
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_DQBUF, &mut buffer)?;
        Ok(DequeuedBuffer {
            index: buffer.index,
            bytes_used: buffer.bytesused,
            sequence: buffer.sequence,
            timestamp: timestamp_from(&buffer.timestamp),
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        let mut kind: libc::c_int = v4l2::V4L2_BUF_TYPE_VIDEO_CAPTURE as libc::c_int;
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_STREAMON, &mut kind)
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let mut kind: libc::c_int = v4l2::V4L2_BUF_TYPE_VIDEO_CAPTURE as libc::c_int;
        v4l2::xioctl(self.fd(), v4l2::VIDIOC_STREAMOFF, &mut kind)
    }
}
