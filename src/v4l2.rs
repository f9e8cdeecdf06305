//! Raw Video4Linux2 kernel ABI: ioctl request codes, the `videodev2.h`
//! structs this crate consumes, and the mmap region lifetime.
//!
//! All `unsafe` in the crate is confined to this module. The rest of
//! the crate only sees safe wrappers: `xioctl`, typed constructors for
//! the request structs, and `MmapRegion` with a copy-out accessor.

#![allow(unsafe_code)]
#![allow(non_camel_case_types)]
#![allow(missing_docs)]

use std::io;
use std::mem::size_of;
use std::os::unix::io::RawFd;

// Buffer and memory types (single-plane capture only).
pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const V4L2_MEMORY_MMAP: u32 = 1;

// Capability flags.
pub const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
pub const V4L2_CAP_READWRITE: u32 = 0x0100_0000;
pub const V4L2_CAP_STREAMING: u32 = 0x0400_0000;

// Control enumeration.
pub const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0000_0001;
pub const V4L2_CTRL_FLAG_NEXT_CTRL: u32 = 0x8000_0000;
pub const V4L2_CID_USER_CLASS: u32 = 0x0098_0001;

// Control types this crate models; anything else maps to
// `ControlKind::Unsupported`.
pub const V4L2_CTRL_TYPE_INTEGER: u32 = 1;
pub const V4L2_CTRL_TYPE_BOOLEAN: u32 = 2;
pub const V4L2_CTRL_TYPE_MENU: u32 = 3;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_pix_format {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub bytesperline: u32,
    pub sizeimage: u32,
    pub colorspace: u32,
    pub priv_: u32,
    pub flags: u32,
    pub ycbcr_enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

/// The `fmt` union of `v4l2_format`. Only the single-plane pix member
/// is used; `raw` pads the union to the kernel's 200 bytes and forces
/// the kernel's 8-byte alignment.
#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_format_fmt {
    pub pix: v4l2_pix_format,
    pub raw: [u64; 25],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_format {
    pub type_: u32,
    pub fmt: v4l2_format_fmt,
}

impl v4l2_format {
    /// A zeroed single-plane capture format request.
    pub fn capture() -> Self {
        let mut format: Self = zeroed();
        format.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        format
    }

    /// Read access to the single-plane pixel format member.
    pub fn pix(&self) -> &v4l2_pix_format {
        // SAFETY: this crate only builds VIDEO_CAPTURE formats, for
        // which the kernel populates the `pix` member.
        unsafe { &self.fmt.pix }
    }

    /// Write access to the single-plane pixel format member.
    pub fn pix_mut(&mut self) -> &mut v4l2_pix_format {
        // SAFETY: all union members are plain-old-data; writing through
        // `pix` is always in-bounds.
        unsafe { &mut self.fmt.pix }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_fmtdesc {
    pub index: u32,
    pub type_: u32,
    pub flags: u32,
    pub description: [u8; 32],
    pub pixelformat: u32,
    pub reserved: [u32; 4],
}

impl v4l2_fmtdesc {
    /// A capture-type descriptor query for the given enumeration index.
    pub fn at_index(index: u32) -> Self {
        let mut desc: Self = zeroed();
        desc.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        desc.index = index;
        desc
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_requestbuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub reserved: [u32; 2],
}

impl v4l2_requestbuffers {
    /// A request for `count` mmap capture buffers (0 frees the pool).
    pub fn mmap(count: u32) -> Self {
        let mut request: Self = zeroed();
        request.count = count;
        request.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        request.memory = V4L2_MEMORY_MMAP;
        request
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_buffer_m {
    pub offset: u32,
    pub userptr: libc::c_ulong,
    pub fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: v4l2_timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: v4l2_buffer_m,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: u32,
}

impl v4l2_buffer {
    /// A zeroed mmap capture buffer request, optionally addressing one
    /// pool index (dequeue leaves the index for the kernel to fill).
    pub fn mmap(index: Option<u32>) -> Self {
        let mut buffer: Self = zeroed();
        buffer.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buffer.memory = V4L2_MEMORY_MMAP;
        buffer.index = index.unwrap_or(0);
        buffer
    }

    /// The mmap offset member of the memory union.
    pub fn offset(&self) -> u32 {
        // SAFETY: this crate only uses V4L2_MEMORY_MMAP buffers, for
        // which the kernel populates `m.offset`.
        unsafe { self.m.offset }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_queryctrl {
    pub id: u32,
    pub type_: u32,
    pub name: [u8; 32],
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
    pub flags: u32,
    pub reserved: [u32; 2],
}

impl v4l2_queryctrl {
    /// A control query for the given id (which may carry
    /// `V4L2_CTRL_FLAG_NEXT_CTRL`).
    pub fn for_id(id: u32) -> Self {
        let mut query: Self = zeroed();
        query.id = id;
        query
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_querymenu_un {
    pub name: [u8; 32],
    pub value: i64,
}

// Packed in the kernel header.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct v4l2_querymenu {
    pub id: u32,
    pub index: u32,
    pub un: v4l2_querymenu_un,
    pub reserved: u32,
}

impl v4l2_querymenu {
    /// A menu label query for one legal value of a menu control.
    pub fn for_item(id: u32, index: u32) -> Self {
        let mut query: Self = zeroed();
        query.id = id;
        query.index = index;
        query
    }

    /// The label reported by the driver.
    pub fn label(&self) -> String {
        // SAFETY: for V4L2_CTRL_TYPE_MENU controls the kernel fills the
        // `name` member. Copied out by value; the struct is packed.
        let name = unsafe { self.un.name };
        text(&name)
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_control {
    pub id: u32,
    pub value: i32,
}

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// Encode a `_IOC` ioctl request number for the 'V' (video) magic.
const fn vidioc(dir: u32, nr: u32, size: usize) -> libc::c_ulong {
    ((dir << 30) | ((size as u32) << 16) | ((b'V' as u32) << 8) | nr) as libc::c_ulong
}

pub const VIDIOC_QUERYCAP: libc::c_ulong = vidioc(IOC_READ, 0, size_of::<v4l2_capability>());
pub const VIDIOC_ENUM_FMT: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 2, size_of::<v4l2_fmtdesc>());
pub const VIDIOC_G_FMT: libc::c_ulong = vidioc(IOC_READ | IOC_WRITE, 4, size_of::<v4l2_format>());
pub const VIDIOC_S_FMT: libc::c_ulong = vidioc(IOC_READ | IOC_WRITE, 5, size_of::<v4l2_format>());
pub const VIDIOC_REQBUFS: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 8, size_of::<v4l2_requestbuffers>());
pub const VIDIOC_QUERYBUF: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 9, size_of::<v4l2_buffer>());
pub const VIDIOC_QBUF: libc::c_ulong = vidioc(IOC_READ | IOC_WRITE, 15, size_of::<v4l2_buffer>());
pub const VIDIOC_DQBUF: libc::c_ulong = vidioc(IOC_READ | IOC_WRITE, 17, size_of::<v4l2_buffer>());
pub const VIDIOC_STREAMON: libc::c_ulong = vidioc(IOC_WRITE, 18, size_of::<libc::c_int>());
pub const VIDIOC_STREAMOFF: libc::c_ulong = vidioc(IOC_WRITE, 19, size_of::<libc::c_int>());
pub const VIDIOC_G_CTRL: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 27, size_of::<v4l2_control>());
pub const VIDIOC_S_CTRL: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 28, size_of::<v4l2_control>());
pub const VIDIOC_QUERYCTRL: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 36, size_of::<v4l2_queryctrl>());
pub const VIDIOC_QUERYMENU: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 37, size_of::<v4l2_querymenu>());

/// Zero-initialize a videodev2 request struct. Only used for the
/// plain-old-data `#[repr(C)]` types in this module.
fn zeroed<T: Copy>() -> T {
    // SAFETY: callers are the constructors above; all-zero bytes are a
    // valid value for every videodev2 struct this module defines.
    unsafe { std::mem::zeroed() }
}

/// Issue an ioctl against the device, retrying on `EINTR`.
pub fn xioctl<T>(fd: RawFd, request: libc::c_ulong, arg: &mut T) -> io::Result<()> {
    loop {
        // SAFETY: `request` is one of the VIDIOC_* constants above and
        // `arg` is the matching videodev2 struct, so the kernel writes
        // stay within the argument.
        let rc = unsafe { libc::ioctl(fd, request as _, (arg as *mut T).cast::<libc::c_void>()) };
        if rc != -1 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// Decode a NUL-terminated byte array from a videodev2 struct.
pub fn text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(bytes.get(..end).unwrap_or(bytes)).into_owned()
}

/// A kernel buffer mapped into the process. Unmapped on drop; the
/// bytes are only reachable through [`MmapRegion::copy_out`], so no
/// reference to the shared memory can outlive the mapping.
#[derive(Debug)]
pub struct MmapRegion {
    ptr: *mut libc::c_void,
    len: usize,
}

// The region is an owned mapping; nothing in it is tied to the thread
// that created it.
unsafe impl Send for MmapRegion {}

impl MmapRegion {
    /// Map `len` bytes of device memory at the driver-reported offset.
    pub fn map(fd: RawFd, offset: u32, len: u32) -> io::Result<Self> {
        // SAFETY: fd is an open V4L2 device and offset/len come from
        // VIDIOC_QUERYBUF for that device.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len as usize,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                libc::off_t::from(offset),
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            ptr,
            len: len as usize,
        })
    }

    /// Mapping length in bytes.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the mapping is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy up to `len` bytes out of the mapping into owned storage.
    pub fn copy_out(&self, len: usize) -> Vec<u8> {
        let n = len.min(self.len);
        let mut out = vec![0u8; n];
        // SAFETY: `n` is clamped to the mapping length and `out` was
        // just allocated with `n` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.cast::<u8>(), out.as_mut_ptr(), n);
        }
        out
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/len came from a successful mmap and the region is
        // mapped exactly once.
        unsafe {
            libc::munmap(self.ptr, self.len);
        }
    }
}
