//! Read-only enumeration of supported formats and available controls.
//!
//! Both queries are restartable: every call re-lists from scratch and
//! returns an in-memory snapshot that goes stale if the device is
//! reconfigured.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::traits::VideoDevice;
use crate::types::{Control, ControlKind, FormatDescription};
use crate::v4l2;

/// List the device's supported pixel formats by indexed query until
/// the device signals the end of the list.
pub(crate) fn formats<A: VideoDevice>(api: &A) -> Result<Vec<FormatDescription>> {
    let mut formats = Vec::new();
    let mut index = 0;
    while let Some(description) = api.format_description(index)? {
        formats.push(description);
        index += 1;
    }
    Ok(formats)
}

/// List the device's available controls using the next-control query
/// pattern, which advances by id rather than by index. Disabled
/// controls are skipped. For menu controls, every legal value in
/// `[minimum, maximum]` is queried for a label; values the device
/// declines to label are omitted from the mapping.
pub(crate) fn controls<A: VideoDevice>(api: &A) -> Result<Vec<Control>> {
    let mut controls = Vec::new();
    let mut id = v4l2::V4L2_CID_USER_CLASS | v4l2::V4L2_CTRL_FLAG_NEXT_CTRL;

    while let Some(raw) = api.next_control(id)? {
        // Advance before any skip, or a disabled control would be
        // queried forever.
        id = raw.id | v4l2::V4L2_CTRL_FLAG_NEXT_CTRL;
        if raw.disabled {
            continue;
        }

        let kind = match raw.control_type {
            v4l2::V4L2_CTRL_TYPE_INTEGER => ControlKind::Integer,
            v4l2::V4L2_CTRL_TYPE_BOOLEAN => ControlKind::Boolean,
            v4l2::V4L2_CTRL_TYPE_MENU => {
                let mut items = BTreeMap::new();
                for value in raw.minimum..=raw.maximum {
                    if let Ok(index) = u32::try_from(value) {
                        if let Some(label) = api.menu_label(raw.id, index) {
                            items.insert(i64::from(value), label);
                        }
                    }
                }
                ControlKind::Menu { items }
            }
            other => ControlKind::Unsupported { raw: other },
        };

        controls.push(Control {
            id: raw.id,
            name: raw.name,
            minimum: raw.minimum,
            maximum: raw.maximum,
            step: raw.step,
            default_value: raw.default_value,
            kind,
        });
    }

    Ok(controls)
}
