// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Media-bus codes, caller-facing pixel formats and pixel format metadata.
//!
//! Two different encodings meet in an ISP pipeline:
//!
//! - [`MediaBusCode`] identifies the pixel encoding on the wire between two
//!   sub-devices (sensor → CSI receiver → ISP → scaler). Values follow
//!   `linux/media-bus-format.h`.
//! - [`PixelFormat`] identifies the in-memory layout delivered to the
//!   application. Values are DRM fourccs; the capture sink is programmed with
//!   the equivalent V4L2 fourcc obtained from [`PixelFormatInfo::v4l2`].
//!
//! [`PixelFormatInfo`] provides the stride and frame-size rules used to size
//! capture buffers.

use std::fmt;

use crate::fourcc::FourCC;
use crate::geometry::Size;

/// Media-bus pixel code (`MEDIA_BUS_FMT_*`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MediaBusCode(pub u32);

impl MediaBusCode {
    pub const FIXED: MediaBusCode = MediaBusCode(0x0001);
    pub const RGB888_1X24: MediaBusCode = MediaBusCode(0x100a);
    pub const RBG888_1X24: MediaBusCode = MediaBusCode(0x100e);
    pub const BGR888_1X24: MediaBusCode = MediaBusCode(0x1013);
    pub const UYVY8_1X16: MediaBusCode = MediaBusCode(0x200f);
    pub const YUV8_1X24: MediaBusCode = MediaBusCode(0x2025);
    pub const SRGGB10_1X10: MediaBusCode = MediaBusCode(0x300f);

    /// Symbolic name without the `MEDIA_BUS_FMT_` prefix, if known.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            MediaBusCode::FIXED => "FIXED",
            MediaBusCode::RGB888_1X24 => "RGB888_1X24",
            MediaBusCode::RBG888_1X24 => "RBG888_1X24",
            MediaBusCode::BGR888_1X24 => "BGR888_1X24",
            MediaBusCode::UYVY8_1X16 => "UYVY8_1X16",
            MediaBusCode::YUV8_1X24 => "YUV8_1X24",
            MediaBusCode::SRGGB10_1X10 => "SRGGB10_1X10",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for MediaBusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:04x}", self.0),
        }
    }
}

impl fmt::Debug for MediaBusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MediaBusCode({})", self)
    }
}

/// Application-facing pixel format, identified by its DRM fourcc.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PixelFormat(pub FourCC);

impl PixelFormat {
    pub const YUYV: PixelFormat = PixelFormat(FourCC::new(b"YUYV"));
    pub const RGB888: PixelFormat = PixelFormat(FourCC::new(b"RG24"));
    pub const BGR888: PixelFormat = PixelFormat(FourCC::new(b"BG24"));
    pub const RBG888: PixelFormat = PixelFormat(FourCC::new(b"RB24"));

    pub fn fourcc(&self) -> FourCC {
        self.0
    }

    /// Look up a pixel format by its conventional name (e.g. "RGB888").
    pub fn from_name(name: &str) -> Option<PixelFormat> {
        PIXEL_FORMAT_INFO
            .iter()
            .find(|info| info.name.eq_ignore_ascii_case(name))
            .map(|info| info.format)
    }

    pub fn info(&self) -> Option<&'static PixelFormatInfo> {
        PixelFormatInfo::info(*self)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.info() {
            Some(info) => f.write_str(info.name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PixelFormat({})", self)
    }
}

/// Per-plane layout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneInfo {
    /// Bytes occupied by one pixel group in this plane
    pub bytes_per_group: u32,
    /// Vertical subsampling factor of this plane
    pub vertical_sub_sampling: u32,
}

/// Static description of a pixel format's memory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormatInfo {
    pub name: &'static str,
    pub format: PixelFormat,
    /// Equivalent V4L2 fourcc programmed on the capture video node
    pub v4l2: FourCC,
    pub bits_per_pixel: u32,
    /// Number of pixels stored together in one group
    pub pixels_per_group: u32,
    pub num_planes: u32,
    pub planes: [PlaneInfo; 3],
}

const NO_PLANE: PlaneInfo = PlaneInfo {
    bytes_per_group: 0,
    vertical_sub_sampling: 0,
};

const fn packed(bytes_per_group: u32) -> [PlaneInfo; 3] {
    [
        PlaneInfo {
            bytes_per_group,
            vertical_sub_sampling: 1,
        },
        NO_PLANE,
        NO_PLANE,
    ]
}

static PIXEL_FORMAT_INFO: &[PixelFormatInfo] = &[
    PixelFormatInfo {
        name: "YUYV",
        format: PixelFormat::YUYV,
        v4l2: FourCC::new(b"YUYV"),
        bits_per_pixel: 16,
        pixels_per_group: 2,
        num_planes: 1,
        planes: packed(4),
    },
    PixelFormatInfo {
        name: "RGB888",
        format: PixelFormat::RGB888,
        v4l2: FourCC::new(b"BGR3"),
        bits_per_pixel: 24,
        pixels_per_group: 1,
        num_planes: 1,
        planes: packed(3),
    },
    PixelFormatInfo {
        name: "BGR888",
        format: PixelFormat::BGR888,
        v4l2: FourCC::new(b"RGB3"),
        bits_per_pixel: 24,
        pixels_per_group: 1,
        num_planes: 1,
        planes: packed(3),
    },
    // Vendor-specific ordering produced by the ISP's RBG888 output.
    PixelFormatInfo {
        name: "RBG888",
        format: PixelFormat::RBG888,
        v4l2: FourCC::new(b"RBG3"),
        bits_per_pixel: 24,
        pixels_per_group: 1,
        num_planes: 1,
        planes: packed(3),
    },
];

fn align_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

impl PixelFormatInfo {
    pub fn info(format: PixelFormat) -> Option<&'static PixelFormatInfo> {
        PIXEL_FORMAT_INFO.iter().find(|info| info.format == format)
    }

    pub fn all() -> &'static [PixelFormatInfo] {
        PIXEL_FORMAT_INFO
    }

    /// Bytes per line of `plane` for a frame `width` pixels wide, rounded up
    /// to a multiple of `align` bytes (0 or 1 disables alignment).
    pub fn stride(&self, width: u32, plane: usize, align: u32) -> u32 {
        let Some(plane) = self.planes.get(plane) else {
            return 0;
        };
        if plane.bytes_per_group == 0 {
            return 0;
        }

        let groups = width.div_ceil(self.pixels_per_group);
        align_up(groups * plane.bytes_per_group, align)
    }

    /// Total bytes for one frame, summed over every plane.
    pub fn frame_size(&self, size: Size, align: u32) -> u32 {
        (0..self.num_planes as usize)
            .map(|i| {
                let plane = &self.planes[i];
                let height = size.height.div_ceil(plane.vertical_sub_sampling.max(1));
                self.stride(size.width, i, align) * height
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_code_display() {
        assert_eq!(MediaBusCode::SRGGB10_1X10.to_string(), "SRGGB10_1X10");
        assert_eq!(MediaBusCode::RBG888_1X24.to_string(), "RBG888_1X24");
        assert_eq!(MediaBusCode(0x1234).to_string(), "0x1234");
    }

    #[test]
    fn test_packed_rgb_stride() {
        let info = PixelFormatInfo::info(PixelFormat::RBG888).unwrap();
        assert_eq!(info.stride(640, 0, 0), 1920);
        assert_eq!(info.frame_size(Size::new(640, 480), 1), 1920 * 480);
        assert_eq!(info.stride(642, 0, 64), 1984);
    }

    #[test]
    fn test_yuyv_rounds_odd_width_to_group() {
        let info = PixelFormatInfo::info(PixelFormat::YUYV).unwrap();
        assert_eq!(info.stride(641, 0, 0), 1284);
        assert_eq!(info.stride(640, 1, 0), 0);
    }

    #[test]
    fn test_pixel_format_names() {
        assert_eq!(PixelFormat::from_name("rgb888"), Some(PixelFormat::RGB888));
        assert_eq!(PixelFormat::from_name("NV12"), None);
        assert_eq!(PixelFormat::BGR888.to_string(), "BGR888");
        assert_eq!(PixelFormat(FourCC::new(b"XR24")).to_string(), "XR24");
    }
}
