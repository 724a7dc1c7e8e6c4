// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Media-controller collaborators consumed by the pipeline handler.
//!
//! The handler never talks to kernel device nodes itself. Instead it works
//! against the capability-typed traits defined here:
//!
//! - [`DeviceEnumerator`] hands out [`MediaDevice`] graphs matching a
//!   [`DeviceMatch`], each graph at most once.
//! - [`MediaDevice`] exposes the graph's [`MediaEntity`] list and creates
//!   [`Subdevice`] and [`VideoDevice`] handles from entity names.
//! - [`Subdevice`] negotiates media-bus formats on its pads.
//! - [`VideoDevice`] is the capture sink: memory-format negotiation, buffer
//!   export/import, streaming and buffer-ready notification.
//!
//! All device calls are synchronous ioctl-equivalents returning
//! [`std::io::Result`]. Handles close their device node when dropped, so a
//! handle is released exactly once no matter which path discards it.
//!
//! [`crate::virtual_device`] provides an in-memory implementation of every
//! trait in this module.

use std::fmt;
use std::io;
use std::sync::mpsc::Sender;

use crate::buffer::{BufferEvent, FrameBuffer};
use crate::formats::{MediaBusCode, PixelFormat, PixelFormatInfo};
use crate::fourcc::FourCC;
use crate::geometry::Size;

/// Entity function as reported by the media controller (`MEDIA_ENT_F_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityFunction {
    /// Data streaming input/output video node
    IoV4l,
    /// Camera video sensor
    CamSensor,
    /// Lens controller
    Lens,
    /// Video interface bridge (e.g. MIPI CSI-2 receiver)
    VidIfBridge,
    /// Image signal processor
    ProcVideoIsp,
    /// Video scaler
    ProcVideoScaler,
    /// Pixel encoding converter
    ProcVideoPixelEncConv,
    /// Sub-device of unknown function
    V4l2SubdevUnknown,
    Other(u32),
}

impl EntityFunction {
    const IO_V4L: u32 = 0x0001_0001;
    const CAM_SENSOR: u32 = 0x0002_0001;
    const LENS: u32 = 0x0002_0003;
    const V4L2_SUBDEV_UNKNOWN: u32 = 0x0002_0000;
    const PROC_VIDEO_PIXEL_ENC_CONV: u32 = 0x4003;
    const PROC_VIDEO_SCALER: u32 = 0x4005;
    const PROC_VIDEO_ISP: u32 = 0x4009;
    const VID_IF_BRIDGE: u32 = 0x5002;

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            Self::IO_V4L => EntityFunction::IoV4l,
            Self::CAM_SENSOR => EntityFunction::CamSensor,
            Self::LENS => EntityFunction::Lens,
            Self::V4L2_SUBDEV_UNKNOWN => EntityFunction::V4l2SubdevUnknown,
            Self::PROC_VIDEO_PIXEL_ENC_CONV => EntityFunction::ProcVideoPixelEncConv,
            Self::PROC_VIDEO_SCALER => EntityFunction::ProcVideoScaler,
            Self::PROC_VIDEO_ISP => EntityFunction::ProcVideoIsp,
            Self::VID_IF_BRIDGE => EntityFunction::VidIfBridge,
            other => EntityFunction::Other(other),
        }
    }

    pub fn as_raw(&self) -> u32 {
        match self {
            EntityFunction::IoV4l => Self::IO_V4L,
            EntityFunction::CamSensor => Self::CAM_SENSOR,
            EntityFunction::Lens => Self::LENS,
            EntityFunction::V4l2SubdevUnknown => Self::V4L2_SUBDEV_UNKNOWN,
            EntityFunction::ProcVideoPixelEncConv => Self::PROC_VIDEO_PIXEL_ENC_CONV,
            EntityFunction::ProcVideoScaler => Self::PROC_VIDEO_SCALER,
            EntityFunction::ProcVideoIsp => Self::PROC_VIDEO_ISP,
            EntityFunction::VidIfBridge => Self::VID_IF_BRIDGE,
            EntityFunction::Other(raw) => *raw,
        }
    }
}

/// A named node in the media graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntity {
    id: u32,
    name: String,
    function: EntityFunction,
}

impl MediaEntity {
    pub fn new(id: u32, name: impl Into<String>, function: EntityFunction) -> Self {
        Self {
            id,
            name: name.into(),
            function,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self) -> EntityFunction {
        self.function
    }
}

impl fmt::Display for MediaEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({:#x})", self.name, self.function.as_raw())
    }
}

/// Criteria a media graph must satisfy to be acquired: the driver name and
/// a set of entity names that must all be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatch {
    driver: String,
    entities: Vec<String>,
}

impl DeviceMatch {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            entities: Vec::new(),
        }
    }

    pub fn add(&mut self, entity: impl Into<String>) {
        self.entities.push(entity.into());
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.add(entity);
        self
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    /// Whether a graph with `driver` and `entities` satisfies this match.
    pub fn matches(&self, driver: &str, entities: &[MediaEntity]) -> bool {
        driver == self.driver
            && self
                .entities
                .iter()
                .all(|wanted| entities.iter().any(|e| e.name() == wanted))
    }
}

/// Format negotiated on a sub-device pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubdeviceFormat {
    pub code: MediaBusCode,
    pub size: Size,
}

impl SubdeviceFormat {
    pub fn new(code: MediaBusCode, size: Size) -> Self {
        Self { code, size }
    }
}

impl fmt::Display for SubdeviceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.size, self.code)
    }
}

/// Per-plane memory layout of a video device format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneFormat {
    pub bytes_per_line: u32,
    pub size: u32,
}

/// Memory format negotiated on a video device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFormat {
    pub fourcc: FourCC,
    pub size: Size,
    pub planes: Vec<PlaneFormat>,
}

impl fmt::Display for DeviceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.size, self.fourcc)?;
        for (i, plane) in self.planes.iter().enumerate() {
            write!(f, " p{}:{}", i, plane.bytes_per_line)?;
        }
        Ok(())
    }
}

/// Source of media graphs.
pub trait DeviceEnumerator {
    /// Acquire the first not-yet-acquired graph satisfying `dm`. An acquired
    /// graph is never returned again for the lifetime of the enumerator.
    fn acquire(&mut self, dm: &DeviceMatch) -> Option<Box<dyn MediaDevice>>;
}

/// One media-controller graph.
pub trait MediaDevice: Send {
    fn driver(&self) -> &str;

    fn model(&self) -> &str;

    fn entities(&self) -> &[MediaEntity];

    /// Create a sub-device handle for the named entity. The handle is closed.
    fn subdevice(&self, entity: &str) -> io::Result<Box<dyn Subdevice>>;

    /// Create a video device handle for the named entity. The handle is closed.
    fn video_device(&self, entity: &str) -> io::Result<Box<dyn VideoDevice>>;

    /// Enable or disable the first link leaving `pad` of the named entity.
    fn setup_link(&mut self, entity: &str, pad: u32, enable: bool) -> io::Result<()>;
}

/// A V4L2 sub-device (sensor, lens, CSI receiver, ISP, scaler).
pub trait Subdevice: Send {
    fn entity_name(&self) -> &str;

    fn open(&mut self) -> io::Result<()>;

    fn is_open(&self) -> bool;

    /// Apply `format` to `pad`. The device may adjust the request; the
    /// adjusted value is written back into `format`.
    fn set_format(&mut self, pad: u32, format: &mut SubdeviceFormat) -> io::Result<()>;
}

/// A V4L2 capture video node.
pub trait VideoDevice: Send {
    fn entity_name(&self) -> &str;

    /// Route buffer-ready notifications to `sender`. Must be connected before
    /// [`open`](Self::open) so no completion can be lost.
    fn connect_buffer_ready(&mut self, sender: Sender<BufferEvent>);

    fn open(&mut self) -> io::Result<()>;

    fn is_open(&self) -> bool;

    /// Apply `format`. The device may adjust the request; the adjusted value
    /// is written back into `format`.
    fn set_format(&mut self, format: &mut DeviceFormat) -> io::Result<()>;

    /// Translate a pixel format to the fourcc this device expects.
    fn to_v4l2_pixel_format(&self, format: PixelFormat) -> FourCC {
        PixelFormatInfo::info(format)
            .map(|info| info.v4l2)
            .unwrap_or(format.fourcc())
    }

    fn export_buffers(&mut self, count: u32) -> io::Result<Vec<FrameBuffer>>;

    fn import_buffers(&mut self, count: u32) -> io::Result<()>;

    fn release_buffers(&mut self) -> io::Result<()>;

    /// Hand `buffer` to the device. A rejected buffer is returned with the
    /// error.
    fn queue_buffer(&mut self, buffer: FrameBuffer) -> Result<(), (io::Error, FrameBuffer)>;

    fn stream_on(&mut self) -> io::Result<()>;

    /// Stop streaming. Buffers still queued are returned through the
    /// buffer-ready channel with [`crate::buffer::FrameStatus::Cancelled`].
    fn stream_off(&mut self) -> io::Result<()>;
}
