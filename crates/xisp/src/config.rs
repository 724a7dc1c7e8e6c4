// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Stream configuration: the format catalog and the configuration validator.
//!
//! The ISP core always runs a single internal media-bus code. The requested
//! [`PixelFormat`] only selects the conversion performed by the capture sink,
//! and the requested size is produced by the scaler. Validation therefore
//! never fails once at least one stream is requested; anything the pipeline
//! cannot honour is adjusted and reported as [`ConfigStatus::Adjusted`].

use std::fmt;

use crate::formats::{MediaBusCode, PixelFormat, PixelFormatInfo};
use crate::geometry::{Size, SizeRange};
use crate::media::SubdeviceFormat;

/// Media-bus code the ISP core emits, and therefore the code on the scaler
/// output, whatever pixel format the application asked for.
pub const ISP_OUTPUT_CODE: MediaBusCode = MediaBusCode::RBG888_1X24;

pub const MIN_SIZE: Size = Size::new(64, 64);
pub const MAX_SIZE: Size = Size::new(4096, 4096);

pub const DEFAULT_SIZE: Size = Size::new(640, 480);
pub const DEFAULT_PIXEL_FORMAT: PixelFormat = PixelFormat::RBG888;
pub const DEFAULT_BUFFER_COUNT: u32 = 4;

/// Output pixel formats and the ISP source code associated with each.
static FORMATS_MAP: &[(PixelFormat, MediaBusCode)] = &[
    (PixelFormat::YUYV, MediaBusCode::YUV8_1X24),
    (PixelFormat::RGB888, MediaBusCode::RGB888_1X24),
    (PixelFormat::BGR888, MediaBusCode::BGR888_1X24),
    (PixelFormat::RBG888, MediaBusCode::RBG888_1X24),
];

/// Index of a stream slot. Stream `n` is served by pipe `n` of the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub usize);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream{}", self.0)
    }
}

/// Intended use of a requested stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRole {
    StillCapture,
    VideoRecording,
    Viewfinder,
    Raw,
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRole::StillCapture => write!(f, "StillCapture"),
            StreamRole::VideoRecording => write!(f, "VideoRecording"),
            StreamRole::Viewfinder => write!(f, "Viewfinder"),
            StreamRole::Raw => write!(f, "Raw"),
        }
    }
}

/// Pixel formats a stream can be configured with, each with its size range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFormats {
    formats: Vec<(PixelFormat, MediaBusCode, SizeRange)>,
}

impl StreamFormats {
    /// The catalog of every format this pipeline can deliver.
    pub fn catalog() -> Self {
        let range = SizeRange::new(MIN_SIZE, MAX_SIZE);
        Self {
            formats: FORMATS_MAP
                .iter()
                .map(|&(format, code)| (format, code, range))
                .collect(),
        }
    }

    pub fn pixel_formats(&self) -> impl Iterator<Item = PixelFormat> + '_ {
        self.formats.iter().map(|(format, _, _)| *format)
    }

    pub fn range(&self, format: PixelFormat) -> Option<SizeRange> {
        self.formats
            .iter()
            .find(|(f, _, _)| *f == format)
            .map(|(_, _, range)| *range)
    }

    /// ISP source code associated with `format`.
    pub fn bus_code(&self, format: PixelFormat) -> Option<MediaBusCode> {
        self.formats
            .iter()
            .find(|(f, _, _)| *f == format)
            .map(|(_, code, _)| *code)
    }

    pub fn contains(&self, format: PixelFormat) -> bool {
        self.range(format).is_some()
    }
}

/// One requested output stream.
///
/// `stride` and `frame_size` are derived values: validation recomputes them
/// from `pixel_format` and `size`, overwriting anything set by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfiguration {
    pub pixel_format: PixelFormat,
    pub size: Size,
    pub buffer_count: u32,
    pub stride: u32,
    pub frame_size: u32,
    stream: Option<StreamId>,
    formats: StreamFormats,
}

impl StreamConfiguration {
    pub fn new(pixel_format: PixelFormat, size: Size) -> Self {
        Self {
            pixel_format,
            size,
            buffer_count: DEFAULT_BUFFER_COUNT,
            stride: 0,
            frame_size: 0,
            stream: None,
            formats: StreamFormats::catalog(),
        }
    }

    pub fn with_buffer_count(mut self, buffer_count: u32) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    /// Stream slot assigned by validation
    pub fn stream(&self) -> Option<StreamId> {
        self.stream
    }

    pub fn formats(&self) -> &StreamFormats {
        &self.formats
    }

    fn update_layout(&mut self, info: &PixelFormatInfo) {
        self.stride = info.stride(self.size.width, 0, 0);
        self.frame_size = info.frame_size(self.size, 1);
    }
}

impl fmt::Display for StreamConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.size, self.pixel_format)
    }
}

/// Result of [`CameraConfiguration::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStatus {
    Valid,
    Adjusted,
    Invalid,
}

/// A set of requested streams plus the sensor/scaler format derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfiguration {
    configs: Vec<StreamConfiguration>,
    available_streams: usize,
    sensor_format: SubdeviceFormat,
}

impl CameraConfiguration {
    /// Create an empty configuration for a camera exposing
    /// `available_streams` stream slots. A camera always has at least one
    /// slot, so zero is treated as one.
    pub fn new(available_streams: usize) -> Self {
        Self {
            configs: Vec::new(),
            available_streams: available_streams.max(1),
            sensor_format: SubdeviceFormat::default(),
        }
    }

    pub fn add_configuration(&mut self, config: StreamConfiguration) {
        self.configs.push(config);
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StreamConfiguration> {
        self.configs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut StreamConfiguration> {
        self.configs.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StreamConfiguration> {
        self.configs.iter()
    }

    /// Scaler output format chosen by the last validation.
    pub fn sensor_format(&self) -> SubdeviceFormat {
        self.sensor_format
    }

    /// Validate and adjust the requested streams.
    ///
    /// - An empty request is [`ConfigStatus::Invalid`].
    /// - The stream list is capped to the available slots, and to a single
    ///   stream, which is all the ISP exposes.
    /// - Unknown pixel formats are replaced by the default format, sizes are
    ///   clamped to the catalog range and a zero buffer count is raised to
    ///   the default.
    /// - Stride and frame size are recomputed from the format metadata.
    /// - The scaler output format takes the ISP output code and the largest
    ///   requested size.
    pub fn validate(&mut self) -> ConfigStatus {
        log::debug!("Validating configuration");

        if self.configs.is_empty() {
            return ConfigStatus::Invalid;
        }

        let mut status = ConfigStatus::Valid;

        log::debug!(
            "  {} streams requested, {} available",
            self.configs.len(),
            self.available_streams
        );

        if self.configs.len() > self.available_streams {
            self.configs.truncate(self.available_streams);
            status = ConfigStatus::Adjusted;
        }

        if self.configs.len() > 1 {
            self.configs.truncate(1);
            status = ConfigStatus::Adjusted;
        }

        for (i, config) in self.configs.iter_mut().enumerate() {
            config.stream = Some(StreamId(i));

            let catalog = StreamFormats::catalog();
            if !catalog.contains(config.pixel_format) {
                log::debug!(
                    "  Stream {}: unsupported {}, using {}",
                    i,
                    config.pixel_format,
                    DEFAULT_PIXEL_FORMAT
                );
                config.pixel_format = DEFAULT_PIXEL_FORMAT;
                status = ConfigStatus::Adjusted;
            }

            if let Some(range) = catalog.range(config.pixel_format) {
                let size = range.clamp(&config.size);
                if size != config.size {
                    log::debug!("  Stream {}: size {} adjusted to {}", i, config.size, size);
                    config.size = size;
                    status = ConfigStatus::Adjusted;
                }
            }

            if config.buffer_count == 0 {
                config.buffer_count = DEFAULT_BUFFER_COUNT;
                status = ConfigStatus::Adjusted;
            }

            if let Some(info) = PixelFormatInfo::info(config.pixel_format) {
                config.update_layout(info);
            }
            config.formats = catalog;

            log::debug!(
                "  Stream {}: {} stride {} frame size {}",
                i,
                config,
                config.stride,
                config.frame_size
            );
        }

        let mut max_size = Size::default();
        for config in &self.configs {
            if config.size.exceeds(&max_size) {
                max_size = config.size;
            }
        }

        self.sensor_format = SubdeviceFormat::new(ISP_OUTPUT_CODE, max_size);
        log::debug!("Selected sensor format: {}", self.sensor_format);

        status
    }
}

impl<'a> IntoIterator for &'a CameraConfiguration {
    type Item = &'a StreamConfiguration;
    type IntoIter = std::slice::Iter<'a, StreamConfiguration>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}

/// Build the default configuration for `roles` on a camera with
/// `available_streams` slots.
///
/// Returns `None` when more roles are requested than there are slots, zero
/// slots counting as one. No roles yields an empty configuration.
pub fn generate_configuration(
    roles: &[StreamRole],
    available_streams: usize,
) -> Option<CameraConfiguration> {
    log::debug!("Generate configuration for {} roles", roles.len());

    let mut config = CameraConfiguration::new(available_streams);
    if roles.is_empty() {
        return Some(config);
    }

    if roles.len() > config.available_streams {
        log::error!(
            "Only up to {} streams are supported",
            config.available_streams
        );
        return None;
    }

    for role in roles {
        log::debug!("  [role] {}", role);
    }

    // Every catalog format can be synthesized by the ISP, so all roles share
    // the same default stream.
    let mut stream = StreamConfiguration::new(DEFAULT_PIXEL_FORMAT, DEFAULT_SIZE);
    for format in stream.formats().pixel_formats() {
        if let Some(range) = stream.formats().range(format) {
            log::debug!("  [streamFormat] {} {}", format, range);
        }
    }
    if let Some(info) = PixelFormatInfo::info(stream.pixel_format) {
        stream.update_layout(info);
    }

    config.add_configuration(stream);
    config.validate();

    Some(config)
}
