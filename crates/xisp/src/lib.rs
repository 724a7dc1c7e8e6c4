// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! XISP Pipeline Handler for Rust
//!
//! Camera pipeline handler for Xilinx/AMD boards that route a MIPI CSI-2
//! image sensor through a hardware ISP core and a video scaler into a DMA
//! capture node:
//!
//! ```text
//! sensor --> CSI-2 receiver --> ISP core --> scaler --> capture sink
//! ```
//!
//! The handler discovers one such chain in the media-controller graphs of the
//! board, negotiates a single format decision through every stage, and runs
//! the buffer lifecycle of the capture sink.
//!
//! # Quick Start
//!
//! ```
//! use xisp::config::StreamRole;
//! use xisp::pipeline::{PipelineHandler, PipelineOptions};
//! use xisp::virtual_device::xilinx_reference_board;
//!
//! let (mut enumerator, _probe) = xilinx_reference_board();
//! let handler = PipelineHandler::new(PipelineOptions::default());
//!
//! let mut camera = handler.match_camera(&mut enumerator)?;
//! let mut config = camera.generate_configuration(&[StreamRole::Viewfinder])?;
//! camera.configure(&mut config)?;
//! println!("{} configured for {}", camera.id(), config.get(0).unwrap());
//! # Ok::<(), xisp::Error>(())
//! ```
//!
//! # Components
//!
//! - [`topology`] locates a candidate graph and binds one device per role
//! - [`sensor`] holds the native mode of each supported sensor
//! - [`config`] validates and adjusts requested stream configurations
//! - [`negotiation`] applies formats across the chain
//! - [`capture`] manages buffers, streaming and request completion
//! - [`pipeline`] ties them together as a [`pipeline::Camera`]
//!
//! Hardware access goes through the traits of [`media`]. The
//! [`virtual_device`] module implements them in memory so the handler can be
//! exercised without a board.

use std::{error, fmt, io};

use unix_ts::Timestamp;

use crate::config::StreamId;
use crate::topology::Role;

/// Broad class of an [`Error`], used to decide how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No usable pipeline could be bound. Fatal for that camera instance.
    Discovery,
    /// A stage rejected its format. The caller may configure again.
    Configuration,
    /// Buffer or streaming operation failed on a capture sink.
    Streaming,
    /// An operation was called with arguments or in a state it cannot accept.
    Usage,
    /// Other I/O error from a device.
    Io,
}

/// Error type for pipeline handler operations
#[derive(Debug)]
pub enum Error {
    /// I/O error from an underlying device call
    Io(io::Error),

    /// No candidate media graph could be acquired
    NoPipelineFound,

    /// The acquired graph has no entity for a mandatory role
    MissingEntity(Role),

    /// A device handle could not be created or opened
    Open {
        role: Role,
        entity: String,
        source: io::Error,
    },

    /// The sensor entity does not match any known sensor profile
    UnknownSensor(String),

    /// The entity classified as sensor is not a camera sensor
    NotCameraSensor(String),

    /// The sensor link could not be enabled
    Link { entity: String, source: io::Error },

    /// A stage rejected its format. `pad` is `None` for the capture sink.
    SetFormat {
        role: Role,
        pad: Option<u32>,
        source: io::Error,
    },

    /// The configuration cannot be applied as given
    InvalidConfiguration(&'static str),

    /// A buffer or streaming operation failed on a capture sink
    Streaming {
        stream: StreamId,
        operation: &'static str,
        source: io::Error,
    },

    /// No pipe serves the stream
    NoPipe(StreamId),

    /// More streams were requested than the camera provides
    TooManyStreams { requested: usize, available: usize },

    /// The camera is not in a state allowing the operation
    InvalidState(&'static str),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::NoPipelineFound
            | Error::MissingEntity(_)
            | Error::Open { .. }
            | Error::UnknownSensor(_)
            | Error::NotCameraSensor(_) => ErrorKind::Discovery,
            Error::Link { .. } | Error::SetFormat { .. } | Error::InvalidConfiguration(_) => {
                ErrorKind::Configuration
            }
            Error::Streaming { .. } | Error::NoPipe(_) => ErrorKind::Streaming,
            Error::TooManyStreams { .. } | Error::InvalidState(_) => ErrorKind::Usage,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::NoPipelineFound => write!(f, "No capture pipeline found"),
            Error::MissingEntity(role) => write!(f, "No {} entity in media graph", role),
            Error::Open {
                role,
                entity,
                source,
            } => write!(f, "Failed to open {} '{}': {}", role, entity, source),
            Error::UnknownSensor(name) => write!(f, "Unsupported sensor '{}'", name),
            Error::NotCameraSensor(name) => {
                write!(f, "Entity '{}' is not a camera sensor", name)
            }
            Error::Link { entity, source } => {
                write!(f, "Failed to enable link from '{}': {}", entity, source)
            }
            Error::SetFormat {
                role,
                pad: Some(pad),
                source,
            } => write!(f, "Failed to set {} pad {} format: {}", role, pad, source),
            Error::SetFormat {
                role,
                pad: None,
                source,
            } => write!(f, "Failed to set {} format: {}", role, source),
            Error::InvalidConfiguration(reason) => {
                write!(f, "Invalid configuration: {}", reason)
            }
            Error::Streaming {
                stream,
                operation,
                source,
            } => write!(f, "Failed to {} on {}: {}", operation, stream, source),
            Error::NoPipe(stream) => write!(f, "No pipe for {}", stream),
            Error::TooManyStreams {
                requested,
                available,
            } => write!(
                f,
                "{} streams requested, only {} supported",
                requested, available
            ),
            Error::InvalidState(what) => write!(f, "Invalid camera state: {}", what),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Open { source, .. }
            | Error::Link { source, .. }
            | Error::SetFormat { source, .. }
            | Error::Streaming { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// Frame buffers and buffer-ready events.
pub mod buffer;

/// The capture module runs buffers, streaming and request completion.
pub mod capture;

/// The config module validates requested stream configurations.
pub mod config;

/// Pixel formats, media-bus codes and format layout metadata.
pub mod formats;

/// The fourcc module provides portable handling of fourcc codes.
pub mod fourcc;

pub mod geometry;

/// Traits implemented by the media-controller devices the handler drives.
pub mod media;

/// The negotiation module applies formats across the capture chain.
pub mod negotiation;

/// The pipeline module exposes discovered pipelines as cameras.
pub mod pipeline;

pub mod request;

/// The sensor module holds the capability table of supported sensors.
pub mod sensor;

/// The topology module discovers and binds a capture pipeline.
pub mod topology;

/// In-memory media devices for testing and simulation.
pub mod virtual_device;

/// Get the xisp library version string
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Current wall-clock time as a [`Timestamp`].
pub fn timestamp() -> Timestamp {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    Timestamp::new(now.as_secs() as i64, now.subsec_nanos())
}
