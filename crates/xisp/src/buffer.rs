// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Frame buffers exchanged with the capture sink and their completion events.

use std::fmt;
use unix_ts::Timestamp;

/// Identifier tying a queued buffer back to the request that owns it.
pub type RequestCookie = u64;

/// Completion status reported by the capture sink for one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStatus {
    /// Buffer filled with a valid frame
    #[default]
    Success,
    /// Buffer filled, but the driver flagged the frame as corrupted
    Error,
    /// Buffer returned unfilled, typically because streaming stopped
    Cancelled,
}

/// Metadata the driver attaches to a completed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    pub status: FrameStatus,
    /// Frame sequence number assigned by the capture sink
    pub sequence: u32,
    /// Capture time of the first line
    pub timestamp: Timestamp,
    /// Payload bytes per plane
    pub bytes_used: u32,
}

impl Default for FrameMetadata {
    fn default() -> Self {
        Self {
            status: FrameStatus::Success,
            sequence: 0,
            timestamp: Timestamp::new(0, 0),
            bytes_used: 0,
        }
    }
}

/// Memory region of one plane inside an exported buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlane {
    pub offset: u32,
    pub length: u32,
}

/// A capture buffer exported by a video device.
///
/// The buffer is moved into the device when queued and handed back through a
/// [`BufferEvent`] when the device is done with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    index: u32,
    planes: Vec<FramePlane>,
    cookie: Option<RequestCookie>,
    metadata: FrameMetadata,
}

impl FrameBuffer {
    pub fn new(index: u32, planes: Vec<FramePlane>) -> Self {
        Self {
            index,
            planes,
            cookie: None,
            metadata: FrameMetadata::default(),
        }
    }

    /// Buffer slot index on the video device
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn planes(&self) -> &[FramePlane] {
        &self.planes
    }

    /// Cookie of the request this buffer is attached to, if any
    pub fn request(&self) -> Option<RequestCookie> {
        self.cookie
    }

    pub(crate) fn set_request(&mut self, cookie: Option<RequestCookie>) {
        self.cookie = cookie;
    }

    pub fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    /// Used by video device implementations when completing the buffer.
    pub fn set_metadata(&mut self, metadata: FrameMetadata) {
        self.metadata = metadata;
    }
}

impl fmt::Display for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buffer {} seq {} {:?}",
            self.index, self.metadata.sequence, self.metadata.status
        )
    }
}

/// Buffer-ready notification delivered by a capture sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferEvent {
    /// Entity name of the capture sink that completed the buffer
    pub source: String,
    pub buffer: FrameBuffer,
}
