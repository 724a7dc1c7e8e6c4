// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Capture requests and their metadata.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use unix_ts::Timestamp;

use crate::buffer::{FrameBuffer, RequestCookie};
use crate::config::StreamId;

/// Identifier of a control or metadata item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlId {
    /// Capture time of the first line of the frame
    SensorTimestamp,
    /// Frame sequence number of the capture sink
    FrameSequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlValue {
    Timestamp(Timestamp),
    U32(u32),
}

/// Ordered set of control values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlList {
    values: BTreeMap<ControlId, ControlValue>,
}

impl ControlList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ControlId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn get(&self, id: ControlId) -> Option<ControlValue> {
        self.values.get(&id).copied()
    }

    pub fn set(&mut self, id: ControlId, value: ControlValue) {
        self.values.insert(id, value);
    }

    pub fn sensor_timestamp(&self) -> Option<Timestamp> {
        match self.get(ControlId::SensorTimestamp) {
            Some(ControlValue::Timestamp(ts)) => Some(ts),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Complete,
    Cancelled,
}

/// A set of buffers, one per stream, captured together.
///
/// Buffers are moved into the capture sinks when the request is queued and
/// move back into the request as they complete. The request completes once
/// no buffer is pending.
#[derive(Debug)]
pub struct Request {
    cookie: RequestCookie,
    buffers: BTreeMap<StreamId, FrameBuffer>,
    pending: BTreeSet<StreamId>,
    metadata: ControlList,
    status: RequestStatus,
}

impl Request {
    pub fn new(cookie: RequestCookie) -> Self {
        Self {
            cookie,
            buffers: BTreeMap::new(),
            pending: BTreeSet::new(),
            metadata: ControlList::new(),
            status: RequestStatus::Pending,
        }
    }

    pub fn cookie(&self) -> RequestCookie {
        self.cookie
    }

    /// Attach the buffer that will receive the frame of `stream`.
    pub fn add_buffer(&mut self, stream: StreamId, buffer: FrameBuffer) {
        self.buffers.insert(stream, buffer);
    }

    pub fn buffers(&self) -> &BTreeMap<StreamId, FrameBuffer> {
        &self.buffers
    }

    /// Take every buffer back, e.g. to requeue them in a new request.
    pub fn take_buffers(&mut self) -> BTreeMap<StreamId, FrameBuffer> {
        std::mem::take(&mut self.buffers)
    }

    pub fn metadata(&self) -> &ControlList {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut ControlList {
        &mut self.metadata
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn has_pending_buffers(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Move the buffers out for queuing, marking each stream pending.
    pub(crate) fn dispatch(&mut self) -> Vec<(StreamId, FrameBuffer)> {
        let buffers = std::mem::take(&mut self.buffers);
        buffers
            .into_iter()
            .map(|(stream, mut buffer)| {
                buffer.set_request(Some(self.cookie));
                self.pending.insert(stream);
                (stream, buffer)
            })
            .collect()
    }

    /// Return a completed buffer to the request. Returns `false` if the
    /// stream was not pending.
    pub(crate) fn complete_buffer(&mut self, stream: StreamId, buffer: FrameBuffer) -> bool {
        if !self.pending.remove(&stream) {
            return false;
        }
        if buffer.metadata().status == crate::buffer::FrameStatus::Cancelled {
            self.status = RequestStatus::Cancelled;
        }
        self.buffers.insert(stream, buffer);
        true
    }

    /// Take back the buffer of a stream that never reached the device and
    /// cancel the request.
    pub(crate) fn abandon(&mut self, stream: StreamId, mut buffer: FrameBuffer) {
        self.pending.remove(&stream);
        buffer.set_request(None);
        self.buffers.insert(stream, buffer);
        self.status = RequestStatus::Cancelled;
    }

    pub(crate) fn cancel(&mut self) {
        self.pending.clear();
        self.status = RequestStatus::Cancelled;
    }

    pub(crate) fn complete(&mut self) {
        if self.status == RequestStatus::Pending {
            self.status = RequestStatus::Complete;
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Request({}:{:?} {} buffers, {} pending)",
            self.cookie,
            self.status,
            self.buffers.len(),
            self.pending.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{FrameMetadata, FramePlane, FrameStatus};

    fn buffer(index: u32) -> FrameBuffer {
        FrameBuffer::new(
            index,
            vec![FramePlane {
                offset: 0,
                length: 1024,
            }],
        )
    }

    #[test]
    fn test_dispatch_and_complete() {
        let mut request = Request::new(7);
        request.add_buffer(StreamId(0), buffer(2));

        let queued = request.dispatch();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].1.request(), Some(7));
        assert!(request.has_pending_buffers());
        assert!(request.buffers().is_empty());

        let (stream, buf) = queued.into_iter().next().unwrap();
        assert!(request.complete_buffer(stream, buf.clone()));
        assert!(!request.complete_buffer(stream, buf));
        assert!(!request.has_pending_buffers());

        request.complete();
        assert_eq!(request.status(), RequestStatus::Complete);
    }

    #[test]
    fn test_cancelled_buffer_cancels_request() {
        let mut request = Request::new(1);
        request.add_buffer(StreamId(0), buffer(0));
        let (stream, mut buf) = request.dispatch().pop().unwrap();
        buf.set_metadata(FrameMetadata {
            status: FrameStatus::Cancelled,
            ..FrameMetadata::default()
        });
        request.complete_buffer(stream, buf);
        request.complete();
        assert_eq!(request.status(), RequestStatus::Cancelled);
    }

    #[test]
    fn test_abandoned_buffer_returns_to_request() {
        let mut request = Request::new(3);
        request.add_buffer(StreamId(1), buffer(5));
        let (stream, buf) = request.dispatch().pop().unwrap();

        request.abandon(stream, buf);
        assert!(!request.has_pending_buffers());
        assert_eq!(request.status(), RequestStatus::Cancelled);
        let returned = &request.buffers()[&StreamId(1)];
        assert_eq!(returned.index(), 5);
        assert_eq!(returned.request(), None);

        request.complete();
        assert_eq!(request.status(), RequestStatus::Cancelled);
    }

    #[test]
    fn test_control_list() {
        let mut list = ControlList::new();
        assert!(!list.contains(ControlId::SensorTimestamp));
        list.set(
            ControlId::SensorTimestamp,
            ControlValue::Timestamp(Timestamp::new(3, 500)),
        );
        assert_eq!(list.sensor_timestamp(), Some(Timestamp::new(3, 500)));
        assert_eq!(list.len(), 1);
    }
}
