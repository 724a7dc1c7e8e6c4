// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Capture lifecycle: buffers, streaming and request completion.
//!
//! Control calls (`start`, `stop`, `queue_request`) and buffer completions run
//! in two different contexts. The capture sinks report completed buffers
//! through the [`BufferEvent`] channel connected at bind time, from whichever
//! thread the device uses. The [`CaptureManager`] owns the receiving end and
//! consumes events only from within its own methods, so request state is
//! mutated from a single context and needs no locking.
//!
//! [`CaptureManager::stop`] is a drain barrier: it stops every started sink,
//! then waits until each in-flight request has completed, or the drain
//! timeout expires, before releasing the buffers.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use crate::buffer::{BufferEvent, FrameBuffer, RequestCookie};
use crate::config::StreamId;
use crate::request::{ControlId, ControlValue, Request};
use crate::topology::Pipe;
use crate::Error;

/// Tracks started streams and in-flight requests of one camera.
#[derive(Debug)]
pub struct CaptureManager {
    events: Receiver<BufferEvent>,
    started: BTreeSet<StreamId>,
    inflight: BTreeMap<RequestCookie, Request>,
    completed: VecDeque<Request>,
}

impl CaptureManager {
    /// `events` is the receiving end of the channel the capture sinks were
    /// connected to.
    pub fn new(events: Receiver<BufferEvent>) -> Self {
        Self {
            events,
            started: BTreeSet::new(),
            inflight: BTreeMap::new(),
            completed: VecDeque::new(),
        }
    }

    /// Streams whose sink imported buffers and has not been stopped since.
    pub fn started(&self) -> impl Iterator<Item = StreamId> + '_ {
        self.started.iter().copied()
    }

    pub fn is_streaming(&self) -> bool {
        !self.started.is_empty()
    }

    /// Number of requests queued and not yet completed
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Allocate `count` buffers on the capture sink serving `stream`.
    pub fn export_buffers(
        &mut self,
        pipes: &mut [Pipe],
        stream: StreamId,
        count: u32,
    ) -> Result<Vec<FrameBuffer>, Error> {
        let pipe = pipes.get_mut(stream.0).ok_or(Error::NoPipe(stream))?;
        pipe.capture
            .export_buffers(count)
            .map_err(|source| Error::Streaming {
                stream,
                operation: "export buffers",
                source,
            })
    }

    /// Import buffers and enable streaming for each `(stream, buffer_count)`.
    ///
    /// The first failure aborts the start. Sinks started before it keep
    /// running and are remembered, so a later [`stop`](Self::stop) tears them
    /// down.
    pub fn start(&mut self, pipes: &mut [Pipe], streams: &[(StreamId, u32)]) -> Result<(), Error> {
        for &(stream, buffer_count) in streams {
            let pipe = pipes.get_mut(stream.0).ok_or(Error::NoPipe(stream))?;

            pipe.capture
                .import_buffers(buffer_count)
                .map_err(|source| Error::Streaming {
                    stream,
                    operation: "import buffers",
                    source,
                })?;
            self.started.insert(stream);

            pipe.capture
                .stream_on()
                .map_err(|source| Error::Streaming {
                    stream,
                    operation: "stream on",
                    source,
                })?;

            log::debug!(
                "Streaming {} on {} with {} buffers",
                stream,
                pipe.capture_name(),
                buffer_count
            );
        }

        Ok(())
    }

    /// Stop every started stream and return all requests not yet handed out.
    ///
    /// Requests still in flight when `drain_timeout` expires are returned
    /// cancelled. Device failures are logged, never returned.
    pub fn stop(&mut self, pipes: &mut [Pipe], drain_timeout: Duration) -> Vec<Request> {
        for stream in &self.started {
            if let Some(pipe) = pipes.get_mut(stream.0) {
                if let Err(err) = pipe.capture.stream_off() {
                    log::warn!("Failed to stop {}: {}", stream, err);
                }
            }
        }

        let deadline = Instant::now() + drain_timeout;
        while !self.inflight.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.on_buffer_ready(pipes, event),
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "{} requests still in flight after {:?}",
                        self.inflight.len(),
                        drain_timeout
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        for (_, mut request) in std::mem::take(&mut self.inflight) {
            request.cancel();
            self.completed.push_back(request);
        }

        for stream in std::mem::take(&mut self.started) {
            if let Some(pipe) = pipes.get_mut(stream.0) {
                if let Err(err) = pipe.capture.release_buffers() {
                    log::warn!("Failed to release buffers of {}: {}", stream, err);
                }
            }
            log::debug!("Stopped {}", stream);
        }

        self.completed.drain(..).collect()
    }

    /// Queue every buffer of `request` on the sink of its stream.
    ///
    /// A request handed in here always comes back, with its buffers, through
    /// [`CaptureManager::process_completions`],
    /// [`CaptureManager::wait_for_completion`] or [`CaptureManager::stop`].
    ///
    /// # Errors
    ///
    /// [`Error::NoPipe`] or [`Error::InvalidState`] if a stream is not served
    /// or not started; nothing is queued and the request is returned
    /// cancelled. If the device rejects a buffer the request is cancelled;
    /// buffers already queued still complete through the event channel.
    pub fn queue_request(&mut self, pipes: &mut [Pipe], mut request: Request) -> Result<(), Error> {
        if let Err(err) = self.check_request(pipes, &request) {
            return Err(self.reject(request, err));
        }

        let cookie = request.cookie();
        let mut failure = None;
        for (stream, buffer) in request.dispatch() {
            if failure.is_some() {
                request.abandon(stream, buffer);
                continue;
            }
            if let Err((source, buffer)) = pipes[stream.0].capture.queue_buffer(buffer) {
                request.abandon(stream, buffer);
                failure = Some(Error::Streaming {
                    stream,
                    operation: "queue buffer",
                    source,
                });
            }
        }

        if request.has_pending_buffers() {
            self.inflight.insert(cookie, request);
        } else {
            request.complete();
            self.completed.push_back(request);
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_request(&self, pipes: &[Pipe], request: &Request) -> Result<(), Error> {
        if request.buffers().is_empty() {
            return Err(Error::InvalidState("request has no buffers"));
        }
        if self.inflight.contains_key(&request.cookie()) {
            return Err(Error::InvalidState("request already queued"));
        }
        for &stream in request.buffers().keys() {
            if stream.0 >= pipes.len() {
                return Err(Error::NoPipe(stream));
            }
            if !self.started.contains(&stream) {
                return Err(Error::InvalidState("stream not started"));
            }
        }
        Ok(())
    }

    /// Cancel a request that was never queued and hand it back through the
    /// completed queue. Returns `err` for the caller to propagate.
    pub(crate) fn reject(&mut self, mut request: Request, err: Error) -> Error {
        log::debug!("Request {} rejected: {}", request.cookie(), err);
        request.cancel();
        self.completed.push_back(request);
        err
    }

    /// Account one completed buffer against its request.
    ///
    /// The first completed buffer of a request stamps the sensor timestamp
    /// and frame sequence; later buffers never overwrite them. Once no buffer
    /// is pending the request moves to the completed queue.
    pub fn on_buffer_ready(&mut self, pipes: &[Pipe], event: BufferEvent) {
        let BufferEvent { source, buffer } = event;

        let Some(stream) = pipes
            .iter()
            .position(|pipe| pipe.capture_name() == source)
            .map(StreamId)
        else {
            log::warn!("Buffer from unknown sink {}", source);
            return;
        };
        let Some(cookie) = buffer.request() else {
            log::warn!("Buffer {} of {} has no request", buffer.index(), stream);
            return;
        };
        let Some(request) = self.inflight.get_mut(&cookie) else {
            log::warn!("Buffer {} for unknown request {}", buffer.index(), cookie);
            return;
        };

        let metadata = *buffer.metadata();
        let controls = request.metadata_mut();
        if !controls.contains(ControlId::SensorTimestamp) {
            controls.set(
                ControlId::SensorTimestamp,
                ControlValue::Timestamp(metadata.timestamp),
            );
        }
        if !controls.contains(ControlId::FrameSequence) {
            controls.set(
                ControlId::FrameSequence,
                ControlValue::U32(metadata.sequence),
            );
        }

        log::trace!("{} completed {}", stream, buffer);
        if !request.complete_buffer(stream, buffer) {
            log::warn!("Request {} was not waiting on {}", cookie, stream);
        }

        if !request.has_pending_buffers() {
            if let Some(mut request) = self.inflight.remove(&cookie) {
                request.complete();
                self.completed.push_back(request);
            }
        }
    }

    /// Handle every pending buffer event and return the completed requests.
    pub fn process_completions(&mut self, pipes: &[Pipe]) -> Vec<Request> {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.on_buffer_ready(pipes, event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.completed.drain(..).collect()
    }

    /// Block until one request completes or `timeout` elapses.
    pub fn wait_for_completion(&mut self, pipes: &[Pipe], timeout: Duration) -> Option<Request> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(request) = self.completed.pop_front() {
                return Some(request);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.on_buffer_ready(pipes, event),
                Err(_) => return None,
            }
        }
    }
}
