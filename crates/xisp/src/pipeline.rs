// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Cameras backed by a bound ISP capture pipeline.
//!
//! [`PipelineHandler`] discovers pipelines and wraps each bound one in a
//! [`Camera`]. The camera owns its [`PipelineBinding`] exclusively and runs
//! the usual camera sequence over it:
//!
//! ```text
//! generate_configuration -> configure -> export_frame_buffers
//!     -> start -> queue_request / process_completions ... -> stop
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use xisp::config::{StreamId, StreamRole};
//! use xisp::pipeline::{PipelineHandler, PipelineOptions};
//! use xisp::request::Request;
//! use xisp::virtual_device::xilinx_reference_board;
//!
//! let (mut enumerator, _probe) = xilinx_reference_board();
//! let handler = PipelineHandler::new(PipelineOptions::default());
//! let mut camera = handler.match_camera(&mut enumerator)?;
//!
//! let mut config = camera.generate_configuration(&[StreamRole::VideoRecording])?;
//! camera.configure(&mut config)?;
//!
//! let buffers = camera.export_frame_buffers(StreamId(0))?;
//! camera.start(None)?;
//! for (cookie, buffer) in buffers.into_iter().enumerate() {
//!     let mut request = Request::new(cookie as u64);
//!     request.add_buffer(StreamId(0), buffer);
//!     camera.queue_request(request)?;
//! }
//!
//! let request = camera.wait_for_completion(Duration::from_secs(1));
//! assert!(request.is_some());
//! camera.stop();
//! # Ok::<(), xisp::Error>(())
//! ```

use std::fmt;
use std::sync::mpsc;
use std::time::Duration;

use crate::buffer::FrameBuffer;
use crate::capture::CaptureManager;
use crate::config::{
    self, CameraConfiguration, ConfigStatus, StreamConfiguration, StreamId, StreamRole,
};
use crate::media::DeviceEnumerator;
use crate::negotiation::{ChainPlan, FormatNegotiator};
use crate::request::{ControlList, Request};
use crate::sensor::SensorProfile;
use crate::topology::{PipelineBinding, RoleMatcher, TopologyMatcher};
use crate::Error;

pub const DEFAULT_DRIVER: &str = "xilinx-video";
pub const DEFAULT_CANDIDATES: usize = 4;
pub const DEFAULT_CAPTURE_ENTITY: &str = "vcap_mipi_{index}_v_proc output 0";
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Discovery and lifecycle settings.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// media-controller driver name of the candidate graphs
    pub driver: String,

    /// number of candidate pipeline slots to probe
    pub candidates: usize,

    /// capture entity name of each candidate, `{index}` is replaced by the
    /// candidate slot index
    pub capture_entity: String,

    /// entity name patterns deciding the role of each entity
    pub roles: RoleMatcher,

    /// how long stop waits for in-flight requests to complete
    pub drain_timeout: Duration,
}

impl PipelineOptions {
    pub fn with_driver(self, driver: &str) -> PipelineOptions {
        PipelineOptions {
            driver: driver.to_owned(),
            ..self
        }
    }

    pub fn with_candidates(self, candidates: usize) -> PipelineOptions {
        PipelineOptions { candidates, ..self }
    }

    pub fn with_capture_entity(self, template: &str) -> PipelineOptions {
        PipelineOptions {
            capture_entity: template.to_owned(),
            ..self
        }
    }

    pub fn with_roles(self, roles: RoleMatcher) -> PipelineOptions {
        PipelineOptions { roles, ..self }
    }

    pub fn with_drain_timeout(self, drain_timeout: Duration) -> PipelineOptions {
        PipelineOptions {
            drain_timeout,
            ..self
        }
    }

    /// Capture entity name required for candidate `index`.
    pub fn capture_entity(&self, index: usize) -> String {
        self.capture_entity.replace("{index}", &index.to_string())
    }
}

impl Default for PipelineOptions {
    fn default() -> PipelineOptions {
        PipelineOptions {
            driver: DEFAULT_DRIVER.to_owned(),
            candidates: DEFAULT_CANDIDATES,
            capture_entity: DEFAULT_CAPTURE_ENTITY.to_owned(),
            roles: RoleMatcher::default(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Discovers capture pipelines and creates cameras from them.
#[derive(Debug, Clone, Default)]
pub struct PipelineHandler {
    options: PipelineOptions,
}

impl PipelineHandler {
    pub fn new(options: PipelineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Bind the next available pipeline as a camera.
    ///
    /// Each call acquires at most one graph. A graph acquired by a previous
    /// call, including one that failed to bind, is never returned again.
    pub fn match_camera(&self, enumerator: &mut dyn DeviceEnumerator) -> Result<Camera, Error> {
        let (sender, receiver) = mpsc::channel();
        let binding = TopologyMatcher::new(&self.options).match_pipeline(enumerator, sender)?;
        let camera = Camera::new(binding, CaptureManager::new(receiver), &self.options);
        log::info!(
            "Registered camera {} from pipeline {}",
            camera.id(),
            camera.binding.candidate()
        );
        Ok(camera)
    }

    /// Bind every available pipeline, one camera each.
    ///
    /// Graphs that fail to bind are logged and skipped.
    pub fn discover_cameras(&self, enumerator: &mut dyn DeviceEnumerator) -> Vec<Camera> {
        let mut cameras = Vec::new();
        loop {
            match self.match_camera(enumerator) {
                Ok(camera) => cameras.push(camera),
                Err(Error::NoPipelineFound) => break,
                Err(err) => log::warn!("Skipping pipeline: {}", err),
            }
        }
        cameras
    }
}

/// Lifecycle state of a [`Camera`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    /// Bound, no configuration applied yet
    Available,
    /// Formats applied, streams ready to start
    Configured,
    /// Streams started, requests may be queued
    Running,
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CameraState::Available => write!(f, "available"),
            CameraState::Configured => write!(f, "configured"),
            CameraState::Running => write!(f, "running"),
        }
    }
}

/// One capture pipeline exposed as a camera.
pub struct Camera {
    id: String,
    binding: PipelineBinding,
    negotiator: FormatNegotiator,
    capture: CaptureManager,
    streams: Vec<StreamConfiguration>,
    state: CameraState,
    drain_timeout: Duration,
}

impl Camera {
    fn new(binding: PipelineBinding, capture: CaptureManager, options: &PipelineOptions) -> Self {
        Camera {
            id: binding.sensor().entity().name().to_owned(),
            binding,
            negotiator: FormatNegotiator::new(),
            capture,
            streams: Vec::new(),
            state: CameraState::Available,
            drain_timeout: options.drain_timeout,
        }
    }

    /// Camera identifier, the sensor entity name
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sensor_profile(&self) -> &'static SensorProfile {
        self.binding.sensor().profile()
    }

    pub fn binding(&self) -> &PipelineBinding {
        &self.binding
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    /// Number of stream slots, one per bound pipe
    pub fn stream_count(&self) -> usize {
        self.binding.pipes().len()
    }

    /// Streams enabled by the last successful configure
    pub fn streams(&self) -> &[StreamConfiguration] {
        &self.streams
    }

    /// Formats in effect on every stage after the last successful configure
    pub fn applied_formats(&self) -> Option<&ChainPlan> {
        self.negotiator.applied()
    }

    /// Default configuration for `roles`.
    pub fn generate_configuration(&self, roles: &[StreamRole]) -> Result<CameraConfiguration, Error> {
        config::generate_configuration(roles, self.stream_count()).ok_or(Error::TooManyStreams {
            requested: roles.len(),
            available: self.stream_count(),
        })
    }

    /// Validate `config` and apply it to the whole chain.
    ///
    /// `config` is adjusted in place by validation. On a negotiation failure
    /// the previously applied configuration, if any, stays in effect.
    pub fn configure(&mut self, config: &mut CameraConfiguration) -> Result<(), Error> {
        if self.state == CameraState::Running {
            return Err(Error::InvalidState("cannot configure while running"));
        }

        match config.validate() {
            ConfigStatus::Invalid => {
                return Err(Error::InvalidConfiguration("no stream to configure"))
            }
            ConfigStatus::Adjusted => log::info!("Camera configuration adjusted"),
            ConfigStatus::Valid => {}
        }

        let negotiated = self
            .negotiator
            .negotiate(&mut self.binding, config)
            .map(|_| ());
        if let Err(err) = negotiated {
            if self.negotiator.applied().is_none() {
                self.streams.clear();
                self.state = CameraState::Available;
            }
            return Err(err);
        }

        self.streams = config.iter().cloned().collect();
        self.state = CameraState::Configured;

        for stream in &self.streams {
            log::info!("Configured {} stride {}", stream, stream.stride);
        }
        Ok(())
    }

    fn enabled_stream(&self, stream: StreamId) -> Option<&StreamConfiguration> {
        self.streams.iter().find(|s| s.stream() == Some(stream))
    }

    /// Allocate the configured number of buffers for `stream`.
    pub fn export_frame_buffers(&mut self, stream: StreamId) -> Result<Vec<FrameBuffer>, Error> {
        let count = self
            .enabled_stream(stream)
            .map(|s| s.buffer_count)
            .ok_or(Error::NoPipe(stream))?;
        self.capture
            .export_buffers(&mut self.binding.pipes, stream, count)
    }

    /// Start every configured stream.
    ///
    /// `controls` are accepted for interface compatibility; this pipeline has
    /// no controls to apply at start.
    pub fn start(&mut self, controls: Option<&ControlList>) -> Result<(), Error> {
        if self.state != CameraState::Configured {
            return Err(Error::InvalidState("camera must be configured to start"));
        }
        if let Some(controls) = controls {
            log::debug!("Ignoring {} start controls", controls.len());
        }

        let streams: Vec<(StreamId, u32)> = self
            .streams
            .iter()
            .filter_map(|s| s.stream().map(|id| (id, s.buffer_count)))
            .collect();
        self.capture.start(&mut self.binding.pipes, &streams)?;

        self.state = CameraState::Running;
        Ok(())
    }

    /// Stop streaming and return every request not yet handed out.
    ///
    /// Also tears down sinks left running by a failed [`start`](Self::start).
    pub fn stop(&mut self) -> Vec<Request> {
        if self.state != CameraState::Running && !self.capture.is_streaming() {
            return self.capture.process_completions(&self.binding.pipes);
        }

        let requests = self
            .capture
            .stop(&mut self.binding.pipes, self.drain_timeout);
        self.state = CameraState::Configured;
        requests
    }

    /// Queue `request` for capture.
    ///
    /// A rejected request is returned cancelled, buffers included, by the
    /// next [`process_completions`](Self::process_completions) or
    /// [`stop`](Self::stop).
    pub fn queue_request(&mut self, request: Request) -> Result<(), Error> {
        if self.state != CameraState::Running {
            return Err(self
                .capture
                .reject(request, Error::InvalidState("camera is not running")));
        }
        self.capture.queue_request(&mut self.binding.pipes, request)
    }

    /// Handle pending buffer completions and return the completed requests.
    pub fn process_completions(&mut self) -> Vec<Request> {
        self.capture.process_completions(&self.binding.pipes)
    }

    pub fn wait_for_completion(&mut self, timeout: Duration) -> Option<Request> {
        self.capture
            .wait_for_completion(&self.binding.pipes, timeout)
    }

    /// Number of queued requests not yet completed
    pub fn in_flight(&self) -> usize {
        self.capture.in_flight()
    }
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Camera")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("binding", &self.binding)
            .finish()
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if self.capture.is_streaming() {
            let _ = self.capture.stop(&mut self.binding.pipes, Duration::ZERO);
        }
    }
}
