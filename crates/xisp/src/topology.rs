// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Topology discovery: locating one capture pipeline and binding its devices.
//!
//! A board exposes several candidate capture pipelines, each registered as its
//! own media graph by the `xilinx-video` driver and distinguished by the name
//! of its capture video node (`vcap_mipi_<N>_v_proc output 0`). Discovery is a
//! two step process:
//!
//! 1. **Acquisition** walks the candidate slots in order and acquires the
//!    first graph the enumerator hands out. Selection is first-match-wins;
//!    once a graph is acquired no other candidate is tried for this camera.
//! 2. **Binding** classifies every entity of the acquired graph into a
//!    [`Role`] with a [`RoleMatcher`], opens one device handle per role and
//!    checks the result forms a complete [`PipelineBinding`].
//!
//! # Roles
//!
//! | Role | Mandatory | Default name fragment | Example entity |
//! |------|-----------|-----------------------|----------------|
//! | [`Role::Sensor`] | yes | `imx` | `imx219 1-0010` |
//! | [`Role::LensActuator`] | no | `dw9807` | `dw9807 2-000c` |
//! | [`Role::CsiReceiver`] | yes | `mipi_csi2_rx_subsystem` | `80050000.mipi_csi2_rx_subsystem` |
//! | [`Role::IspCore`] | yes | `ISPPipeline_accel` | `a0010000.ISPPipeline_accel` |
//! | [`Role::Scaler`] | yes | `v_proc_ss` | `a0040000.v_proc_ss` |
//! | [`Role::CaptureSink`] | yes | `vcap_mipi_` | `vcap_mipi_0_v_proc output 0` |
//!
//! When several entities of one graph classify into the same role, the last
//! one scanned wins. Each physical pipeline is expected to expose exactly one
//! entity per role.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc::Sender;

use crate::buffer::BufferEvent;
use crate::media::{
    DeviceEnumerator, DeviceMatch, EntityFunction, MediaDevice, MediaEntity, Subdevice,
    VideoDevice,
};
use crate::pipeline::PipelineOptions;
use crate::sensor::{self, SensorProfile};
use crate::Error;

/// Functional role of an entity within one capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Sensor,
    LensActuator,
    CsiReceiver,
    IspCore,
    Scaler,
    CaptureSink,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Sensor,
        Role::LensActuator,
        Role::CsiReceiver,
        Role::IspCore,
        Role::Scaler,
        Role::CaptureSink,
    ];

    /// Whether a pipeline without this role is unusable
    pub fn is_mandatory(&self) -> bool {
        !matches!(self, Role::LensActuator)
    }

    /// Short tag used in log output
    pub fn tag(&self) -> &'static str {
        match self {
            Role::Sensor => "CAM",
            Role::LensActuator => "VCM",
            Role::CsiReceiver => "CSI",
            Role::IspCore => "XISP",
            Role::Scaler => "VPSS",
            Role::CaptureSink => "VCAP",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Sensor => "sensor",
            Role::LensActuator => "lens actuator",
            Role::CsiReceiver => "CSI-2 receiver",
            Role::IspCore => "ISP core",
            Role::Scaler => "scaler",
            Role::CaptureSink => "capture sink",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One classification rule: entities whose name contains `fragment` play `role`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePattern {
    pub fragment: String,
    pub role: Role,
}

impl RolePattern {
    pub fn new(fragment: impl Into<String>, role: Role) -> Self {
        Self {
            fragment: fragment.into(),
            role,
        }
    }

    pub fn matches(&self, entity_name: &str) -> bool {
        entity_name.contains(self.fragment.as_str())
    }
}

/// Prioritized list of [`RolePattern`]s. The first pattern matching an entity
/// name decides its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMatcher {
    patterns: Vec<RolePattern>,
}

impl Default for RoleMatcher {
    fn default() -> Self {
        Self::new(vec![
            RolePattern::new("imx", Role::Sensor),
            RolePattern::new("dw9807", Role::LensActuator),
            RolePattern::new("mipi_csi2_rx_subsystem", Role::CsiReceiver),
            RolePattern::new("ISPPipeline_accel", Role::IspCore),
            RolePattern::new("v_proc_ss", Role::Scaler),
            RolePattern::new("vcap_mipi_", Role::CaptureSink),
        ])
    }
}

impl RoleMatcher {
    pub fn new(patterns: Vec<RolePattern>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[RolePattern] {
        &self.patterns
    }

    pub fn classify(&self, entity_name: &str) -> Option<Role> {
        self.patterns
            .iter()
            .find(|pattern| pattern.matches(entity_name))
            .map(|pattern| pattern.role)
    }

    /// Classify every entity of a graph in one pass. Later entities replace
    /// earlier ones assigned to the same role.
    pub fn scan<'a>(&self, entities: &'a [MediaEntity]) -> BTreeMap<Role, &'a MediaEntity> {
        let mut assigned = BTreeMap::new();
        for entity in entities {
            if let Some(role) = self.classify(entity.name()) {
                log::debug!("  [{:<4}] : {}", role.tag(), entity.name());
                if let Some(previous) = assigned.insert(role, entity) {
                    log::debug!("    replaces {} for role {}", previous.name(), role);
                }
            }
        }
        assigned
    }
}

/// The bound camera sensor.
pub struct SensorBinding {
    pub(crate) entity: MediaEntity,
    pub(crate) profile: &'static SensorProfile,
    pub(crate) device: Box<dyn Subdevice>,
}

impl SensorBinding {
    pub fn entity(&self) -> &MediaEntity {
        &self.entity
    }

    pub fn profile(&self) -> &'static SensorProfile {
        self.profile
    }
}

/// Scaler and capture sink serving one output stream.
pub struct Pipe {
    pub(crate) resizer: Box<dyn Subdevice>,
    pub(crate) capture: Box<dyn VideoDevice>,
}

impl Pipe {
    pub fn resizer_name(&self) -> &str {
        self.resizer.entity_name()
    }

    pub fn capture_name(&self) -> &str {
        self.capture.entity_name()
    }
}

/// Device handles resolved from one media graph.
///
/// Every mandatory role is bound and open; the lens actuator is optional.
/// The binding owns its handles exclusively and closes them when dropped.
pub struct PipelineBinding {
    pub(crate) candidate: usize,
    pub(crate) media: Box<dyn MediaDevice>,
    pub(crate) sensor: SensorBinding,
    pub(crate) lens: Option<Box<dyn Subdevice>>,
    pub(crate) csi2rx: Box<dyn Subdevice>,
    pub(crate) isp: Box<dyn Subdevice>,
    pub(crate) pipes: Vec<Pipe>,
}

impl PipelineBinding {
    /// Index of the candidate slot this binding was acquired from
    pub fn candidate(&self) -> usize {
        self.candidate
    }

    pub fn sensor(&self) -> &SensorBinding {
        &self.sensor
    }

    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    pub fn has_lens(&self) -> bool {
        self.lens.is_some()
    }

    /// Entity name bound to each role, in role order.
    pub fn entities(&self) -> Vec<(Role, String)> {
        let mut out = vec![(Role::Sensor, self.sensor.entity.name().to_owned())];
        if let Some(lens) = &self.lens {
            out.push((Role::LensActuator, lens.entity_name().to_owned()));
        }
        out.push((Role::CsiReceiver, self.csi2rx.entity_name().to_owned()));
        out.push((Role::IspCore, self.isp.entity_name().to_owned()));
        for pipe in &self.pipes {
            out.push((Role::Scaler, pipe.resizer_name().to_owned()));
            out.push((Role::CaptureSink, pipe.capture_name().to_owned()));
        }
        out
    }
}

impl fmt::Debug for PipelineBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBinding")
            .field("candidate", &self.candidate)
            .field("entities", &self.entities())
            .finish()
    }
}

/// Locates and binds one capture pipeline.
pub struct TopologyMatcher<'a> {
    options: &'a PipelineOptions,
}

impl<'a> TopologyMatcher<'a> {
    pub fn new(options: &'a PipelineOptions) -> Self {
        Self { options }
    }

    /// Acquire the first available candidate graph and bind it.
    ///
    /// `events` receives the capture sink's buffer-ready notifications; it is
    /// connected before the sink is opened.
    ///
    /// # Errors
    ///
    /// [`Error::NoPipelineFound`] when no candidate could be acquired, or any
    /// discovery error raised while binding the acquired graph. A graph that
    /// failed to bind stays acquired and is not retried.
    pub fn match_pipeline(
        &self,
        enumerator: &mut dyn DeviceEnumerator,
        events: Sender<BufferEvent>,
    ) -> Result<PipelineBinding, Error> {
        let (candidate, media) = self.acquire(enumerator)?;
        self.bind(candidate, media, events)
    }

    /// Walk the candidate slots in order and acquire the first graph found.
    pub fn acquire(
        &self,
        enumerator: &mut dyn DeviceEnumerator,
    ) -> Result<(usize, Box<dyn MediaDevice>), Error> {
        log::debug!("Looking for capture pipeline");

        for index in 0..self.options.candidates {
            let dm = DeviceMatch::new(self.options.driver.as_str())
                .with_entity(self.options.capture_entity(index));

            if let Some(media) = enumerator.acquire(&dm) {
                log::debug!("  Found pipeline {} ({})", index, media.model());
                return Ok((index, media));
            }
        }

        log::debug!("  No capture pipeline available");
        Err(Error::NoPipelineFound)
    }

    /// Classify the entities of `media` and open one handle per role.
    pub fn bind(
        &self,
        candidate: usize,
        media: Box<dyn MediaDevice>,
        events: Sender<BufferEvent>,
    ) -> Result<PipelineBinding, Error> {
        let roles = self.options.roles.scan(media.entities());
        let entity_name = |role: Role| -> Result<String, Error> {
            roles
                .get(&role)
                .map(|entity| entity.name().to_owned())
                .ok_or(Error::MissingEntity(role))
        };

        let sensor_entity = roles
            .get(&Role::Sensor)
            .map(|entity| (*entity).clone())
            .ok_or(Error::MissingEntity(Role::Sensor))?;
        let profile = sensor::lookup(sensor_entity.name())
            .ok_or_else(|| Error::UnknownSensor(sensor_entity.name().to_owned()))?;
        log::debug!("    [{}] : {}", profile.model.to_uppercase(), profile);

        let csi2rx = open_subdevice(
            media.as_ref(),
            Role::CsiReceiver,
            &entity_name(Role::CsiReceiver)?,
        )?;
        let isp = open_subdevice(media.as_ref(), Role::IspCore, &entity_name(Role::IspCore)?)?;
        let resizer = open_subdevice(media.as_ref(), Role::Scaler, &entity_name(Role::Scaler)?)?;

        let capture_name = entity_name(Role::CaptureSink)?;
        let mut capture = media
            .video_device(&capture_name)
            .map_err(|source| Error::Open {
                role: Role::CaptureSink,
                entity: capture_name.clone(),
                source,
            })?;
        capture.connect_buffer_ready(events);
        capture.open().map_err(|source| Error::Open {
            role: Role::CaptureSink,
            entity: capture_name.clone(),
            source,
        })?;

        let sensor_device = open_subdevice(media.as_ref(), Role::Sensor, sensor_entity.name())?;

        let lens = match roles.get(&Role::LensActuator) {
            Some(entity) => {
                match open_subdevice(media.as_ref(), Role::LensActuator, entity.name()) {
                    Ok(lens) => Some(lens),
                    Err(err) => {
                        log::warn!("Ignoring lens actuator: {}", err);
                        None
                    }
                }
            }
            None => None,
        };

        if sensor_entity.function() != EntityFunction::CamSensor {
            log::debug!("Skip unsupported subdevice {}", sensor_entity.name());
            return Err(Error::NotCameraSensor(sensor_entity.name().to_owned()));
        }

        Ok(PipelineBinding {
            candidate,
            media,
            sensor: SensorBinding {
                entity: sensor_entity,
                profile,
                device: sensor_device,
            },
            lens,
            csi2rx,
            isp,
            pipes: vec![Pipe { resizer, capture }],
        })
    }
}

fn open_subdevice(
    media: &dyn MediaDevice,
    role: Role,
    entity: &str,
) -> Result<Box<dyn Subdevice>, Error> {
    let open_error = |source| Error::Open {
        role,
        entity: entity.to_owned(),
        source,
    };

    let mut subdev = media.subdevice(entity).map_err(open_error)?;
    subdev.open().map_err(open_error)?;
    Ok(subdev)
}
