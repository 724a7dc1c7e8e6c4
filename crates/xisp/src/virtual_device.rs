// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! In-memory media devices.
//!
//! Implements every trait of [`crate::media`] over a shared board state so
//! the pipeline handler can run without hardware. A [`VirtualProbe`] shares
//! that state and is used to inject faults and to inspect what the handler
//! did: open handles, applied formats, link and streaming state.
//!
//! Queued buffers complete immediately once their sink is streaming, unless
//! auto-completion is disabled with [`VirtualProbe::set_auto_complete`], in
//! which case they complete on [`VirtualProbe::complete_next`]. Stopping a
//! sink returns every buffer still queued as cancelled.
//!
//! Entity names are assumed unique across all graphs of a board.
//!
//! ```
//! use xisp::virtual_device::{Fault, xilinx_reference_board};
//! use xisp::pipeline::{PipelineHandler, PipelineOptions};
//!
//! let (mut enumerator, probe) = xilinx_reference_board();
//! probe.inject(Fault::Open("a0010000.ISPPipeline_accel".into()));
//!
//! let handler = PipelineHandler::new(PipelineOptions::default());
//! assert!(handler.match_camera(&mut enumerator).is_err());
//! assert_eq!(probe.total_open_handles(), 0);
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};

use unix_ts::Timestamp;

use crate::buffer::{BufferEvent, FrameBuffer, FrameMetadata, FramePlane, FrameStatus};
use crate::geometry::Size;
use crate::media::{
    DeviceEnumerator, DeviceFormat, DeviceMatch, EntityFunction, MediaDevice, MediaEntity,
    Subdevice, SubdeviceFormat, VideoDevice,
};

const EIO: i32 = 5;
const EBADF: i32 = 9;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;
const EINVAL: i32 = 22;

/// A failure to inject into matching device calls.
///
/// Faults armed with [`VirtualProbe::inject`] stay armed until cleared with
/// [`VirtualProbe::clear_faults`]; [`VirtualProbe::inject_once`] fails only
/// the next matching call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Opening the named entity fails
    Open(String),
    /// Setting a format on the named entity fails; `None` matches every pad
    SetFormat { entity: String, pad: Option<u32> },
    /// Enabling the link leaving the named entity fails
    Link(String),
    /// Importing buffers on the named capture sink fails
    ImportBuffers(String),
    /// Starting the named capture sink fails
    StreamOn(String),
    /// Queuing a buffer on the named capture sink fails
    QueueBuffer(String),
}

#[derive(Debug, Default)]
struct SinkState {
    format: Option<DeviceFormat>,
    imported: u32,
    streaming: bool,
    queued: VecDeque<FrameBuffer>,
    sequence: u32,
    sender: Option<Sender<BufferEvent>>,
}

#[derive(Debug)]
struct BoardState {
    open_handles: BTreeMap<String, usize>,
    open_calls: BTreeMap<String, usize>,
    pad_formats: BTreeMap<(String, u32), SubdeviceFormat>,
    format_log: Vec<(String, Option<u32>)>,
    size_limits: BTreeMap<String, Size>,
    links: BTreeMap<String, bool>,
    sinks: BTreeMap<String, SinkState>,
    faults: Vec<Fault>,
    one_shot: Vec<Fault>,
    auto_complete: bool,
    clock: Option<Timestamp>,
}

impl Default for BoardState {
    fn default() -> Self {
        Self {
            open_handles: BTreeMap::new(),
            open_calls: BTreeMap::new(),
            pad_formats: BTreeMap::new(),
            format_log: Vec::new(),
            size_limits: BTreeMap::new(),
            links: BTreeMap::new(),
            sinks: BTreeMap::new(),
            faults: Vec::new(),
            one_shot: Vec::new(),
            auto_complete: true,
            clock: None,
        }
    }
}

impl BoardState {
    fn fault_matches(armed: &Fault, fault: &Fault) -> bool {
        match (armed, fault) {
            (
                Fault::SetFormat { entity, pad: None },
                Fault::SetFormat {
                    entity: wanted, ..
                },
            ) => entity == wanted,
            _ => armed == fault,
        }
    }

    /// Whether `fault` is armed. A one-shot fault is disarmed by the check.
    fn take_fault(&mut self, fault: &Fault) -> bool {
        if self.faults.iter().any(|f| Self::fault_matches(f, fault)) {
            return true;
        }
        match self
            .one_shot
            .iter()
            .position(|f| Self::fault_matches(f, fault))
        {
            Some(index) => {
                self.one_shot.remove(index);
                true
            }
            None => false,
        }
    }

    fn clamp(&self, entity: &str, size: Size) -> Size {
        match self.size_limits.get(entity) {
            Some(max) => Size::new(size.width.min(max.width), size.height.min(max.height)),
            None => size,
        }
    }

    fn complete(&mut self, entity: &str, status: FrameStatus) -> bool {
        let timestamp = self.clock.unwrap_or_else(crate::timestamp);
        let Some(sink) = self.sinks.get_mut(entity) else {
            return false;
        };
        let Some(mut buffer) = sink.queued.pop_front() else {
            return false;
        };

        let bytes_used = match status {
            FrameStatus::Cancelled => 0,
            _ => buffer.planes().first().map(|p| p.length).unwrap_or(0),
        };
        buffer.set_metadata(FrameMetadata {
            status,
            sequence: sink.sequence,
            timestamp,
            bytes_used,
        });
        if status != FrameStatus::Cancelled {
            sink.sequence += 1;
        }

        match &sink.sender {
            Some(sender) => sender
                .send(BufferEvent {
                    source: entity.to_owned(),
                    buffer,
                })
                .is_ok(),
            None => false,
        }
    }
}

type SharedState = Arc<Mutex<BoardState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, BoardState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn os_error(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

/// Description of one media graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualGraph {
    driver: String,
    model: String,
    entities: Vec<MediaEntity>,
}

impl VirtualGraph {
    pub fn new(driver: &str, model: &str) -> Self {
        Self {
            driver: driver.to_owned(),
            model: model.to_owned(),
            entities: Vec::new(),
        }
    }

    /// Append an entity; ids are assigned in insertion order.
    pub fn entity(mut self, name: &str, function: EntityFunction) -> Self {
        let id = self.entities.len() as u32 + 1;
        self.entities.push(MediaEntity::new(id, name, function));
        self
    }

    /// Drop every entity whose name contains `fragment`.
    pub fn without(mut self, fragment: &str) -> Self {
        self.entities.retain(|e| !e.name().contains(fragment));
        self
    }

    /// One capture pipeline as registered by the `xilinx-video` driver.
    pub fn xilinx_pipeline(
        index: usize,
        sensor: &str,
        lens: Option<&str>,
        csi2rx: &str,
        isp: &str,
        scaler: &str,
    ) -> Self {
        let capture = format!("vcap_mipi_{}_v_proc output 0", index);
        let mut graph = VirtualGraph::new("xilinx-video", &format!("vcap_mipi_{}", index))
            .entity(&capture, EntityFunction::IoV4l)
            .entity(sensor, EntityFunction::CamSensor);
        if let Some(lens) = lens {
            graph = graph.entity(lens, EntityFunction::Lens);
        }
        graph
            .entity(csi2rx, EntityFunction::VidIfBridge)
            .entity(isp, EntityFunction::ProcVideoIsp)
            .entity(scaler, EntityFunction::ProcVideoScaler)
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn entities(&self) -> &[MediaEntity] {
        &self.entities
    }
}

/// Enumerator over a fixed set of [`VirtualGraph`]s.
#[derive(Debug, Default)]
pub struct VirtualEnumerator {
    graphs: Vec<(VirtualGraph, bool)>,
    state: SharedState,
}

impl VirtualEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph(mut self, graph: VirtualGraph) -> Self {
        self.add_graph(graph);
        self
    }

    pub fn add_graph(&mut self, graph: VirtualGraph) {
        self.graphs.push((graph, false));
    }

    /// Handle sharing this board's state
    pub fn probe(&self) -> VirtualProbe {
        VirtualProbe {
            state: self.state.clone(),
        }
    }

    /// Number of graphs acquired so far
    pub fn acquired(&self) -> usize {
        self.graphs.iter().filter(|(_, acquired)| *acquired).count()
    }
}

impl DeviceEnumerator for VirtualEnumerator {
    fn acquire(&mut self, dm: &DeviceMatch) -> Option<Box<dyn MediaDevice>> {
        let (graph, acquired) = self
            .graphs
            .iter_mut()
            .find(|(graph, acquired)| !*acquired && dm.matches(&graph.driver, &graph.entities))?;
        *acquired = true;

        Some(Box::new(VirtualMediaDevice {
            graph: graph.clone(),
            state: self.state.clone(),
        }))
    }
}

struct VirtualMediaDevice {
    graph: VirtualGraph,
    state: SharedState,
}

impl VirtualMediaDevice {
    fn find(&self, entity: &str) -> io::Result<&MediaEntity> {
        self.graph
            .entities
            .iter()
            .find(|e| e.name() == entity)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, entity.to_owned()))
    }
}

impl MediaDevice for VirtualMediaDevice {
    fn driver(&self) -> &str {
        &self.graph.driver
    }

    fn model(&self) -> &str {
        &self.graph.model
    }

    fn entities(&self) -> &[MediaEntity] {
        &self.graph.entities
    }

    fn subdevice(&self, entity: &str) -> io::Result<Box<dyn Subdevice>> {
        let entity = self.find(entity)?;
        Ok(Box::new(VirtualSubdevice {
            name: entity.name().to_owned(),
            state: self.state.clone(),
            open: false,
        }))
    }

    fn video_device(&self, entity: &str) -> io::Result<Box<dyn VideoDevice>> {
        let entity = self.find(entity)?;
        if entity.function() != EntityFunction::IoV4l {
            return Err(os_error(ENODEV));
        }
        Ok(Box::new(VirtualVideoDevice {
            name: entity.name().to_owned(),
            state: self.state.clone(),
            open: false,
        }))
    }

    fn setup_link(&mut self, entity: &str, _pad: u32, enable: bool) -> io::Result<()> {
        self.find(entity)?;
        let mut state = lock(&self.state);
        if state.take_fault(&Fault::Link(entity.to_owned())) {
            return Err(os_error(EBUSY));
        }
        state.links.insert(entity.to_owned(), enable);
        Ok(())
    }
}

fn open_entity(state: &SharedState, name: &str) -> io::Result<()> {
    let mut state = lock(state);
    *state.open_calls.entry(name.to_owned()).or_default() += 1;
    if state.take_fault(&Fault::Open(name.to_owned())) {
        return Err(os_error(ENODEV));
    }
    *state.open_handles.entry(name.to_owned()).or_default() += 1;
    Ok(())
}

fn close_entity(state: &SharedState, name: &str) {
    let mut state = lock(state);
    if let Some(count) = state.open_handles.get_mut(name) {
        *count = count.saturating_sub(1);
    }
}

struct VirtualSubdevice {
    name: String,
    state: SharedState,
    open: bool,
}

impl Subdevice for VirtualSubdevice {
    fn entity_name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> io::Result<()> {
        if self.open {
            return Ok(());
        }
        open_entity(&self.state, &self.name)?;
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn set_format(&mut self, pad: u32, format: &mut SubdeviceFormat) -> io::Result<()> {
        if !self.open {
            return Err(os_error(EBADF));
        }

        let mut state = lock(&self.state);
        state.format_log.push((self.name.clone(), Some(pad)));
        if state.take_fault(&Fault::SetFormat {
            entity: self.name.clone(),
            pad: Some(pad),
        }) {
            return Err(os_error(EINVAL));
        }

        format.size = state.clamp(&self.name, format.size);
        state.pad_formats.insert((self.name.clone(), pad), *format);
        Ok(())
    }
}

impl Drop for VirtualSubdevice {
    fn drop(&mut self) {
        if self.open {
            close_entity(&self.state, &self.name);
        }
    }
}

struct VirtualVideoDevice {
    name: String,
    state: SharedState,
    open: bool,
}

impl VirtualVideoDevice {
    fn check_open(&self) -> io::Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(os_error(EBADF))
        }
    }
}

impl VideoDevice for VirtualVideoDevice {
    fn entity_name(&self) -> &str {
        &self.name
    }

    fn connect_buffer_ready(&mut self, sender: Sender<BufferEvent>) {
        let mut state = lock(&self.state);
        state.sinks.entry(self.name.clone()).or_default().sender = Some(sender);
    }

    fn open(&mut self) -> io::Result<()> {
        if self.open {
            return Ok(());
        }
        open_entity(&self.state, &self.name)?;
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn set_format(&mut self, format: &mut DeviceFormat) -> io::Result<()> {
        self.check_open()?;

        let mut state = lock(&self.state);
        state.format_log.push((self.name.clone(), None));
        if state.take_fault(&Fault::SetFormat {
            entity: self.name.clone(),
            pad: None,
        }) {
            return Err(os_error(EINVAL));
        }

        let sink = state.sinks.entry(self.name.clone()).or_default();
        if sink.imported > 0 {
            return Err(os_error(EBUSY));
        }
        sink.format = Some(format.clone());
        Ok(())
    }

    fn export_buffers(&mut self, count: u32) -> io::Result<Vec<FrameBuffer>> {
        self.check_open()?;

        let state = lock(&self.state);
        let format = state
            .sinks
            .get(&self.name)
            .and_then(|sink| sink.format.as_ref())
            .ok_or_else(|| os_error(EINVAL))?;

        Ok((0..count)
            .map(|index| {
                let mut offset = 0;
                let planes = format
                    .planes
                    .iter()
                    .map(|plane| {
                        let p = FramePlane {
                            offset,
                            length: plane.size,
                        };
                        offset += plane.size;
                        p
                    })
                    .collect();
                FrameBuffer::new(index, planes)
            })
            .collect())
    }

    fn import_buffers(&mut self, count: u32) -> io::Result<()> {
        self.check_open()?;

        let mut state = lock(&self.state);
        if state.take_fault(&Fault::ImportBuffers(self.name.clone())) {
            return Err(os_error(EIO));
        }
        let sink = state.sinks.entry(self.name.clone()).or_default();
        if sink.format.is_none() || count == 0 {
            return Err(os_error(EINVAL));
        }
        sink.imported = count;
        Ok(())
    }

    fn release_buffers(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        if let Some(sink) = state.sinks.get_mut(&self.name) {
            if sink.streaming {
                return Err(os_error(EBUSY));
            }
            sink.imported = 0;
        }
        Ok(())
    }

    fn queue_buffer(&mut self, buffer: FrameBuffer) -> Result<(), (io::Error, FrameBuffer)> {
        if let Err(err) = self.check_open() {
            return Err((err, buffer));
        }

        let mut state = lock(&self.state);
        if state.take_fault(&Fault::QueueBuffer(self.name.clone())) {
            return Err((os_error(EIO), buffer));
        }
        let auto_complete = state.auto_complete;
        let sink = state.sinks.entry(self.name.clone()).or_default();
        if sink.imported == 0 {
            return Err((os_error(EINVAL), buffer));
        }
        sink.queued.push_back(buffer);

        if auto_complete && sink.streaming {
            state.complete(&self.name, FrameStatus::Success);
        }
        Ok(())
    }

    fn stream_on(&mut self) -> io::Result<()> {
        self.check_open()?;

        let mut state = lock(&self.state);
        if state.take_fault(&Fault::StreamOn(self.name.clone())) {
            return Err(os_error(EIO));
        }
        let auto_complete = state.auto_complete;
        let sink = state.sinks.entry(self.name.clone()).or_default();
        if sink.imported == 0 {
            return Err(os_error(EINVAL));
        }
        sink.streaming = true;
        sink.sequence = 0;

        if auto_complete {
            while state.complete(&self.name, FrameStatus::Success) {}
        }
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        match state.sinks.get_mut(&self.name) {
            Some(sink) => sink.streaming = false,
            None => return Ok(()),
        }
        while state.complete(&self.name, FrameStatus::Cancelled) {}
        Ok(())
    }
}

impl Drop for VirtualVideoDevice {
    fn drop(&mut self) {
        if self.open {
            close_entity(&self.state, &self.name);
        }
        let mut state = lock(&self.state);
        if let Some(sink) = state.sinks.get_mut(&self.name) {
            sink.sender = None;
            sink.streaming = false;
        }
    }
}

/// Inspection and fault injection handle for a virtual board.
#[derive(Debug, Clone)]
pub struct VirtualProbe {
    state: SharedState,
}

impl VirtualProbe {
    pub fn inject(&self, fault: Fault) {
        lock(&self.state).faults.push(fault);
    }

    pub fn inject_once(&self, fault: Fault) {
        lock(&self.state).one_shot.push(fault);
    }

    pub fn clear_faults(&self) {
        let mut state = lock(&self.state);
        state.faults.clear();
        state.one_shot.clear();
    }

    /// Handles currently open on `entity`
    pub fn open_handles(&self, entity: &str) -> usize {
        lock(&self.state)
            .open_handles
            .get(entity)
            .copied()
            .unwrap_or(0)
    }

    /// Handles currently open on the whole board
    pub fn total_open_handles(&self) -> usize {
        lock(&self.state).open_handles.values().sum()
    }

    /// Open attempts on `entity`, successful or not
    pub fn open_calls(&self, entity: &str) -> usize {
        lock(&self.state)
            .open_calls
            .get(entity)
            .copied()
            .unwrap_or(0)
    }

    pub fn pad_format(&self, entity: &str, pad: u32) -> Option<SubdeviceFormat> {
        lock(&self.state)
            .pad_formats
            .get(&(entity.to_owned(), pad))
            .copied()
    }

    pub fn video_format(&self, entity: &str) -> Option<DeviceFormat> {
        lock(&self.state)
            .sinks
            .get(entity)
            .and_then(|sink| sink.format.clone())
    }

    /// Every set_format call in order: entity name and pad, `None` for a
    /// video device.
    pub fn format_log(&self) -> Vec<(String, Option<u32>)> {
        lock(&self.state).format_log.clone()
    }

    pub fn clear_format_log(&self) {
        lock(&self.state).format_log.clear();
    }

    /// Make `entity` clamp every requested pad size to `max`.
    pub fn limit_size(&self, entity: &str, max: Size) {
        lock(&self.state).size_limits.insert(entity.to_owned(), max);
    }

    pub fn is_link_enabled(&self, entity: &str) -> bool {
        lock(&self.state)
            .links
            .get(entity)
            .copied()
            .unwrap_or(false)
    }

    pub fn is_streaming(&self, entity: &str) -> bool {
        lock(&self.state)
            .sinks
            .get(entity)
            .map(|sink| sink.streaming)
            .unwrap_or(false)
    }

    pub fn imported_buffers(&self, entity: &str) -> u32 {
        lock(&self.state)
            .sinks
            .get(entity)
            .map(|sink| sink.imported)
            .unwrap_or(0)
    }

    pub fn queued_buffers(&self, entity: &str) -> usize {
        lock(&self.state)
            .sinks
            .get(entity)
            .map(|sink| sink.queued.len())
            .unwrap_or(0)
    }

    /// Complete queued buffers as soon as their sink streams (the default),
    /// or only on [`complete_next`](Self::complete_next).
    pub fn set_auto_complete(&self, enable: bool) {
        lock(&self.state).auto_complete = enable;
    }

    /// Use `timestamp` for every completed buffer instead of the wall clock.
    pub fn set_clock(&self, timestamp: Timestamp) {
        lock(&self.state).clock = Some(timestamp);
    }

    /// Complete the oldest buffer queued on a streaming `entity`.
    pub fn complete_next(&self, entity: &str) -> bool {
        let mut state = lock(&self.state);
        let streaming = state
            .sinks
            .get(entity)
            .map(|sink| sink.streaming)
            .unwrap_or(false);
        streaming && state.complete(entity, FrameStatus::Success)
    }

    /// Discard every buffer queued on `entity` without completing it, as a
    /// sink that lost them would. Returns the number discarded.
    pub fn drop_queued(&self, entity: &str) -> usize {
        lock(&self.state)
            .sinks
            .get_mut(entity)
            .map(|sink| sink.queued.drain(..).count())
            .unwrap_or(0)
    }

    /// Complete the oldest buffer queued on `entity` with an error status.
    pub fn fail_next(&self, entity: &str) -> bool {
        lock(&self.state).complete(entity, FrameStatus::Error)
    }
}

/// The four-pipeline board the handler was brought up on.
///
/// | Pipeline | Sensor | Lens |
/// |----------|--------|------|
/// | 0 | imx219 | - |
/// | 1 | imx708 | dw9807 |
/// | 2 | imx500 | - |
/// | 3 | imx477 | - |
pub fn xilinx_reference_board() -> (VirtualEnumerator, VirtualProbe) {
    let enumerator = VirtualEnumerator::new()
        .with_graph(VirtualGraph::xilinx_pipeline(
            0,
            "imx219 1-0010",
            None,
            "80050000.mipi_csi2_rx_subsystem",
            "a0010000.ISPPipeline_accel",
            "a0040000.v_proc_ss",
        ))
        .with_graph(VirtualGraph::xilinx_pipeline(
            1,
            "imx708",
            Some("dw9807 2-000c"),
            "80051000.mipi_csi2_rx_subsystem",
            "a0030000.ISPPipeline_accel",
            "a00c0000.v_proc_ss",
        ))
        .with_graph(VirtualGraph::xilinx_pipeline(
            2,
            "imx500 3-001a",
            None,
            "80052000.mipi_csi2_rx_subsystem",
            "a0090000.ISPPipeline_accel",
            "a0100000.v_proc_ss",
        ))
        .with_graph(VirtualGraph::xilinx_pipeline(
            3,
            "imx477 4-001a",
            None,
            "80053000.mipi_csi2_rx_subsystem",
            "a00b0000.ISPPipeline_accel",
            "a0180000.v_proc_ss",
        ));
    let probe = enumerator.probe();
    (enumerator, probe)
}
