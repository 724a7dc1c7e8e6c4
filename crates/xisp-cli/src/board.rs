// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Simulated board selection.
//!
//! Every command runs against an in-memory media graph: either the built-in
//! four-pipeline Xilinx reference board or a JSON topology file such as
//!
//! ```json
//! {
//!   "graphs": [
//!     {
//!       "driver": "xilinx-video",
//!       "model": "vcap_mipi_0",
//!       "entities": [
//!         { "name": "vcap_mipi_0_v_proc output 0", "function": "io-v4l" },
//!         { "name": "imx219 1-0010", "function": "cam-sensor" },
//!         { "name": "80050000.mipi_csi2_rx_subsystem", "function": "vid-if-bridge" },
//!         { "name": "a0010000.ISPPipeline_accel", "function": "proc-video-isp" },
//!         { "name": "a0040000.v_proc_ss", "function": "proc-video-scaler", "max_size": [1280, 720] }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::error::CliError;
use clap::Args as ClapArgs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use xisp::geometry::Size;
use xisp::media::EntityFunction;
use xisp::pipeline::{
    Camera, PipelineHandler, PipelineOptions, DEFAULT_CANDIDATES, DEFAULT_DRIVER,
};
use xisp::virtual_device::{xilinx_reference_board, VirtualEnumerator, VirtualGraph, VirtualProbe};

/// Board selection shared by every command
#[derive(ClapArgs, Debug)]
pub struct BoardArgs {
    /// JSON topology file (defaults to the built-in reference board)
    #[arg(short, long)]
    topology: Option<PathBuf>,

    /// Media controller driver name to match
    #[arg(long, default_value = DEFAULT_DRIVER)]
    driver: String,

    /// Number of candidate pipelines to try
    #[arg(long, default_value_t = DEFAULT_CANDIDATES)]
    candidates: usize,
}

impl BoardArgs {
    /// Build the simulated board and a handler configured from the flags
    pub fn open(&self) -> Result<(VirtualEnumerator, VirtualProbe, PipelineHandler), CliError> {
        if self.candidates == 0 {
            return Err(CliError::InvalidArgs(
                "At least one candidate pipeline is required".to_string(),
            ));
        }

        let (enumerator, probe) = match &self.topology {
            Some(path) => load(path)?,
            None => {
                log::debug!("Using built-in reference board");
                xilinx_reference_board()
            }
        };

        let options = PipelineOptions::default()
            .with_driver(&self.driver)
            .with_candidates(self.candidates);

        Ok((enumerator, probe, PipelineHandler::new(options)))
    }

    /// Discover the board and keep the camera at `index` in discovery order
    pub fn camera(&self, index: usize) -> Result<(Camera, VirtualProbe), CliError> {
        let (mut enumerator, probe, handler) = self.open()?;
        let cameras = handler.discover_cameras(&mut enumerator);
        let available = cameras.len();

        let camera = cameras.into_iter().nth(index).ok_or_else(|| {
            CliError::CameraNotFound(format!(
                "Camera {} not found ({} available)",
                index, available
            ))
        })?;
        log::info!("Using camera {}: {}", index, camera.id());
        Ok((camera, probe))
    }
}

#[derive(Debug, Deserialize)]
struct TopologyFile {
    graphs: Vec<GraphSpec>,
}

#[derive(Debug, Deserialize)]
struct GraphSpec {
    #[serde(default = "default_driver")]
    driver: String,
    model: String,
    entities: Vec<EntitySpec>,
}

#[derive(Debug, Deserialize)]
struct EntitySpec {
    name: String,
    function: FunctionSpec,
    #[serde(default)]
    max_size: Option<[u32; 2]>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FunctionSpec {
    Name(FunctionName),
    Raw(u32),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum FunctionName {
    IoV4l,
    CamSensor,
    Lens,
    VidIfBridge,
    ProcVideoIsp,
    ProcVideoScaler,
    ProcVideoPixelEncConv,
    V4l2SubdevUnknown,
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

impl From<&FunctionSpec> for EntityFunction {
    fn from(spec: &FunctionSpec) -> Self {
        match spec {
            FunctionSpec::Name(FunctionName::IoV4l) => EntityFunction::IoV4l,
            FunctionSpec::Name(FunctionName::CamSensor) => EntityFunction::CamSensor,
            FunctionSpec::Name(FunctionName::Lens) => EntityFunction::Lens,
            FunctionSpec::Name(FunctionName::VidIfBridge) => EntityFunction::VidIfBridge,
            FunctionSpec::Name(FunctionName::ProcVideoIsp) => EntityFunction::ProcVideoIsp,
            FunctionSpec::Name(FunctionName::ProcVideoScaler) => EntityFunction::ProcVideoScaler,
            FunctionSpec::Name(FunctionName::ProcVideoPixelEncConv) => {
                EntityFunction::ProcVideoPixelEncConv
            }
            FunctionSpec::Name(FunctionName::V4l2SubdevUnknown) => {
                EntityFunction::V4l2SubdevUnknown
            }
            FunctionSpec::Raw(raw) => EntityFunction::from_raw(*raw),
        }
    }
}

/// Load a JSON topology file into a simulated board
pub fn load(path: &Path) -> Result<(VirtualEnumerator, VirtualProbe), CliError> {
    log::debug!("Loading topology from {}", path.display());
    let text = fs::read_to_string(path).map_err(|e| {
        CliError::InvalidArgs(format!("Cannot read topology {}: {}", path.display(), e))
    })?;
    parse(&text)
}

fn parse(text: &str) -> Result<(VirtualEnumerator, VirtualProbe), CliError> {
    let file: TopologyFile = serde_json::from_str(text)
        .map_err(|e| CliError::InvalidArgs(format!("Invalid topology: {}", e)))?;

    let mut enumerator = VirtualEnumerator::new();
    let probe = enumerator.probe();

    for spec in &file.graphs {
        let mut graph = VirtualGraph::new(&spec.driver, &spec.model);
        for entity in &spec.entities {
            graph = graph.entity(&entity.name, EntityFunction::from(&entity.function));
            if let Some([width, height]) = entity.max_size {
                probe.limit_size(&entity.name, Size::new(width, height));
            }
        }
        log::debug!(
            "Graph {} ({}): {} entities",
            spec.model,
            spec.driver,
            spec.entities.len()
        );
        enumerator.add_graph(graph);
    }

    Ok((enumerator, probe))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &str = r#"{
        "graphs": [{
            "model": "vcap_mipi_0",
            "entities": [
                { "name": "vcap_mipi_0_v_proc output 0", "function": "io-v4l" },
                { "name": "imx219 1-0010", "function": "cam-sensor" },
                { "name": "80050000.mipi_csi2_rx_subsystem", "function": "vid-if-bridge" },
                { "name": "a0010000.ISPPipeline_accel", "function": "proc-video-isp" },
                { "name": "a0040000.v_proc_ss", "function": 16389, "max_size": [1280, 720] }
            ]
        }]
    }"#;

    #[test]
    fn test_parse_topology() {
        let (mut enumerator, probe) = parse(SINGLE).unwrap();
        let camera = PipelineHandler::default()
            .match_camera(&mut enumerator)
            .unwrap();
        assert_eq!(camera.id(), "imx219 1-0010");
        assert_eq!(camera.binding().pipes()[0].resizer_name(), "a0040000.v_proc_ss");
        drop(camera);
        assert_eq!(probe.total_open_handles(), 0);
    }

    #[test]
    fn test_invalid_topology() {
        assert!(matches!(
            parse("{\"graphs\": 3}"),
            Err(CliError::InvalidArgs(_))
        ));
        assert!(matches!(
            parse(r#"{"graphs": [{"model": "m", "entities": [{"name": "x", "function": "flux"}]}]}"#),
            Err(CliError::InvalidArgs(_))
        ));
    }
}
