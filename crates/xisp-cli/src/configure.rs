// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Generate, validate and apply a stream configuration, then show the format
//! applied at every stage of the chain.

use crate::board::BoardArgs;
use crate::error::CliError;
use crate::utils;
use clap::Args as ClapArgs;
use serde::Serialize;
use xisp::config::{CameraConfiguration, ConfigStatus};
use xisp::pipeline::Camera;
use xisp::virtual_device::VirtualProbe;

#[derive(ClapArgs, Debug)]
pub struct Args {
    #[command(flatten)]
    board: BoardArgs,

    #[command(flatten)]
    stream: StreamArgs,
}

/// Stream selection shared by configure and capture
#[derive(ClapArgs, Debug)]
pub struct StreamArgs {
    /// Camera index in discovery order
    #[arg(short, long, default_value = "0")]
    camera: usize,

    /// Stream role (viewfinder, still, video, raw)
    #[arg(long, default_value = "viewfinder")]
    role: String,

    /// Output pixel format (YUYV, RGB888, BGR888, RBG888)
    #[arg(long)]
    format: Option<String>,

    /// Output resolution in WxH format
    #[arg(short, long)]
    resolution: Option<String>,

    /// Number of capture buffers
    #[arg(short, long)]
    buffers: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ConfigureOutput {
    camera: String,
    status: String,
    streams: Vec<StreamInfo>,
    stages: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StreamInfo {
    format: String,
    size: String,
    stride: u32,
    frame_size: u32,
    buffer_count: u32,
}

/// A camera configured from the command line
pub struct Configured {
    pub camera: Camera,
    pub probe: VirtualProbe,
    pub status: ConfigStatus,
    pub config: CameraConfiguration,
}

impl StreamArgs {
    /// Bind the selected camera and apply the requested stream to it
    pub fn configure(&self, board: &BoardArgs) -> Result<Configured, CliError> {
        let role = utils::parse_role(&self.role)?;
        let format = self
            .format
            .as_deref()
            .map(utils::parse_pixel_format)
            .transpose()?;
        let size = self
            .resolution
            .as_deref()
            .map(utils::parse_resolution)
            .transpose()?;

        let (mut camera, probe) = board.camera(self.camera)?;
        let mut config = camera.generate_configuration(&[role])?;
        if let Some(stream) = config.get_mut(0) {
            if let Some(format) = format {
                stream.pixel_format = format;
            }
            if let Some(size) = size {
                stream.size = size;
            }
            if let Some(buffers) = self.buffers {
                stream.buffer_count = buffers;
            }
        }

        let status = config.validate();
        if status == ConfigStatus::Adjusted {
            log::warn!("Requested stream was adjusted to {}", describe(&config));
        }
        camera.configure(&mut config)?;

        Ok(Configured {
            camera,
            probe,
            status,
            config,
        })
    }
}

fn describe(config: &CameraConfiguration) -> String {
    config
        .iter()
        .map(|stream| stream.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Executing configure command: {:?}", args);

    let configured = args.stream.configure(&args.board)?;
    let camera = &configured.camera;

    let output = ConfigureOutput {
        camera: camera.id().to_string(),
        status: format!("{:?}", configured.status),
        streams: camera
            .streams()
            .iter()
            .map(|stream| StreamInfo {
                format: stream.pixel_format.to_string(),
                size: stream.size.to_string(),
                stride: stream.stride,
                frame_size: stream.frame_size,
                buffer_count: stream.buffer_count,
            })
            .collect(),
        stages: camera
            .applied_formats()
            .map(|plan| plan.steps().iter().map(|step| step.to_string()).collect())
            .unwrap_or_default(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Camera: {}", output.camera);
    println!("Configuration: {}", output.status);
    for (index, stream) in output.streams.iter().enumerate() {
        println!(
            "Stream {}: {} {} stride {} frame {} bytes, {} buffers",
            index, stream.size, stream.format, stream.stride, stream.frame_size, stream.buffer_count
        );
    }
    println!("Stages:");
    for stage in &output.stages {
        println!("  {}", stage);
    }

    Ok(())
}
