// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Pipeline discovery: bind every camera on the board and print its entities.

use crate::board::BoardArgs;
use crate::error::CliError;
use clap::Args as ClapArgs;
use serde::Serialize;
use xisp::pipeline::Camera;

#[derive(ClapArgs, Debug)]
pub struct Args {
    #[command(flatten)]
    board: BoardArgs,
}

#[derive(Debug, Serialize)]
struct CameraInfo {
    id: String,
    candidate: usize,
    model: &'static str,
    native_size: String,
    streams: usize,
    entities: Vec<EntityInfo>,
}

#[derive(Debug, Serialize)]
struct EntityInfo {
    role: &'static str,
    name: String,
}

impl From<&Camera> for CameraInfo {
    fn from(camera: &Camera) -> Self {
        let profile = camera.sensor_profile();
        CameraInfo {
            id: camera.id().to_string(),
            candidate: camera.binding().candidate(),
            model: profile.model,
            native_size: profile.size.to_string(),
            streams: camera.stream_count(),
            entities: camera
                .binding()
                .entities()
                .into_iter()
                .map(|(role, name)| EntityInfo {
                    role: role.tag(),
                    name,
                })
                .collect(),
        }
    }
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Executing probe command: {:?}", args);

    let (mut enumerator, probe, handler) = args.board.open()?;
    let cameras = handler.discover_cameras(&mut enumerator);
    if cameras.is_empty() {
        return Err(CliError::CameraNotFound(format!(
            "No pipeline matched driver {}",
            handler.options().driver
        )));
    }

    let infos: Vec<CameraInfo> = cameras.iter().map(CameraInfo::from).collect();
    log::debug!(
        "{} cameras bound, {} device handles open",
        cameras.len(),
        probe.total_open_handles()
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    for (index, info) in infos.iter().enumerate() {
        println!(
            "Camera {}: {} (pipeline {}, {} {})",
            index, info.id, info.candidate, info.model, info.native_size
        );
        for entity in &info.entities {
            println!("  [{:<4}] {}", entity.role, entity.name);
        }
    }

    Ok(())
}
