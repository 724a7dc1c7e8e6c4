// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Sensor capability table listing.

use crate::error::CliError;
use clap::Args as ClapArgs;
use serde::Serialize;
use xisp::sensor;

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Show only the profile matching this sensor entity name
    #[arg(short, long)]
    entity: Option<String>,
}

#[derive(Debug, Serialize)]
struct SensorInfo {
    model: &'static str,
    width: u32,
    height: u32,
    code: String,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Executing sensors command: {:?}", args);

    let profiles: Vec<_> = match &args.entity {
        Some(name) => vec![sensor::lookup(name)
            .ok_or_else(|| CliError::CameraNotFound(format!("Unknown sensor: {}", name)))?],
        None => sensor::profiles().iter().collect(),
    };

    let sensors: Vec<SensorInfo> = profiles
        .into_iter()
        .map(|profile| SensorInfo {
            model: profile.model,
            width: profile.size.width,
            height: profile.size.height,
            code: profile.code.to_string(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&sensors)?);
        return Ok(());
    }

    println!("{:<8} {:<10} CODE", "MODEL", "SIZE");
    for info in &sensors {
        println!(
            "{:<8} {:<10} {}",
            info.model,
            format!("{}x{}", info.width, info.height),
            info.code
        );
    }

    Ok(())
}
