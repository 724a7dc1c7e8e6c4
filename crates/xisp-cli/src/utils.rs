// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::error::CliError;
use signal_hook::consts::SIGINT;
use signal_hook::flag;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use xisp::config::StreamRole;
use xisp::formats::PixelFormat;
use xisp::geometry::Size;

/// Parse resolution string in format "WxH" or "W*H"
pub fn parse_resolution(s: &str) -> Result<Size, CliError> {
    let (width_str, height_str) = s
        .split_once('x')
        .or_else(|| s.split_once('*'))
        .ok_or_else(|| {
            CliError::InvalidArgs(format!(
                "Invalid resolution format (expected WxH or W*H): {}",
                s
            ))
        })?;

    let width = width_str
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("Invalid width in resolution: {}", s)))?;
    let height = height_str
        .parse::<u32>()
        .map_err(|_| CliError::InvalidArgs(format!("Invalid height in resolution: {}", s)))?;

    if width == 0 || height == 0 {
        return Err(CliError::InvalidArgs(format!(
            "Resolution dimensions must be positive: {}",
            s
        )));
    }

    Ok(Size::new(width, height))
}

/// Parse a pixel format by name ("RGB888") or FOURCC ("RG24")
pub fn parse_pixel_format(s: &str) -> Result<PixelFormat, CliError> {
    if let Some(format) = PixelFormat::from_name(s) {
        return Ok(format);
    }

    xisp::formats::PixelFormatInfo::all()
        .iter()
        .find(|info| info.format.fourcc().to_string().eq_ignore_ascii_case(s))
        .map(|info| info.format)
        .ok_or_else(|| CliError::InvalidArgs(format!("Unsupported pixel format: {}", s)))
}

/// Parse a stream role name
pub fn parse_role(s: &str) -> Result<StreamRole, CliError> {
    match s.to_ascii_lowercase().as_str() {
        "viewfinder" => Ok(StreamRole::Viewfinder),
        "still" | "still-capture" => Ok(StreamRole::StillCapture),
        "video" | "video-recording" => Ok(StreamRole::VideoRecording),
        "raw" => Ok(StreamRole::Raw),
        _ => Err(CliError::InvalidArgs(format!(
            "Unknown stream role (expected viewfinder, still, video or raw): {}",
            s
        ))),
    }
}

/// Install SIGINT handler and return atomic flag for checking termination
pub fn install_signal_handler() -> Result<Arc<AtomicBool>, CliError> {
    let term = Arc::new(AtomicBool::new(false));

    flag::register(SIGINT, Arc::clone(&term))
        .map_err(|e| CliError::General(format!("Failed to register signal handler: {}", e)))?;

    log::debug!("Installed SIGINT handler");
    Ok(term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("1920x1080").unwrap(), Size::new(1920, 1080));
        assert_eq!(parse_resolution("1280*720").unwrap(), Size::new(1280, 720));
        assert_eq!(parse_resolution("640x480").unwrap(), Size::new(640, 480));

        assert!(parse_resolution("invalid").is_err());
        assert!(parse_resolution("1920").is_err());
        assert!(parse_resolution("0x1080").is_err());
        assert!(parse_resolution("1920x-1").is_err());
    }

    #[test]
    fn test_parse_pixel_format() {
        assert_eq!(parse_pixel_format("RGB888").unwrap(), PixelFormat::RGB888);
        assert_eq!(parse_pixel_format("rbg888").unwrap(), PixelFormat::RBG888);
        assert_eq!(parse_pixel_format("YUYV").unwrap(), PixelFormat::YUYV);
        assert_eq!(parse_pixel_format("BG24").unwrap(), PixelFormat::BGR888);
        assert!(parse_pixel_format("NV12").is_err());
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role("viewfinder").unwrap(), StreamRole::Viewfinder);
        assert_eq!(parse_role("Still").unwrap(), StreamRole::StillCapture);
        assert_eq!(
            parse_role("video-recording").unwrap(),
            StreamRole::VideoRecording
        );
        assert_eq!(parse_role("raw").unwrap(), StreamRole::Raw);
        assert!(parse_role("preview").is_err());
    }
}
