// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use crate::board::BoardArgs;
use crate::configure::{Configured, StreamArgs};
use crate::error::CliError;
use crate::metrics::MetricsCollector;
use crate::utils;
use clap::Args as ClapArgs;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use xisp::buffer::FrameStatus;
use xisp::config::StreamId;
use xisp::request::{Request, RequestStatus};

const STREAM: StreamId = StreamId(0);

#[derive(ClapArgs, Debug)]
pub struct Args {
    #[command(flatten)]
    board: BoardArgs,

    #[command(flatten)]
    stream: StreamArgs,

    /// Number of frames to capture (0=unlimited)
    #[arg(short, long, default_value = "30")]
    frames: u64,

    /// Frame timeout in milliseconds
    #[arg(long, default_value = "1000")]
    timeout: u64,
}

pub fn execute(args: Args, json: bool) -> Result<(), CliError> {
    log::debug!("Executing capture command: {:?}", args);

    if args.timeout == 0 {
        return Err(CliError::InvalidArgs(
            "Frame timeout must be positive".to_string(),
        ));
    }
    let timeout = Duration::from_millis(args.timeout);

    // Install signal handler for graceful shutdown
    let term = utils::install_signal_handler()?;

    let Configured { mut camera, .. } = args.stream.configure(&args.board)?;
    let buffers = camera.export_frame_buffers(STREAM)?;
    log::info!("Exported {} buffers", buffers.len());

    camera.start(None)?;

    let mut metrics = MetricsCollector::new();
    let mut queued_at: HashMap<u64, Instant> = HashMap::new();
    let mut next_cookie = 0u64;

    for buffer in buffers {
        let mut request = Request::new(next_cookie);
        request.add_buffer(STREAM, buffer);
        queued_at.insert(next_cookie, Instant::now());
        camera.queue_request(request)?;
        next_cookie += 1;
    }

    let max_frames = if args.frames == 0 {
        u64::MAX
    } else {
        args.frames
    };

    log::info!(
        "Capturing {} frames (Ctrl+C to stop)...",
        if max_frames == u64::MAX {
            "unlimited".to_string()
        } else {
            max_frames.to_string()
        }
    );

    let mut frame_count = 0u64;
    while frame_count < max_frames && !term.load(Ordering::Relaxed) {
        let Some(mut request) = camera.wait_for_completion(timeout) else {
            camera.stop();
            return Err(CliError::Timeout(format!(
                "No frame completed within {} ms",
                args.timeout
            )));
        };

        let latency = queued_at
            .remove(&request.cookie())
            .map(|queued| queued.elapsed())
            .unwrap_or_default();

        if let Some(buffer) = request.buffers().get(&STREAM) {
            let frame = buffer.metadata();
            match frame.status {
                FrameStatus::Success => {
                    metrics.record_frame(latency, u64::from(frame.bytes_used));
                    metrics.track_sequence(frame.sequence);
                }
                FrameStatus::Error => {
                    log::warn!("Frame {} flagged as corrupted", frame.sequence);
                    metrics.record_error();
                    metrics.track_sequence(frame.sequence);
                }
                FrameStatus::Cancelled => {}
            }
            log::debug!("Request {} completed: {}", request.cookie(), buffer);
        }
        frame_count += 1;

        if frame_count < max_frames {
            let mut requeue = Request::new(next_cookie);
            for (stream, buffer) in request.take_buffers() {
                requeue.add_buffer(stream, buffer);
            }
            queued_at.insert(next_cookie, Instant::now());
            camera.queue_request(requeue)?;
            next_cookie += 1;
        }
    }

    if term.load(Ordering::Relaxed) {
        log::info!("Interrupted after {} frames", frame_count);
    }

    let returned = camera.stop();
    let cancelled = returned
        .iter()
        .filter(|request| request.status() == RequestStatus::Cancelled)
        .count();
    metrics.record_cancelled(cancelled as u64);
    log::info!("Capture stopped, {} requests returned", returned.len());

    if json {
        metrics.print_json()?;
    } else {
        metrics.print_text();
    }

    Ok(())
}
