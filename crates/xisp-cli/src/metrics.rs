// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use serde::Serialize;
use std::time::{Duration, Instant};

/// Capture metrics collected while streaming
#[derive(Debug, Clone, Serialize)]
pub struct CaptureMetrics {
    /// Requests completed with every buffer filled
    pub frames_captured: u64,
    /// Buffers the capture sink flagged as corrupted
    pub error_frames: u64,
    /// Requests cancelled by stop
    pub cancelled_requests: u64,
    /// Total payload bytes captured
    pub bytes_captured: u64,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Average throughput in frames per second
    pub throughput_fps: f64,
    /// Minimum queue-to-completion latency in microseconds
    pub latency_min_us: u64,
    /// Maximum queue-to-completion latency in microseconds
    pub latency_max_us: u64,
    /// Average queue-to-completion latency in microseconds
    pub latency_avg_us: u64,
    /// 50th percentile (median) latency in microseconds
    pub latency_p50_us: u64,
    /// 99th percentile latency in microseconds
    pub latency_p99_us: u64,
    /// Gaps detected in the frame sequence
    pub dropped_frames: u64,
}

/// Metrics collector for a capture session
pub struct MetricsCollector {
    start_time: Instant,
    latencies_us: Vec<u64>,
    bytes: u64,
    error_frames: u64,
    cancelled: u64,
    prev_sequence: Option<u32>,
    dropped_frames: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            latencies_us: Vec::new(),
            bytes: 0,
            error_frames: 0,
            cancelled: 0,
            prev_sequence: None,
            dropped_frames: 0,
        }
    }

    /// Record one completed frame
    pub fn record_frame(&mut self, latency: Duration, bytes: u64) {
        self.latencies_us.push(latency.as_micros() as u64);
        self.bytes += bytes;
    }

    pub fn record_error(&mut self) {
        self.error_frames += 1;
    }

    pub fn record_cancelled(&mut self, count: u64) {
        self.cancelled += count;
    }

    /// Track the capture sink's frame sequence to detect drops
    /// Returns the number of dropped frames detected (0 or N)
    pub fn track_sequence(&mut self, sequence: u32) -> u64 {
        let drops = match self.prev_sequence {
            Some(prev) if sequence > prev.wrapping_add(1) => {
                u64::from(sequence - prev.wrapping_add(1))
            }
            Some(prev) if sequence <= prev => {
                log::warn!("Frame sequence went backwards: {} -> {}", prev, sequence);
                0
            }
            _ => 0,
        };

        self.dropped_frames += drops;
        self.prev_sequence = Some(sequence);
        drops
    }

    /// Finalize and calculate all metrics
    pub fn finalize(&mut self) -> CaptureMetrics {
        let duration = self.start_time.elapsed();
        let duration_secs = duration.as_secs_f64();
        let frames_captured = self.latencies_us.len() as u64;

        let throughput_fps = if duration_secs > 0.0 {
            frames_captured as f64 / duration_secs
        } else {
            0.0
        };

        self.latencies_us.sort_unstable();
        let (min_us, max_us, avg_us) =
            match (self.latencies_us.first(), self.latencies_us.last()) {
                (Some(&min), Some(&max)) => {
                    let sum: u64 = self.latencies_us.iter().sum();
                    (min, max, sum / frames_captured)
                }
                _ => (0, 0, 0),
            };

        CaptureMetrics {
            frames_captured,
            error_frames: self.error_frames,
            cancelled_requests: self.cancelled,
            bytes_captured: self.bytes,
            duration_ms: duration.as_millis() as u64,
            throughput_fps,
            latency_min_us: min_us,
            latency_max_us: max_us,
            latency_avg_us: avg_us,
            latency_p50_us: self.percentile(50.0),
            latency_p99_us: self.percentile(99.0),
            dropped_frames: self.dropped_frames,
        }
    }

    /// Assumes self.latencies_us is already sorted
    fn percentile(&self, p: f64) -> u64 {
        if self.latencies_us.is_empty() {
            return 0;
        }

        let len = self.latencies_us.len();
        let idx = ((p / 100.0) * (len - 1) as f64).round() as usize;
        self.latencies_us[idx.min(len - 1)]
    }

    /// Print metrics in human-readable format
    pub fn print_text(&mut self) {
        let metrics = self.finalize();
        println!("\n=== Capture Metrics ===");
        println!("Frames captured:   {}", metrics.frames_captured);
        println!("Error frames:      {}", metrics.error_frames);
        println!("Cancelled:         {}", metrics.cancelled_requests);
        println!(
            "Bytes captured:    {} ({:.2} MB)",
            metrics.bytes_captured,
            metrics.bytes_captured as f64 / 1_048_576.0
        );
        println!(
            "Duration:          {:.2} s",
            metrics.duration_ms as f64 / 1000.0
        );
        println!("Throughput:        {:.2} fps", metrics.throughput_fps);

        if metrics.frames_captured > 0 {
            println!("\nLatency Statistics (us):");
            println!("  Min:    {}", metrics.latency_min_us);
            println!("  Max:    {}", metrics.latency_max_us);
            println!("  Avg:    {}", metrics.latency_avg_us);
            println!("  P50:    {}", metrics.latency_p50_us);
            println!("  P99:    {}", metrics.latency_p99_us);
        }

        if metrics.dropped_frames > 0 {
            println!("\nDropped frames:    {}", metrics.dropped_frames);
        }
    }

    /// Print metrics in JSON format
    pub fn print_json(&mut self) -> Result<(), serde_json::Error> {
        let metrics = self.finalize();
        let json = serde_json::to_string_pretty(&metrics)?;
        println!("{}", json);
        Ok(())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_statistics() {
        let mut collector = MetricsCollector::new();

        // 0, 10, 20, ..., 100 us (11 values)
        for i in 0..=10 {
            collector.record_frame(Duration::from_micros(i * 10), 1000);
        }

        let metrics = collector.finalize();
        assert_eq!(metrics.frames_captured, 11);
        assert_eq!(metrics.bytes_captured, 11_000);
        assert_eq!(metrics.latency_min_us, 0);
        assert_eq!(metrics.latency_max_us, 100);
        assert_eq!(metrics.latency_avg_us, 50);
        assert_eq!(metrics.latency_p50_us, 50);
        assert_eq!(metrics.latency_p99_us, 100);
    }

    #[test]
    fn test_sequence_gaps() {
        let mut collector = MetricsCollector::new();

        assert_eq!(collector.track_sequence(0), 0);
        assert_eq!(collector.track_sequence(1), 0);
        assert_eq!(collector.track_sequence(5), 3);
        assert_eq!(collector.track_sequence(6), 0);
        assert_eq!(collector.track_sequence(2), 0);
        assert_eq!(collector.dropped_frames, 3);
    }

    #[test]
    fn test_empty_metrics() {
        let mut collector = MetricsCollector::new();
        collector.record_cancelled(2);
        collector.record_error();

        let metrics = collector.finalize();
        assert_eq!(metrics.frames_captured, 0);
        assert_eq!(metrics.error_frames, 1);
        assert_eq!(metrics.cancelled_requests, 2);
        assert_eq!(metrics.latency_min_us, 0);
        assert_eq!(metrics.latency_p99_us, 0);
        assert_eq!(metrics.throughput_fps, 0.0);
    }
}
