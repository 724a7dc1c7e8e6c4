// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// Capture Lifecycle Tests
//
// TESTING LAYERS:
//
// Layer 2 (Simulated Board - In-memory media devices):
//   - Buffer export, start, request queuing and completion
//   - Sensor timestamp stamping
//   - Stop drain barrier and cancellation of in-flight requests
//   - Start and queue failures
//   - Completions delivered from another thread
//
// RUN LAYER 2:
//   cargo test --test capture_lifecycle

use std::thread;
use std::time::Duration;

use unix_ts::Timestamp;
use xisp::buffer::{FrameBuffer, FrameStatus};
use xisp::config::{StreamId, StreamRole};
use xisp::pipeline::{Camera, CameraState, PipelineHandler, PipelineOptions};
use xisp::request::{ControlId, ControlValue, Request, RequestStatus};
use xisp::virtual_device::{xilinx_reference_board, Fault, VirtualProbe};
use xisp::{Error, ErrorKind};

const CAPTURE: &str = "vcap_mipi_0_v_proc output 0";
const STREAM: StreamId = StreamId(0);

fn configured_camera(options: PipelineOptions) -> (Camera, VirtualProbe) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (mut enumerator, probe) = xilinx_reference_board();
    let mut camera = PipelineHandler::new(options)
        .match_camera(&mut enumerator)
        .unwrap();
    let mut config = camera
        .generate_configuration(&[StreamRole::VideoRecording])
        .unwrap();
    camera.configure(&mut config).unwrap();
    (camera, probe)
}

fn request(cookie: u64, buffer: FrameBuffer) -> Request {
    let mut request = Request::new(cookie);
    request.add_buffer(STREAM, buffer);
    request
}

// =============================================================================
// Layer 2: Simulated Board
// =============================================================================

#[test]
fn test_export_uses_configured_buffer_count() {
    let (mut camera, _probe) = configured_camera(PipelineOptions::default());

    let buffers = camera.export_frame_buffers(STREAM).unwrap();
    assert_eq!(buffers.len(), 4);
    assert_eq!(buffers[3].index(), 3);
    assert_eq!(buffers[0].planes()[0].length, 1920 * 480);

    let err = camera.export_frame_buffers(StreamId(1)).unwrap_err();
    assert!(matches!(err, Error::NoPipe(StreamId(1))));
}

#[test]
fn test_capture_completes_requests() {
    let (mut camera, probe) = configured_camera(PipelineOptions::default());
    probe.set_clock(Timestamp::new(12, 345));

    let buffers = camera.export_frame_buffers(STREAM).unwrap();
    camera.start(None).unwrap();
    assert_eq!(camera.state(), CameraState::Running);
    assert!(probe.is_streaming(CAPTURE));
    assert_eq!(probe.imported_buffers(CAPTURE), 4);

    for (cookie, buffer) in buffers.into_iter().enumerate() {
        camera.queue_request(request(cookie as u64, buffer)).unwrap();
    }

    let completed = camera.process_completions();
    assert_eq!(completed.len(), 4);
    for (sequence, request) in completed.iter().enumerate() {
        assert_eq!(request.status(), RequestStatus::Complete);
        assert_eq!(
            request.metadata().sensor_timestamp(),
            Some(Timestamp::new(12, 345))
        );
        assert_eq!(
            request.metadata().get(ControlId::FrameSequence),
            Some(ControlValue::U32(sequence as u32))
        );
        let buffer = &request.buffers()[&STREAM];
        assert_eq!(buffer.metadata().status, FrameStatus::Success);
        assert_eq!(buffer.request(), Some(request.cookie()));
    }

    assert!(camera.stop().is_empty());
    assert!(!probe.is_streaming(CAPTURE));
    assert_eq!(probe.imported_buffers(CAPTURE), 0);
    assert_eq!(camera.state(), CameraState::Configured);
}

#[test]
fn test_sensor_timestamp_is_not_overwritten() {
    let (mut camera, probe) = configured_camera(PipelineOptions::default());
    probe.set_clock(Timestamp::new(99, 0));

    let mut buffers = camera.export_frame_buffers(STREAM).unwrap();
    camera.start(None).unwrap();

    let mut preset = request(1, buffers.remove(0));
    preset.metadata_mut().set(
        ControlId::SensorTimestamp,
        ControlValue::Timestamp(Timestamp::new(7, 0)),
    );
    camera.queue_request(preset).unwrap();

    let done = camera.wait_for_completion(Duration::from_secs(1)).unwrap();
    assert_eq!(
        done.metadata().sensor_timestamp(),
        Some(Timestamp::new(7, 0))
    );
}

#[test]
fn test_requests_requeue_their_buffers() {
    let (mut camera, probe) = configured_camera(PipelineOptions::default());
    probe.set_auto_complete(false);

    let buffers = camera.export_frame_buffers(STREAM).unwrap();
    camera.start(None).unwrap();
    for (cookie, buffer) in buffers.into_iter().enumerate() {
        camera.queue_request(request(cookie as u64, buffer)).unwrap();
    }

    let mut next_cookie = 4;
    for _ in 0..10 {
        assert!(probe.complete_next(CAPTURE));
        let mut done = camera.wait_for_completion(Duration::from_secs(1)).unwrap();
        assert_eq!(done.status(), RequestStatus::Complete);

        let buffer = done.take_buffers().remove(&STREAM).unwrap();
        camera.queue_request(request(next_cookie, buffer)).unwrap();
        next_cookie += 1;
    }

    assert_eq!(camera.in_flight(), 4);
    assert_eq!(probe.queued_buffers(CAPTURE), 4);
}

#[test]
fn test_stop_drains_in_flight_requests() {
    let (mut camera, probe) = configured_camera(PipelineOptions::default());
    probe.set_auto_complete(false);
    probe.set_clock(Timestamp::new(5, 250));

    let buffers = camera.export_frame_buffers(STREAM).unwrap();
    camera.start(None).unwrap();
    for (cookie, buffer) in buffers.into_iter().enumerate() {
        camera.queue_request(request(cookie as u64, buffer)).unwrap();
    }
    assert!(probe.complete_next(CAPTURE));

    let returned = camera.stop();
    assert_eq!(returned.len(), 4);
    assert_eq!(returned[0].status(), RequestStatus::Complete);
    assert!(returned[1..]
        .iter()
        .all(|r| r.status() == RequestStatus::Cancelled));
    assert!(returned.iter().all(|r| r.buffers().contains_key(&STREAM)));
    // Buffers cancelled by stream off still stamp their requests
    assert!(returned
        .iter()
        .all(|r| r.metadata().sensor_timestamp() == Some(Timestamp::new(5, 250))));
    assert_eq!(
        returned[3].metadata().get(ControlId::FrameSequence),
        Some(ControlValue::U32(1))
    );
    assert_eq!(camera.in_flight(), 0);
    assert_eq!(probe.queued_buffers(CAPTURE), 0);
    assert_eq!(probe.imported_buffers(CAPTURE), 0);
}

#[test]
fn test_error_frames_complete_the_request() {
    let (mut camera, probe) = configured_camera(PipelineOptions::default());
    probe.set_auto_complete(false);

    let mut buffers = camera.export_frame_buffers(STREAM).unwrap();
    camera.start(None).unwrap();
    camera.queue_request(request(0, buffers.remove(0))).unwrap();

    assert!(probe.fail_next(CAPTURE));
    let done = camera.wait_for_completion(Duration::from_secs(1)).unwrap();
    assert_eq!(done.status(), RequestStatus::Complete);
    assert_eq!(
        done.buffers()[&STREAM].metadata().status,
        FrameStatus::Error
    );
}

#[test]
fn test_wait_times_out_without_completion() {
    let (mut camera, probe) = configured_camera(PipelineOptions::default());
    probe.set_auto_complete(false);

    let mut buffers = camera.export_frame_buffers(STREAM).unwrap();
    camera.start(None).unwrap();
    camera.queue_request(request(0, buffers.remove(0))).unwrap();

    assert!(camera
        .wait_for_completion(Duration::from_millis(20))
        .is_none());
    assert_eq!(camera.in_flight(), 1);
}

#[test]
fn test_completion_from_another_thread() {
    let (mut camera, probe) = configured_camera(PipelineOptions::default());
    probe.set_auto_complete(false);

    let buffers = camera.export_frame_buffers(STREAM).unwrap();
    camera.start(None).unwrap();
    for (cookie, buffer) in buffers.into_iter().enumerate() {
        camera.queue_request(request(cookie as u64, buffer)).unwrap();
    }

    let remote = probe.clone();
    let completer = thread::spawn(move || {
        for _ in 0..4 {
            thread::sleep(Duration::from_millis(5));
            remote.complete_next(CAPTURE);
        }
    });

    let mut completed = 0;
    while completed < 4 {
        match camera.wait_for_completion(Duration::from_secs(2)) {
            Some(request) => {
                assert_eq!(request.status(), RequestStatus::Complete);
                completed += 1;
            }
            None => panic!("timed out after {} completions", completed),
        }
    }
    completer.join().unwrap();
}

#[test]
fn test_stop_times_out_on_lost_buffers() {
    let options = PipelineOptions::default().with_drain_timeout(Duration::from_millis(10));
    let (mut camera, probe) = configured_camera(options);
    probe.set_auto_complete(false);

    let mut buffers = camera.export_frame_buffers(STREAM).unwrap();
    camera.start(None).unwrap();
    camera.queue_request(request(0, buffers.remove(0))).unwrap();
    assert_eq!(probe.drop_queued(CAPTURE), 1);

    let returned = camera.stop();
    assert_eq!(returned.len(), 1);
    assert_eq!(returned[0].cookie(), 0);
    assert_eq!(returned[0].status(), RequestStatus::Cancelled);
    assert!(returned[0].buffers().is_empty());
    assert!(!returned[0].has_pending_buffers());
    assert_eq!(camera.in_flight(), 0);
}

#[test]
fn test_start_failure_is_torn_down_by_stop() {
    let (mut camera, probe) = configured_camera(PipelineOptions::default());
    probe.inject(Fault::StreamOn(CAPTURE.into()));

    let err = camera.start(None).unwrap_err();
    match &err {
        Error::Streaming {
            stream, operation, ..
        } => {
            assert_eq!(*stream, STREAM);
            assert_eq!(*operation, "stream on");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Streaming);
    assert_eq!(camera.state(), CameraState::Configured);
    assert_eq!(probe.imported_buffers(CAPTURE), 4);

    assert!(camera.stop().is_empty());
    assert_eq!(probe.imported_buffers(CAPTURE), 0);
}

#[test]
fn test_import_failure() {
    let (mut camera, probe) = configured_camera(PipelineOptions::default());
    probe.inject(Fault::ImportBuffers(CAPTURE.into()));

    let err = camera.start(None).unwrap_err();
    assert!(matches!(
        err,
        Error::Streaming {
            operation: "import buffers",
            ..
        }
    ));
    assert!(!probe.is_streaming(CAPTURE));
}

#[test]
fn test_queue_failure_cancels_request() {
    let (mut camera, probe) = configured_camera(PipelineOptions::default());
    let mut buffers = camera.export_frame_buffers(STREAM).unwrap();
    camera.start(None).unwrap();

    probe.inject_once(Fault::QueueBuffer(CAPTURE.into()));
    let err = camera
        .queue_request(request(0, buffers.remove(0)))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Streaming {
            operation: "queue buffer",
            ..
        }
    ));

    let mut completed = camera.process_completions();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].status(), RequestStatus::Cancelled);
    assert!(!completed[0].has_pending_buffers());
    assert_eq!(probe.queued_buffers(CAPTURE), 0);

    // The rejected buffer is handed back and can be queued again
    let buffer = completed[0].take_buffers().remove(&STREAM).unwrap();
    assert_eq!(buffer.index(), 0);
    assert_eq!(buffer.request(), None);
    camera.queue_request(request(1, buffer)).unwrap();
    let done = camera.wait_for_completion(Duration::from_secs(1)).unwrap();
    assert_eq!(done.cookie(), 1);
    assert_eq!(done.status(), RequestStatus::Complete);
}

#[test]
fn test_lifecycle_state_checks() {
    let (mut enumerator, probe) = xilinx_reference_board();
    let mut camera = PipelineHandler::default()
        .match_camera(&mut enumerator)
        .unwrap();

    assert!(matches!(camera.start(None), Err(Error::InvalidState(_))));
    assert!(matches!(
        camera.queue_request(Request::new(0)),
        Err(Error::InvalidState(_))
    ));
    let returned = camera.stop();
    assert_eq!(returned.len(), 1);
    assert_eq!(returned[0].cookie(), 0);
    assert_eq!(returned[0].status(), RequestStatus::Cancelled);

    let mut config = camera
        .generate_configuration(&[StreamRole::StillCapture])
        .unwrap();
    camera.configure(&mut config).unwrap();
    let mut buffers = camera.export_frame_buffers(STREAM).unwrap();
    camera.start(None).unwrap();

    assert!(matches!(camera.start(None), Err(Error::InvalidState(_))));
    assert!(matches!(
        camera.configure(&mut config),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        camera.queue_request(Request::new(9)),
        Err(Error::InvalidState(_))
    ));

    let mut wrong_stream = Request::new(1);
    wrong_stream.add_buffer(StreamId(3), buffers.remove(0));
    assert!(matches!(
        camera.queue_request(wrong_stream),
        Err(Error::NoPipe(StreamId(3)))
    ));

    let rejected = camera.process_completions();
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[0].cookie(), 9);
    assert_eq!(rejected[1].cookie(), 1);
    assert!(rejected
        .iter()
        .all(|r| r.status() == RequestStatus::Cancelled));
    assert_eq!(rejected[1].buffers()[&StreamId(3)].index(), 0);
    assert_eq!(probe.queued_buffers(CAPTURE), 0);
}

#[test]
fn test_rejected_request_keeps_its_buffers() {
    let (mut camera, probe) = configured_camera(PipelineOptions::default());
    probe.set_auto_complete(false);
    let mut buffers = camera.export_frame_buffers(STREAM).unwrap();
    camera.start(None).unwrap();

    camera.queue_request(request(0, buffers.remove(0))).unwrap();
    assert!(matches!(
        camera.queue_request(request(0, buffers.remove(0))),
        Err(Error::InvalidState("request already queued"))
    ));

    let returned = camera.stop();
    assert_eq!(returned.len(), 2);
    let rejected = returned.iter().find(|r| r.buffers()[&STREAM].index() == 1);
    assert_eq!(rejected.unwrap().status(), RequestStatus::Cancelled);

    assert!(matches!(
        camera.queue_request(request(5, buffers.remove(0))),
        Err(Error::InvalidState("camera is not running"))
    ));
    let returned = camera.stop();
    assert_eq!(returned.len(), 1);
    assert_eq!(returned[0].cookie(), 5);
    assert_eq!(returned[0].buffers()[&STREAM].index(), 2);
}
