//! End-to-end session tests against a scripted in-memory transport

use std::collections::VecDeque;
use std::time::Duration;

use pwplay_core::{
    CaptureSession, ConversionError, DisplayRect, FormatProposal, FrameBuffer, BufferQueue,
    MemoryRenderer, NegotiationError, PacerHandle, ParamUpdate, PlayerConfig, RenderPacer,
    StreamState, SurfaceFormat, TransportEvent, TransportFatal, TransportRequest, VideoFormat,
    VideoSize, INVALID_ARGUMENT,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// One buffer of the scripted transport
#[derive(Debug)]
struct ScriptBuffer {
    id: u32,
    data: Option<Vec<u8>>,
    stride: usize,
    crop: Option<DisplayRect>,
}

impl ScriptBuffer {
    fn filled(id: u32, stride: usize, rows: usize, value: u8) -> Self {
        Self {
            id,
            data: Some(vec![value; stride * rows]),
            stride,
            crop: None,
        }
    }
}

impl FrameBuffer for ScriptBuffer {
    fn data(&mut self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    fn chunk_size(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }

    fn chunk_stride(&self) -> usize {
        self.stride
    }

    fn crop(&self) -> Option<DisplayRect> {
        self.crop
    }
}

#[derive(Debug, Default)]
struct ScriptQueue {
    filled: VecDeque<ScriptBuffer>,
    returned: Vec<u32>,
}

impl ScriptQueue {
    fn push(&mut self, buffer: ScriptBuffer) {
        self.filled.push_back(buffer);
    }
}

impl BufferQueue for ScriptQueue {
    type Buffer = ScriptBuffer;

    fn dequeue(&mut self) -> Option<ScriptBuffer> {
        self.filled.pop_front()
    }

    fn requeue(&mut self, buffer: ScriptBuffer) {
        self.returned.push(buffer.id);
    }
}

fn propose(session: &mut CaptureSession<MemoryRenderer>, proposal: FormatProposal) -> Vec<TransportRequest> {
    session.handle(TransportEvent::ParamChanged(ParamUpdate::Format(Some(proposal))))
}

#[test]
fn identical_raw_proposal_is_ignored() {
    init_tracing();
    let renderer = MemoryRenderer::new();
    let mut session = CaptureSession::new(PlayerConfig::default(), renderer.clone());
    let proposal = FormatProposal::raw(VideoFormat::BGRx, 1920, 1080).with_framerate(60, 1);

    let first = propose(&mut session, proposal);
    assert!(matches!(first.as_slice(), [TransportRequest::UpdateParams(_)]));
    assert_eq!(renderer.stats().surfaces_created, 1);

    let second = propose(&mut session, proposal);
    assert!(second.is_empty());
    assert_eq!(renderer.stats().surfaces_created, 1);
    assert_eq!(session.stats().proposals_ignored, 1);
}

#[test]
fn latest_buffer_wins() {
    init_tracing();
    let mut session = CaptureSession::new(PlayerConfig::default(), MemoryRenderer::new());
    propose(&mut session, FormatProposal::raw(VideoFormat::BGRA, 4, 2));

    let mut queue = ScriptQueue::default();
    queue.push(ScriptBuffer::filled(1, 16, 2, 0x11));
    queue.push(ScriptBuffer::filled(2, 16, 2, 0x22));
    queue.push(ScriptBuffer::filled(3, 16, 2, 0x33));

    session.process(&mut queue).expect("converted");

    // Older buffers go back first, the converted one last
    assert_eq!(queue.returned, vec![1, 2, 3]);
    assert_eq!(session.stats().frames_converted, 1);
    assert_eq!(session.stats().frames_skipped, 2);

    let frame = session.frame();
    let state = frame.lock();
    assert!(state.is_ready());
    let surface = state.surface().expect("surface");
    assert!(surface.pixels().iter().all(|&b| b == 0x33));
}

#[test]
fn empty_queue_is_out_of_buffers() {
    let mut session = CaptureSession::new(PlayerConfig::default(), MemoryRenderer::new());
    propose(&mut session, FormatProposal::raw(VideoFormat::BGRA, 4, 2));

    let mut queue = ScriptQueue::default();
    assert_eq!(session.process(&mut queue), Err(ConversionError::OutOfBuffers));
    assert!(!session.frame().is_ready());
}

#[test]
fn buffer_before_format_is_returned() {
    let mut session = CaptureSession::new(PlayerConfig::default(), MemoryRenderer::new());
    let mut queue = ScriptQueue::default();
    queue.push(ScriptBuffer::filled(9, 16, 2, 0xFF));

    assert_eq!(session.process(&mut queue), Err(ConversionError::NotNegotiated));
    assert_eq!(queue.returned, vec![9]);
    assert_eq!(session.stats().frames_dropped, 1);
}

#[test]
fn unmapped_buffer_is_dropped() {
    let mut session = CaptureSession::new(PlayerConfig::default(), MemoryRenderer::new());
    propose(&mut session, FormatProposal::raw(VideoFormat::BGRA, 4, 2));

    let mut queue = ScriptQueue::default();
    queue.push(ScriptBuffer {
        id: 4,
        data: None,
        stride: 16,
        crop: None,
    });

    assert_eq!(session.process(&mut queue), Err(ConversionError::EmptyBuffer));
    assert_eq!(queue.returned, vec![4]);
    assert!(!session.frame().is_ready());
}

#[test]
fn unmapped_buffer_keeps_display_rect() {
    let mut session = CaptureSession::new(PlayerConfig::default(), MemoryRenderer::new());
    propose(&mut session, FormatProposal::raw(VideoFormat::BGRA, 4, 2));

    let mut queue = ScriptQueue::default();
    queue.push(ScriptBuffer {
        id: 5,
        data: None,
        stride: 16,
        crop: Some(DisplayRect::new(1, 1, 2, 1)),
    });

    assert_eq!(session.process(&mut queue), Err(ConversionError::EmptyBuffer));
    assert_eq!(session.frame().rect(), DisplayRect::full(4, 2));
}

#[test]
fn ready_survives_failed_frames() {
    init_tracing();
    let mut session = CaptureSession::new(PlayerConfig::default(), MemoryRenderer::new());
    propose(&mut session, FormatProposal::raw(VideoFormat::BGRA, 4, 2));

    let mut queue = ScriptQueue::default();
    queue.push(ScriptBuffer::filled(1, 16, 2, 0x42));
    session.process(&mut queue).expect("converted");
    assert!(session.frame().is_ready());

    queue.push(ScriptBuffer {
        id: 2,
        data: None,
        stride: 16,
        crop: None,
    });
    assert_eq!(session.process(&mut queue), Err(ConversionError::EmptyBuffer));
    assert!(session.frame().is_ready());

    let frame = session.frame();
    if let Some((_, surface)) = frame.lock().conversion_target() {
        surface.set_fail_lock(true);
    }
    queue.push(ScriptBuffer::filled(3, 16, 2, 0x99));
    assert!(matches!(
        session.process(&mut queue),
        Err(ConversionError::LockAcquisitionFailed(_))
    ));
    assert!(session.frame().is_ready());

    // The last good frame is still what gets presented
    let state = frame.lock();
    assert!(state.surface().expect("surface").pixels().iter().all(|&b| b == 0x42));
    assert_eq!(session.stats().frames_dropped, 2);
}

#[test]
fn zero_width_keeps_previous_format() {
    init_tracing();
    let mut session = CaptureSession::new(PlayerConfig::default(), MemoryRenderer::new());
    session.handle(TransportEvent::PositionChanged(Some(VideoSize::new(640, 480))));
    propose(&mut session, FormatProposal::dsp(VideoFormat::RGBAF32));
    let before = session.frame().format().expect("float format installed");

    let requests = propose(&mut session, FormatProposal::raw(VideoFormat::BGRx, 0, 1080));
    assert_eq!(
        requests,
        vec![TransportRequest::ReportError {
            code: INVALID_ARGUMENT,
            message: NegotiationError::InvalidGeometry { width: 0, height: 1080 }
                .transport_message()
                .to_string(),
        }]
    );
    assert_eq!(session.frame().format(), Some(before));
}

#[test]
fn crop_region_is_presented() {
    init_tracing();
    let renderer = MemoryRenderer::with_row_alignment(64);
    let mut session = CaptureSession::new(PlayerConfig::default(), renderer.clone());
    propose(&mut session, FormatProposal::raw(VideoFormat::BGRx, 300, 240));

    let stride = session.frame().format().expect("format").target_stride;
    assert_eq!(stride, 1216);
    let mut buffer = ScriptBuffer::filled(1, 300 * 4, 240, 0x80);
    buffer.crop = Some(DisplayRect::new(10, 20, 100, 50));
    let mut queue = ScriptQueue::default();
    queue.push(buffer);
    session.process(&mut queue).expect("converted");

    assert_eq!(session.frame().rect(), DisplayRect::new(10, 20, 100, 50));

    let mut pacer = RenderPacer::new(session.frame(), renderer.clone(), Duration::from_millis(16));
    pacer.tick(tokio::time::Instant::now());
    assert_eq!(renderer.stats().last_rect, Some(DisplayRect::new(10, 20, 100, 50)));

    // Padding bytes past the source row stay untouched
    let frame = session.frame();
    let state = frame.lock();
    let row = state.surface().expect("surface").row(0).expect("first row");
    assert_eq!(row.len(), stride);
    assert!(row[..300 * 4].iter().all(|&b| b == 0x80));
    assert!(row[300 * 4..].iter().all(|&b| b == 0));
}

#[test]
fn planar_frame_is_copied() {
    let mut session = CaptureSession::new(PlayerConfig::default(), MemoryRenderer::new());
    let requests = propose(&mut session, FormatProposal::raw(VideoFormat::I420, 4, 4));
    let [TransportRequest::UpdateParams(reqs)] = requests.as_slice() else {
        panic!("expected buffer params, got {:?}", requests);
    };
    assert_eq!(reqs.size, 24);

    let format = session.frame().format().expect("format");
    assert_eq!(format.surface_format, SurfaceFormat::Iyuv);

    let data: Vec<u8> = (0..24).collect();
    let mut queue = ScriptQueue::default();
    queue.push(ScriptBuffer {
        id: 1,
        data: Some(data.clone()),
        stride: 4,
        crop: None,
    });
    session.process(&mut queue).expect("converted");

    let frame = session.frame();
    let state = frame.lock();
    assert_eq!(state.surface().expect("surface").pixels(), &data[..]);
}

#[test]
fn stream_lifecycle() {
    init_tracing();
    let config = PlayerConfig::builder().target_fps(200).build();
    let renderer = MemoryRenderer::new();
    let mut session = CaptureSession::new(config.clone(), renderer.clone());
    let pacer = PacerHandle::spawn(RenderPacer::new(
        session.frame(),
        renderer.clone(),
        config.frame_interval(),
    ))
    .expect("pacer");

    let requests = session.handle(TransportEvent::StateChanged {
        old: StreamState::Connecting,
        new: StreamState::Paused,
    });
    assert_eq!(requests, vec![TransportRequest::SetActive(true)]);

    propose(&mut session, FormatProposal::raw(VideoFormat::BGRx, 64, 64));
    let mut queue = ScriptQueue::default();
    for id in 0..5 {
        queue.push(ScriptBuffer::filled(id, 256, 64, id as u8));
        session.process(&mut queue).expect("converted");
    }
    std::thread::sleep(Duration::from_millis(60));

    let requests = session.handle(TransportEvent::StateChanged {
        old: StreamState::Streaming,
        new: StreamState::Unconnected,
    });
    assert_eq!(requests, vec![TransportRequest::Shutdown(TransportFatal::Unconnected)]);

    let stats = pacer.shutdown().expect("join");
    assert!(stats.presents >= 1);
    assert_eq!(stats.present_failures, 0);
    assert_eq!(session.stats().frames_converted, 5);

    // Surface released last
    assert!(session.frame().teardown().is_some());
}
