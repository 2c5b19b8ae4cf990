//! Capture player
//!
//! [`Player::run`] owns the PipeWire objects for one playback: main loop,
//! context, core and an input video stream. Stream callbacks are turned
//! into [`TransportEvent`]s for a [`CaptureSession`]; the requests it
//! returns are executed against the stream. A [`PacerHandle`] presents
//! frames on its own thread while the main loop runs.
//!
//! # Threads
//!
//! ```text
//! ┌──────────────────────────────┐      ┌──────────────────────────┐
//! │  PipeWire main loop (caller) │      │  pwplay-render           │
//! │                              │      │                          │
//! │  state_changed ─┐            │      │  RenderPacer             │
//! │  param_changed ─┼─> Session ─┼─────>│   (SharedFrame)          │
//! │  io_changed ────┤            │      │                          │
//! │  process ───────┘            │      │                          │
//! └──────────────────────────────┘      └──────────────────────────┘
//! ```
//!
//! # Teardown
//!
//! The loop quits on SIGINT, SIGTERM, or a terminal stream state. The
//! pacer is joined first, then the stream is dropped, then the surface.

use std::cell::RefCell;
use std::ffi::CString;
use std::rc::Rc;

use libspa::utils::Direction;
use libspa_sys as spa_sys;
use nix::sys::signal::Signal;
use pipewire::context::Context;
use pipewire::main_loop::MainLoop;
use pipewire::properties::properties;
use pipewire::stream::{Stream, StreamFlags, StreamRef, StreamState as PwStreamState};
use pipewire::sys as pw_sys;
use tracing::{debug, error, info, warn};

use pwplay_core::{
    BufferRequirements, CaptureSession, ConversionError, PacerHandle, PacerStats, ParamUpdate,
    PlayerConfig, Presenter, PwPlayError, RenderPacer, SessionStats, StreamState,
    SurfaceAllocator, TransportEvent, TransportFatal, TransportRequest, VideoSize,
    INVALID_ARGUMENT,
};

use crate::buffer::StreamQueue;
use crate::error::{PipeWireError, Result};
use crate::pod;

/// Map a PipeWire stream state
pub fn stream_state(state: &PwStreamState) -> StreamState {
    match state {
        PwStreamState::Error(msg) => StreamState::Error(msg.clone()),
        PwStreamState::Unconnected => StreamState::Unconnected,
        PwStreamState::Connecting => StreamState::Connecting,
        PwStreamState::Paused => StreamState::Paused,
        PwStreamState::Streaming => StreamState::Streaming,
    }
}

/// Outcome of one playback
#[derive(Debug, Clone)]
pub struct PlaybackReport {
    /// Why the main loop stopped
    pub exit: TransportFatal,
    /// Capture-side counters
    pub session: SessionStats,
    /// Render-side counters
    pub pacer: PacerStats,
}

impl PlaybackReport {
    /// Whether playback ended by request rather than failure
    pub fn is_clean(&self) -> bool {
        matches!(self.exit, TransportFatal::Signal(_) | TransportFatal::Unconnected)
    }
}

/// Main loop handle shared by the stream callbacks
#[derive(Clone)]
struct LoopControl {
    mainloop: MainLoop,
    exit: Rc<RefCell<Option<TransportFatal>>>,
}

impl LoopControl {
    fn new(mainloop: &MainLoop) -> Self {
        Self {
            mainloop: mainloop.clone(),
            exit: Rc::new(RefCell::new(None)),
        }
    }

    /// Quit the loop; the first reason wins
    fn quit(&self, reason: TransportFatal) {
        info!("Stopping playback: {}", reason);
        self.exit.borrow_mut().get_or_insert(reason);
        self.mainloop.quit();
    }

    fn take_exit(&self) -> Option<TransportFatal> {
        self.exit.borrow_mut().take()
    }

    fn execute(&self, stream: &StreamRef, requests: Vec<TransportRequest>) {
        for request in requests {
            match request {
                TransportRequest::UpdateParams(reqs) => {
                    if let Err(e) = update_params(stream, &reqs) {
                        warn!("Failed to update buffer params: {}", e);
                        self.execute(stream, vec![rejected_params(&e)]);
                    }
                }
                TransportRequest::SetActive(active) => {
                    if let Err(e) = stream.set_active(active) {
                        warn!("Failed to set stream active={}: {}", active, e);
                    }
                }
                TransportRequest::ReportError { code, message } => {
                    report_error(stream, code, &message);
                }
                TransportRequest::Shutdown(reason) => self.quit(reason),
            }
        }
    }
}

fn update_params(stream: &StreamRef, reqs: &BufferRequirements) -> Result<()> {
    let bytes = pod::buffer_params(reqs)?;
    let mut params = bytes
        .iter()
        .map(|b| pod::as_pod(b))
        .collect::<Result<Vec<_>>>()?;
    stream.update_params(&mut params)?;
    debug!("Published buffer params: {} x {} bytes", reqs.buffers.default, reqs.size);
    Ok(())
}

/// Error report sent when buffer params cannot be published
fn rejected_params(e: &PipeWireError) -> TransportRequest {
    TransportRequest::ReportError {
        code: INVALID_ARGUMENT,
        message: format!("can't set buffer params: {}", e),
    }
}

fn report_error(stream: &StreamRef, code: i32, message: &str) {
    let Ok(message) = CString::new(message) else {
        return;
    };
    // SAFETY: the stream pointer is live for the callback, the format
    // string consumes exactly one C string argument.
    unsafe {
        pw_sys::pw_stream_set_error(stream.as_raw_ptr(), code, c"%s".as_ptr(), message.as_ptr());
    }
}

/// Listener state owned by the stream
struct StreamData<A: SurfaceAllocator> {
    session: Rc<RefCell<CaptureSession<A>>>,
    position: *mut spa_sys::spa_io_position,
    last_position: Option<VideoSize>,
}

impl<A: SurfaceAllocator> StreamData<A> {
    fn position_size(&self) -> Option<VideoSize> {
        // SAFETY: set from io_changed, which clears it before the area goes away.
        let position = unsafe { self.position.as_ref()? };
        let size = position.video.size;
        Some(VideoSize::new(size.width, size.height)).filter(|s| !s.is_empty())
    }

    /// Forward the position context if it changed since last time
    fn sync_position(&mut self) -> Vec<TransportRequest> {
        let size = self.position_size();
        if size == self.last_position {
            return Vec::new();
        }
        self.last_position = size;
        self.session
            .borrow_mut()
            .handle(TransportEvent::PositionChanged(size))
    }
}

/// PipeWire capture player
pub struct Player {
    config: PlayerConfig,
}

impl Player {
    /// Create a player, validating `config`
    pub fn new(config: PlayerConfig) -> Result<Self> {
        config.check()?;
        Ok(Self { config })
    }

    /// Player configuration
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Play the stream of `node` (or the default source) until it ends
    ///
    /// Blocks the calling thread in the PipeWire main loop.
    pub fn run<A, P>(&self, node: Option<u32>, allocator: A, presenter: P) -> Result<PlaybackReport>
    where
        A: SurfaceAllocator + 'static,
        P: Presenter<A::Surface> + 'static,
    {
        let mainloop = MainLoop::new(None)
            .map_err(|e| PipeWireError::InitializationFailed(format!("main loop: {}", e)))?;
        let context = Context::new(&mainloop)
            .map_err(|e| PipeWireError::InitializationFailed(format!("context: {}", e)))?;
        let core = context
            .connect(None)
            .map_err(|e| PipeWireError::InitializationFailed(format!("core: {}", e)))?;

        let session = Rc::new(RefCell::new(CaptureSession::new(self.config.clone(), allocator)));
        let frame = session.borrow().frame();
        let control = LoopControl::new(&mainloop);

        let stream = Stream::new(
            &core,
            &self.config.stream_name,
            properties! {
                *pipewire::keys::MEDIA_TYPE => "Video",
                *pipewire::keys::MEDIA_CATEGORY => "Capture",
                *pipewire::keys::MEDIA_ROLE => self.config.media_role.as_str(),
            },
        )?;

        let data = StreamData {
            session: Rc::clone(&session),
            position: std::ptr::null_mut(),
            last_position: None,
        };

        let state_control = control.clone();
        let param_control = control.clone();
        let io_control = control.clone();

        let listener = stream
            .add_local_listener_with_user_data(data)
            .state_changed(move |stream, data, old, new| {
                let event = TransportEvent::StateChanged {
                    old: stream_state(&old),
                    new: stream_state(&new),
                };
                let requests = data.session.borrow_mut().handle(event);
                state_control.execute(stream, requests);
            })
            .param_changed(move |stream, data, id, param| {
                let update = pod::param_update(id, param);
                let mut requests = Vec::new();
                if matches!(update, ParamUpdate::Format(Some(_))) {
                    requests.extend(data.sync_position());
                }
                requests.extend(
                    data.session
                        .borrow_mut()
                        .handle(TransportEvent::ParamChanged(update)),
                );
                param_control.execute(stream, requests);
            })
            .io_changed(move |stream, data, id, area, _size| {
                if id != spa_sys::SPA_IO_Position {
                    return;
                }
                data.position = area.cast();
                let requests = data.sync_position();
                io_control.execute(stream, requests);
            })
            .process(move |stream, data| {
                let mut queue = StreamQueue::new(stream);
                let result = data.session.borrow_mut().process(&mut queue);
                match result {
                    Ok(()) => {}
                    Err(ConversionError::OutOfBuffers) => warn!("Out of buffers"),
                    Err(e) => {
                        let e = PwPlayError::from(e);
                        if e.is_transient() {
                            warn!("Dropped frame: {}", e);
                        } else {
                            error!("Frame processing failed: {}", e);
                        }
                    }
                }
            })
            .register()?;

        let formats = pod::enum_format_params()?;
        let mut params = formats
            .iter()
            .map(|b| pod::as_pod(b))
            .collect::<Result<Vec<_>>>()?;

        stream.connect(
            Direction::Input,
            node,
            StreamFlags::INACTIVE | StreamFlags::AUTOCONNECT | StreamFlags::MAP_BUFFERS,
            &mut params,
        )?;
        info!("Stream connected (target node: {:?})", node);

        let _signals = [Signal::SIGINT, Signal::SIGTERM].map(|signal| {
            let control = control.clone();
            mainloop
                .loop_()
                .add_signal_local(signal, move || control.quit(TransportFatal::Signal(signal as i32)))
        });

        let pacer = PacerHandle::spawn(RenderPacer::new(
            frame.clone(),
            presenter,
            self.config.frame_interval(),
        ))?;

        mainloop.run();

        let pacer_stats = pacer.shutdown()?;
        drop(listener);
        if let Err(e) = stream.disconnect() {
            debug!("Stream disconnect failed: {}", e);
        }
        drop(stream);
        drop(frame.teardown());

        let session_stats = session.borrow().stats().clone();
        let exit = control.take_exit().unwrap_or(TransportFatal::Unconnected);
        info!(
            "Playback finished: {} frames converted, {} presented",
            session_stats.frames_converted, pacer_stats.presents
        );

        Ok(PlaybackReport {
            exit,
            session: session_stats,
            pacer: pacer_stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwplay_core::{MemoryType, Range};

    #[test]
    fn test_error_code_is_einval() {
        assert_eq!(INVALID_ARGUMENT, -libc::EINVAL);
    }

    #[test]
    fn test_stream_state_mapping() {
        assert_eq!(stream_state(&PwStreamState::Paused), StreamState::Paused);
        assert_eq!(
            stream_state(&PwStreamState::Error("gone".to_string())),
            StreamState::Error("gone".to_string())
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PlayerConfig::builder().target_fps(0).build();
        assert!(matches!(
            Player::new(config),
            Err(PipeWireError::Core(PwPlayError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn test_unserializable_params_are_reported() {
        let reqs = BufferRequirements {
            buffers: Range {
                default: 8,
                min: 2,
                max: 64,
            },
            blocks: 1,
            size: i32::MAX as usize + 1,
            stride: 4,
            memory: MemoryType::MemPtr,
            metas: Vec::new(),
        };

        let err = pod::buffer_params(&reqs).expect_err("size exceeds a pod int");
        let TransportRequest::ReportError { code, message } = rejected_params(&err) else {
            panic!("expected an error report");
        };
        assert_eq!(code, INVALID_ARGUMENT);
        assert!(message.starts_with("can't set buffer params"));
    }

    #[test]
    fn test_report_cleanliness() {
        let report = PlaybackReport {
            exit: TransportFatal::Signal(2),
            session: SessionStats::default(),
            pacer: PacerStats::default(),
        };
        assert!(report.is_clean());

        let report = PlaybackReport {
            exit: TransportFatal::StreamError("node removed".to_string()),
            ..report
        };
        assert!(!report.is_clean());
    }
}
