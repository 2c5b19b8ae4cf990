//! Headless PipeWire video player
//!
//! Connects to a video node, negotiates a format and paces presentation
//! into an in-memory renderer, logging statistics on exit.
//!
//! ```bash
//! pwplay --node 42 --fps 60
//! RUST_LOG=pwplay_core=debug pwplay
//! ```

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pwplay_core::{MemoryRenderer, PlayerConfig};
use pwplay_pipewire::{PipeWireError, Player};

#[derive(Parser, Debug)]
#[command(name = "pwplay", version, about = "Play a PipeWire video stream")]
struct Args {
    /// Target node id; the session manager picks a source when omitted
    #[arg(long)]
    node: Option<u32>,

    /// Presentation rate in Hz
    #[arg(long, default_value_t = pwplay_core::DEFAULT_FPS)]
    fps: u32,

    /// Preferred number of stream buffers
    #[arg(long)]
    buffers: Option<u32>,

    /// Do not request cursor metadata
    #[arg(long)]
    no_cursor_meta: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> PlayerConfig {
        let mut builder = PlayerConfig::builder()
            .target_fps(self.fps)
            .request_cursor_meta(!self.no_cursor_meta);
        if let Some(buffers) = self.buffers {
            builder = builder.preferred_buffers(buffers);
        }
        builder.build()
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let player = Player::new(args.config()).context("invalid player configuration")?;

    pwplay_pipewire::init();
    let renderer = MemoryRenderer::new();
    let result = player.run(args.node, renderer.clone(), renderer.clone());
    pwplay_pipewire::deinit();

    let report = result.context("playback failed")?;
    let rendered = renderer.stats();
    tracing::info!(
        exit = %report.exit,
        converted = report.session.frames_converted,
        skipped = report.session.frames_skipped,
        dropped = report.session.frames_dropped,
        presented = report.pacer.presents,
        late = report.pacer.late_ticks,
        surfaces = rendered.surfaces_created,
        "playback statistics"
    );

    if !report.is_clean() {
        return Err(PipeWireError::Terminated(report.exit).into());
    }
    Ok(())
}
