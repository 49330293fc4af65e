//! rdisplay demo client entry point.
//!
//! Connects to the display server, negotiates the configured video mode,
//! then paints a moving test pattern and flips it until Ctrl-C or until the
//! server ends the session.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()             -- file + RDISPLAY_SERVER override
//!  └─ Session::init()           -- SOCK_SEQPACKET connect
//!  └─ Session::negotiate_mode() -- SetVideoMode / VideoModeSet + shm mapping
//!  └─ frame loop (tokio interval)
//!       ├─ pump()    -> input events logged by LoggingEventSink
//!       ├─ paint     -> write pixels into the current surface
//!       └─ flip()    -> Draw (+ wait for Flipped when double-buffered)
//! ```
//!
//! Only Linux provides the socket and shared-memory primitives the client
//! needs; elsewhere the binary exits with an error.

#[cfg(target_os = "linux")]
use std::sync::{atomic::Ordering, Arc};
#[cfg(target_os = "linux")]
use std::time::Duration;

#[cfg(target_os = "linux")]
use anyhow::Context;
#[cfg(target_os = "linux")]
use tracing::{info, warn};
#[cfg(target_os = "linux")]
use tracing_subscriber::EnvFilter;

#[cfg(target_os = "linux")]
use rdisplay_client::application::{CursorImage, DisplayBackend, Session, SessionError};
#[cfg(target_os = "linux")]
use rdisplay_client::infrastructure::{
    channel::seqpacket::SeqPacketConnector, config::load_config, event_sink::LoggingEventSink,
    shm::posix::PosixSharedMemory,
};
#[cfg(target_os = "linux")]
use rdisplay_core::FramebufferGeometry;

#[cfg(target_os = "linux")]
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// 8x8 arrow, one bit per pixel.
#[cfg(target_os = "linux")]
const ARROW_DATA: [u8; 8] = [0x80, 0xC0, 0xA0, 0x90, 0x88, 0xF0, 0x90, 0x08];
#[cfg(target_os = "linux")]
const ARROW_MASK: [u8; 8] = [0x80, 0xC0, 0xE0, 0xF0, 0xF8, 0xF0, 0x90, 0x08];

#[cfg(target_os = "linux")]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("rdisplay client starting");
    if !config.is_available() {
        anyhow::bail!("no display server configured (set `server` or RDISPLAY_SERVER)");
    }

    let sink = Arc::new(LoggingEventSink::new());
    let quit = sink.quit_flag();
    let mut session = Session::new(Arc::new(PosixSharedMemory), sink);

    session
        .init(config.server.as_deref(), &SeqPacketConnector)
        .context("connecting to display server")?;
    session.set_caption("rdisplay demo")?;
    let mut surface = session
        .negotiate_mode(config.mode.request())
        .context("negotiating video mode")?;
    let geometry = *session
        .geometry()
        .context("video mode vanished after negotiation")?;

    let arrow = CursorImage {
        data: &ARROW_DATA,
        mask: &ARROW_MASK,
        width: 8,
        height: 8,
        hot_x: 0,
        hot_y: 0,
    };
    match DisplayBackend::create_cursor(&mut session, arrow) {
        Ok(cursor) => session.show_cursor(Some(cursor))?,
        Err(SessionError::CursorRejected) => warn!("server refused the demo cursor"),
        Err(e) => return Err(e.into()),
    }

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // ── Frame loop ────────────────────────────────────────────────────────────
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    let mut frame: usize = 0;
    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutdown signal received");
                break Ok(());
            }
            _ = ticker.tick() => {}
        }

        match session.pump() {
            Ok(()) => {}
            Err(SessionError::PeerQuit | SessionError::Disconnected) => break Ok(()),
            Err(e) => break Err(e),
        }
        if quit.load(Ordering::SeqCst) {
            break Ok(());
        }

        paint(session.surface_pixels(surface)?, &geometry, frame);
        surface = match session.flip(surface) {
            Ok(next) => next,
            Err(SessionError::PeerQuit) => break Ok(()),
            Err(e) => break Err(e),
        };
        frame = frame.wrapping_add(1);
    };

    session.teardown();
    info!(frames = frame, "rdisplay client stopped");
    Ok(outcome?)
}

#[cfg(not(target_os = "linux"))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("rdisplay-client requires Linux (SOCK_SEQPACKET and POSIX shared memory)")
}

/// Diagonal gradient that scrolls one step per frame.
#[cfg(target_os = "linux")]
fn paint(pixels: &mut [u8], geometry: &FramebufferGeometry, frame: usize) {
    let bpp = geometry.format.bytes_per_pixel().max(1);
    let width = geometry.width as usize;
    let height = geometry.height as usize;
    for (y, row) in pixels.chunks_mut(geometry.pitch).take(height).enumerate() {
        for (x, px) in row.chunks_exact_mut(bpp).take(width).enumerate() {
            px.fill(((x + y + frame) % 256) as u8);
        }
    }
}
