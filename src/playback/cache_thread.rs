//! Look-ahead cache thread.
//!
//! Walks forward (or backward, under negative speed) from the current
//! display position, requesting frames the source's cache does not hold yet
//! so that production latency is already paid by the time the playback
//! driver needs each frame. The walk is advisory prefetching only; display
//! correctness never depends on it having acted.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, trace, warn};

use crate::core::time::frame_duration_micros;
use crate::media::{FrameCache, FrameError, FrameSource, SourceInfo};

/// How long `stop()` waits for the walk loop to wind down.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Position and direction shared with the walk loop. `seek` is the only
/// cross-thread write into the walk, and it is a single scalar store.
pub(crate) struct WalkControls {
    display_position: AtomicI64,
    speed: AtomicI64,
    playing: AtomicBool,
}

impl WalkControls {
    pub(crate) fn new(position: i64, speed: i64) -> Self {
        Self {
            display_position: AtomicI64::new(position),
            speed: AtomicI64::new(speed),
            playing: AtomicBool::new(false),
        }
    }

    pub(crate) fn seek(&self, position: i64) {
        self.display_position.store(position, Ordering::Relaxed);
    }

    pub(crate) fn position(&self) -> i64 {
        self.display_position.load(Ordering::Relaxed)
    }

    pub(crate) fn set_speed(&self, speed: i64) {
        self.speed.store(speed, Ordering::Relaxed);
    }

    /// Walk direction derived from the sign of the speed; forward is +1.
    fn direction(&self) -> i64 {
        if self.speed.load(Ordering::Relaxed) < 0 {
            -1
        } else {
            1
        }
    }
}

/// Background thread keeping the source's cache populated around the
/// current display position.
pub struct CacheThread {
    source: Arc<dyn FrameSource>,
    controls: Arc<WalkControls>,
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
    done_rx: Option<Receiver<()>>,
}

impl CacheThread {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            controls: Arc::new(WalkControls::new(1, 1)),
            handle: None,
            stop_tx: None,
            done_rx: None,
        }
    }

    pub(crate) fn controls(&self) -> Arc<WalkControls> {
        Arc::clone(&self.controls)
    }

    /// Update the tracked display position. Safe to call at any time; takes
    /// effect on the walk's next bounds check, with no ordering guarantee
    /// relative to a pass already in flight.
    pub fn seek(&self, position: i64) {
        self.controls.seek(position);
    }

    pub fn set_speed(&self, speed: i64) {
        self.controls.set_speed(speed);
    }

    /// Start the walk loop on its own thread. No-op if already running.
    pub fn play(&mut self) {
        if self.handle.is_some() {
            return;
        }
        self.controls.playing.store(true, Ordering::Relaxed);

        let (stop_tx, stop_rx) = channel::bounded(1);
        let (done_tx, done_rx) = channel::bounded(1);
        self.stop_tx = Some(stop_tx);
        self.done_rx = Some(done_rx);

        let source = Arc::clone(&self.source);
        let controls = Arc::clone(&self.controls);
        self.handle = Some(thread::spawn(move || {
            walk_loop(source, controls, stop_rx);
            drop(done_tx);
        }));
    }

    /// Stop the walk loop, interrupting its inter-pass sleep. Waits a
    /// bounded time; a walk stuck inside frame production is logged and
    /// detached rather than joined forever.
    pub fn stop(&mut self) {
        self.controls.playing.store(false, Ordering::Relaxed);
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        let Some(done_rx) = self.done_rx.take() else {
            return;
        };
        match done_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("cache thread failed to stop within {STOP_TIMEOUT:?}");
                self.handle.take();
            }
        }
    }

    /// How many frames the walk may range ahead of the play-head: half the
    /// cache byte budget divided by a worst-case per-frame cost, zero when
    /// the source has no bounded cache.
    pub fn max_frames_ahead(&self) -> i64 {
        max_frames_ahead(self.source.info(), self.source.cache())
    }
}

impl Drop for CacheThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worst-case bytes for one frame: 4-byte pixels plus one frame's worth of
/// 4-byte samples at the nominal rate. Deliberately an overestimate, which
/// shrinks the look-ahead window instead of overflowing the cache.
fn bytes_per_frame(info: &SourceInfo) -> i64 {
    (info.height as i64 * info.width as i64 * 4)
        + (info.sample_rate as i64 * info.channels as i64 * 4)
}

/// Recomputed every pass so the window adapts if the cache budget changes
/// at runtime.
pub(crate) fn max_frames_ahead(info: &SourceInfo, cache: Option<&dyn FrameCache>) -> i64 {
    match cache {
        Some(cache) if cache.max_bytes() > 0 => {
            (cache.max_bytes() / bytes_per_frame(info)) / 2
        }
        _ => 0,
    }
}

fn walk_loop(source: Arc<dyn FrameSource>, controls: Arc<WalkControls>, stop_rx: Receiver<()>) {
    let frame_duration =
        Duration::from_secs_f64(frame_duration_micros(source.info().fps) / 1_000_000.0);
    debug!("cache walk started at frame {}", controls.position());

    while controls.playing.load(Ordering::Relaxed) {
        walk_pass(source.as_ref(), &controls);
        match stop_rx.recv_timeout(frame_duration) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    debug!("cache walk stopped");
}

/// One pass over the expected frame window.
///
/// Frames already cached are nearly free, so the full window is re-walked
/// every pass; that repairs holes left in a fragmented cache by erratic
/// seeking. The pass aborts early once the probe falls outside the re-read
/// window, so a seek does not waste the remainder of a stale pass. Out-of-
/// range probes past the end of the stream are swallowed.
pub(crate) fn walk_pass(source: &dyn FrameSource, controls: &WalkControls) {
    let info = source.info();
    let max_ahead = max_frames_ahead(info, source.cache());
    if max_ahead == 0 {
        return;
    }

    let direction = controls.direction();
    let end = controls.position() + direction * max_ahead;
    let mut last_cached: Option<i64> = None;

    let mut probe = controls.position();
    loop {
        let position = controls.position();
        let bound = position + direction * max_ahead;
        let in_window = if direction > 0 {
            probe >= position && probe <= bound
        } else {
            probe <= position && probe >= bound
        };
        if !in_window {
            trace!("cache walk pass aborted at frame {probe} (play-head at {position})");
            break;
        }

        if let Some(cache) = source.cache() {
            if !cache.contains(probe) {
                // Requesting the frame produces it and inserts it into the
                // cache as a side effect.
                match source.get_frame(probe) {
                    Ok(frame) => last_cached = Some(frame.number),
                    Err(FrameError::OutOfBounds(_)) | Err(FrameError::ReaderClosed) => {}
                }
            }
        }

        if probe == end {
            break;
        }
        probe += direction;
    }

    if let Some(number) = last_cached {
        trace!("cache walk cached up to frame {number}");
    }
}
