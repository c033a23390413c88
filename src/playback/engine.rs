//! Playback driver.
//!
//! Owns the master wall-clock timeline: each tick it decides which frame
//! should be on screen now, hands it to the video renderer, measures drift
//! against the audio renderer's position, opportunistically primes the
//! cache with upcoming frames while the frame's display budget lasts, and
//! sleeps away the remainder. Pacing measures against a deadline projected
//! from the start of the current unpaused run, so sleep overhead never
//! accumulates into drift.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info, trace, warn};

use crate::core::time::{clamp_sleep, frame_duration_micros, remaining_micros};
use crate::media::frame::Frame;
use crate::media::{FrameError, FrameSource, SourceInfo};
use crate::playback::cache_thread::{self, CacheThread, WalkControls};
use crate::playback::observer::{PlaybackObserver, TickMetrics};
use crate::playback::renderers::{AudioRenderer, VideoRenderer};
use crate::playback::state::{Controls, TickState};

/// Upper bound on any single pacing sleep, in frame durations.
const MAX_SLEEP_FRAMES: f64 = 4.0;
/// How long `stop()` waits for each component before giving up on it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for the playback driver.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// Playback cannot start from a negative position.
    #[error("cannot start playback from frame {0}")]
    InvalidPosition(i64),
}

/// The playback driver: public control surface plus ownership of the loop
/// thread and the look-ahead cache thread.
pub struct PlaybackEngine {
    audio: Arc<dyn AudioRenderer>,
    video: Arc<dyn VideoRenderer>,
    source: Option<Arc<dyn FrameSource>>,
    controls: Arc<Controls>,
    observer: Option<Arc<dyn PlaybackObserver>>,
    cache: Option<CacheThread>,
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
    done_rx: Option<Receiver<()>>,
}

impl PlaybackEngine {
    pub fn new(audio: Arc<dyn AudioRenderer>, video: Arc<dyn VideoRenderer>) -> Self {
        Self {
            audio,
            video,
            source: None,
            controls: Arc::new(Controls::new()),
            observer: None,
            cache: None,
            handle: None,
            stop_tx: None,
            done_rx: None,
        }
    }

    /// Attach the frame source. Without one, `start` succeeds but drives
    /// nothing.
    pub fn set_source(&mut self, source: Arc<dyn FrameSource>) {
        self.source = Some(source);
    }

    /// Install an optional per-tick metrics sink.
    pub fn set_observer(&mut self, observer: Arc<dyn PlaybackObserver>) {
        self.observer = Some(observer);
    }

    /// Current/target display frame, 1-based.
    pub fn position(&self) -> i64 {
        self.controls.position()
    }

    /// Move the play-head. Takes effect on the driver's next tick; the
    /// look-ahead walk follows on its next bounds check.
    pub fn seek(&self, frame: i64) {
        self.controls.set_position(frame);
        if let Some(cache) = &self.cache {
            cache.seek(frame);
        }
    }

    pub fn speed(&self) -> i64 {
        self.controls.speed()
    }

    /// Signed frame advance per tick: 1 normal, 0 paused, negative reverse,
    /// greater than 1 fast-forward.
    pub fn set_speed(&self, speed: i64) {
        self.controls.set_speed(speed);
        if let Some(cache) = &self.cache {
            cache.set_speed(speed);
        }
    }

    /// Start playback.
    ///
    /// Rejects a negative play-head position without touching any state.
    /// Otherwise stops any prior playback, starts the audio renderer (when
    /// the source has audio), the cache thread and video renderer (when it
    /// has video), and spawns the driver loop.
    pub fn start(&mut self) -> Result<(), PlaybackError> {
        let position = self.controls.position();
        if position < 0 {
            return Err(PlaybackError::InvalidPosition(position));
        }

        self.stop();

        let Some(source) = self.source.clone() else {
            return Ok(());
        };
        let info = source.info().clone();

        if info.has_audio {
            self.audio.start();
        }

        let mut cache = CacheThread::new(Arc::clone(&source));
        cache.seek(position);
        cache.set_speed(self.controls.speed());
        if info.has_video {
            cache.play();
            self.video.start();
        }
        let walk = cache.controls();
        self.cache = Some(cache);

        let (stop_tx, stop_rx) = channel::bounded(1);
        let (done_tx, done_rx) = channel::bounded(1);
        self.stop_tx = Some(stop_tx);
        self.done_rx = Some(done_rx);

        let driver = Driver {
            source,
            audio: Arc::clone(&self.audio),
            video: Arc::clone(&self.video),
            controls: Arc::clone(&self.controls),
            walk,
            observer: self.observer.clone(),
            stop_rx,
            state: TickState::new(position),
        };

        info!("playback starting at frame {position}");
        self.handle = Some(thread::spawn(move || {
            driver.run();
            drop(done_tx);
        }));
        Ok(())
    }

    /// Stop playback. Idempotent and safe when nothing is running; each
    /// component gets a bounded wait, and one failing to stop is logged
    /// rather than allowed to hang the remaining teardown.
    pub fn stop(&mut self) {
        if self.handle.is_none() && self.cache.is_none() {
            return;
        }

        let (has_audio, has_video) = self
            .source
            .as_ref()
            .map(|s| {
                let info = s.info();
                (info.has_audio, info.has_video)
            })
            .unwrap_or((false, false));

        if has_audio && !self.audio.stop(STOP_TIMEOUT) {
            warn!("audio renderer failed to stop within {STOP_TIMEOUT:?}");
        }
        if let Some(mut cache) = self.cache.take() {
            cache.stop();
        }
        if has_video && !self.video.stop(STOP_TIMEOUT) {
            warn!("video renderer failed to stop within {STOP_TIMEOUT:?}");
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(done_rx) = self.done_rx.take() {
            match done_rx.recv_timeout(STOP_TIMEOUT) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if let Some(handle) = self.handle.take() {
                        let _ = handle.join();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("playback driver failed to stop within {STOP_TIMEOUT:?}");
                    self.handle.take();
                }
            }
        }
        info!("playback stopped at frame {}", self.controls.position());
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Whether the loop keeps running after a tick.
enum Tick {
    Continue,
    Stop,
}

/// Everything the driver loop owns while running.
struct Driver {
    source: Arc<dyn FrameSource>,
    audio: Arc<dyn AudioRenderer>,
    video: Arc<dyn VideoRenderer>,
    controls: Arc<Controls>,
    walk: Arc<WalkControls>,
    observer: Option<Arc<dyn PlaybackObserver>>,
    stop_rx: Receiver<()>,
    state: TickState,
}

impl Driver {
    fn run(mut self) {
        debug!("driver loop running");
        loop {
            match self.stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }
            if let Tick::Stop = self.tick() {
                break;
            }
        }
        debug!("driver loop exited");
    }

    /// One iteration of the playback clock.
    fn tick(&mut self) -> Tick {
        let info = self.source.info().clone();
        let frame_duration_us = frame_duration_micros(info.fps);
        let max_sleep_us = frame_duration_us * MAX_SLEEP_FRAMES;
        let max_frames_ahead = cache_thread::max_frames_ahead(&info, self.source.cache());

        // Resolve the frame to display, timing the fetch; the cost feeds
        // the look-ahead threshold below.
        let fetch_started = Instant::now();
        let frame = self.next_frame(&info);
        self.state.last_fetch_cost = fetch_started.elapsed();

        let position = self.controls.position();
        let speed = self.controls.speed();

        // Pause / end-of-stream: hold position, keep the cache warm for a
        // quarter frame, and re-arm the clock so resuming starts a fresh run.
        if (speed == 0 && position == self.state.last_video_position)
            || position > info.video_length
        {
            self.state.paused = true;
            self.state.start_time = Instant::now();
            self.state.playback_frames = 0;

            let quarter = Duration::from_secs_f64(frame_duration_us / 4.0 / 1_000_000.0);
            let warm_deadline = self.state.start_time + quarter;
            let mut count: i64 = 0;
            while Instant::now() < warm_deadline && count <= max_frames_ahead {
                let _ = self.source.get_frame(position + count);
                count += 1;
            }
            return self.sleep(quarter);
        }

        if self.state.paused {
            // First tick after a pause: re-anchor the shared zero point,
            // pushed out by however much the audio pipeline buffers before
            // sound actually comes out.
            let mut start = Instant::now();
            if info.has_audio {
                start += self.audio.buffered();
            }
            self.state.start_time = start;
            self.state.paused = false;
            debug!("resumed at frame {position}");
        }

        if let Some(frame) = &frame {
            self.video.render(Arc::clone(frame));
        }
        self.state.last_video_position = position;

        // Drift is only meaningful when one source feeds both renderers.
        // At non-unit speeds audio cannot track on its own, so it is forced
        // to follow video every tick.
        let mut drift = 0;
        if info.has_audio && info.has_video {
            self.state.audio_position = self.audio.current_position();
            drift = position - self.state.audio_position;
            if speed != 1 {
                self.audio.seek(position);
            }
        }

        let mut remaining = remaining_micros(
            self.state.start_time,
            frame_duration_us,
            self.state.playback_frames,
            Instant::now(),
        );

        // Spend idle time absorbing upcoming production cost, as long as
        // comfortably more budget remains than the last fetch cost.
        let threshold_us = 2.0 * self.state.last_fetch_cost.as_secs_f64() * 1_000_000.0;
        let mut primed: i64 = 0;
        while remaining > threshold_us && primed < max_frames_ahead {
            primed += 1;
            let _ = self.source.get_frame(position + primed);
            remaining = remaining_micros(
                self.state.start_time,
                frame_duration_us,
                self.state.playback_frames,
                Instant::now(),
            );
        }

        trace!("frame {position}: drift {drift}, remaining {remaining:.0}us, primed {primed}");
        if let Some(observer) = &self.observer {
            observer.on_tick(&TickMetrics {
                position,
                audio_position: self.state.audio_position,
                drift,
                remaining_micros: remaining,
                frames_primed: primed,
            });
        }

        match clamp_sleep(remaining, max_sleep_us) {
            Some(sleep) => self.sleep(sleep),
            None => Tick::Continue,
        }
    }

    /// Advance the play-head by `speed` (only while the result stays inside
    /// `[1, video_length]`) and resolve the frame for the resulting
    /// position. A fetch failure degrades to "nothing to display this
    /// tick"; it is never fatal.
    fn next_frame(&mut self, info: &SourceInfo) -> Option<Arc<Frame>> {
        let speed = self.controls.speed();
        let mut position = self.controls.position();
        let next = position + speed;
        if next >= 1 && next <= info.video_length {
            position = next;
            self.controls.set_position(position);
        }

        if let Some(frame) = &self.state.current_frame {
            if frame.number == position && position == self.state.last_video_position {
                return Some(Arc::clone(frame));
            }
        }

        self.state.playback_frames += speed;
        // Mirror the resolved position into the look-ahead walk.
        self.walk.seek(position);

        match self.source.get_frame(position) {
            Ok(frame) => {
                self.state.current_frame = Some(Arc::clone(&frame));
                Some(frame)
            }
            Err(FrameError::ReaderClosed) | Err(FrameError::OutOfBounds(_)) => {
                self.state.current_frame = None;
                None
            }
        }
    }

    /// Stop-aware sleep: wakes immediately when `stop()` signals.
    fn sleep(&self, duration: Duration) -> Tick {
        match self.stop_rx.recv_timeout(duration) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Tick::Stop,
            Err(RecvTimeoutError::Timeout) => Tick::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::Fps;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::Mutex;

    fn test_info(video_length: i64, has_audio: bool) -> SourceInfo {
        SourceInfo {
            // High rate keeps per-tick sleeps short in tests.
            fps: Fps::new(250, 1),
            video_length,
            has_video: true,
            has_audio,
            width: 8,
            height: 8,
            sample_rate: 100,
            channels: 2,
        }
    }

    struct TestSource {
        info: SourceInfo,
        requested: Mutex<Vec<i64>>,
        closed: AtomicBool,
    }

    impl TestSource {
        fn new(info: SourceInfo) -> Self {
            Self {
                info,
                requested: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }
        }
    }

    impl FrameSource for TestSource {
        fn info(&self) -> &SourceInfo {
            &self.info
        }

        fn get_frame(&self, number: i64) -> Result<Arc<Frame>, FrameError> {
            self.requested.lock().unwrap().push(number);
            if self.closed.load(Ordering::Relaxed) {
                return Err(FrameError::ReaderClosed);
            }
            if number < 1 || number > self.info.video_length {
                return Err(FrameError::OutOfBounds(number));
            }
            Ok(Arc::new(Frame::new(number, self.info.width, self.info.height)))
        }
    }

    #[derive(Default)]
    struct TestAudio {
        position: AtomicI64,
        seeks: Mutex<Vec<i64>>,
        started: AtomicBool,
        stopped: AtomicBool,
    }

    impl AudioRenderer for TestAudio {
        fn start(&self) {
            self.started.store(true, Ordering::Relaxed);
        }
        fn stop(&self, _timeout: Duration) -> bool {
            self.stopped.store(true, Ordering::Relaxed);
            true
        }
        fn current_position(&self) -> i64 {
            self.position.load(Ordering::Relaxed)
        }
        fn seek(&self, frame: i64) {
            self.seeks.lock().unwrap().push(frame);
        }
        fn buffered(&self) -> Duration {
            Duration::ZERO
        }
    }

    #[derive(Default)]
    struct TestVideo {
        rendered: Mutex<Vec<i64>>,
        started: AtomicBool,
        stopped: AtomicBool,
    }

    impl VideoRenderer for TestVideo {
        fn start(&self) {
            self.started.store(true, Ordering::Relaxed);
        }
        fn stop(&self, _timeout: Duration) -> bool {
            self.stopped.store(true, Ordering::Relaxed);
            true
        }
        fn render(&self, frame: Arc<Frame>) {
            self.rendered.lock().unwrap().push(frame.number);
        }
    }

    #[derive(Default)]
    struct TestObserver {
        ticks: Mutex<Vec<TickMetrics>>,
    }

    impl PlaybackObserver for TestObserver {
        fn on_tick(&self, metrics: &TickMetrics) {
            self.ticks.lock().unwrap().push(*metrics);
        }
    }

    struct Harness {
        source: Arc<TestSource>,
        audio: Arc<TestAudio>,
        video: Arc<TestVideo>,
        driver: Driver,
        // Keeps the stop channel connected so sleeps run their course.
        _stop_tx: Sender<()>,
    }

    fn harness(info: SourceInfo, position: i64, speed: i64) -> Harness {
        let source = Arc::new(TestSource::new(info));
        let audio = Arc::new(TestAudio::default());
        let video = Arc::new(TestVideo::default());
        let controls = Arc::new(Controls::new());
        controls.set_position(position);
        controls.set_speed(speed);
        let (stop_tx, stop_rx) = channel::bounded(1);
        let driver = Driver {
            source: Arc::clone(&source) as Arc<dyn FrameSource>,
            audio: Arc::clone(&audio) as Arc<dyn AudioRenderer>,
            video: Arc::clone(&video) as Arc<dyn VideoRenderer>,
            controls,
            walk: Arc::new(WalkControls::new(position, speed)),
            observer: None,
            stop_rx,
            state: TickState::new(position),
        };
        Harness { source, audio, video, driver, _stop_tx: stop_tx }
    }

    #[test]
    fn test_advances_one_frame_per_tick() {
        let mut h = harness(test_info(900, false), 1, 1);
        for _ in 0..30 {
            h.driver.tick();
        }
        assert_eq!(h.driver.controls.position(), 31);
        assert_eq!(h.driver.state.last_video_position, 31);
        assert_eq!(h.driver.state.playback_frames, 30);
        assert_eq!(*h.video.rendered.lock().unwrap().last().unwrap(), 31);
    }

    #[test]
    fn test_pause_holds_position() {
        let mut h = harness(test_info(900, false), 50, 0);
        for _ in 0..5 {
            h.driver.tick();
        }
        assert_eq!(h.driver.controls.position(), 50);
        assert_eq!(h.driver.state.playback_frames, 0);
        assert!(h.driver.state.paused);
        // Nothing is displayed while paused.
        assert!(h.video.rendered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_position_clamped_at_stream_end() {
        let mut h = harness(test_info(10, false), 10, 1);
        for _ in 0..5 {
            h.driver.tick();
        }
        assert_eq!(h.driver.controls.position(), 10);
    }

    #[test]
    fn test_position_clamped_at_stream_start() {
        let mut h = harness(test_info(900, false), 1, -1);
        for _ in 0..5 {
            h.driver.tick();
        }
        assert_eq!(h.driver.controls.position(), 1);
    }

    #[test]
    fn test_audio_reseeked_every_tick_at_non_unit_speed() {
        let mut h = harness(test_info(900, true), 1, 2);
        for _ in 0..5 {
            h.driver.tick();
        }
        assert_eq!(*h.audio.seeks.lock().unwrap(), vec![3, 5, 7, 9, 11]);
    }

    #[test]
    fn test_audio_not_reseeked_at_normal_speed() {
        let mut h = harness(test_info(900, true), 1, 1);
        for _ in 0..3 {
            h.driver.tick();
        }
        assert!(h.audio.seeks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fetch_failure_skips_tick() {
        let mut h = harness(test_info(900, false), 1, 1);
        h.source.closed.store(true, Ordering::Relaxed);
        for _ in 0..3 {
            h.driver.tick();
        }
        // Position still advances but nothing reaches the renderer.
        assert_eq!(h.driver.controls.position(), 4);
        assert!(h.video.rendered.lock().unwrap().is_empty());
        assert!(h.driver.state.current_frame.is_none());
    }

    #[test]
    fn test_driver_mirrors_position_into_walk() {
        let mut h = harness(test_info(900, false), 1, 1);
        for _ in 0..4 {
            h.driver.tick();
        }
        assert_eq!(h.driver.walk.position(), 5);
    }

    #[test]
    fn test_observer_sees_drift() {
        let mut h = harness(test_info(900, true), 1, 1);
        let observer = Arc::new(TestObserver::default());
        h.driver.observer = Some(Arc::clone(&observer) as Arc<dyn PlaybackObserver>);
        h.audio.position.store(3, Ordering::Relaxed);
        for _ in 0..5 {
            h.driver.tick();
        }
        let ticks = observer.ticks.lock().unwrap();
        assert_eq!(ticks.len(), 5);
        let last = ticks.last().unwrap();
        assert_eq!(last.position, 6);
        assert_eq!(last.audio_position, 3);
        assert_eq!(last.drift, 3);
    }

    #[test]
    fn test_start_rejects_negative_position() {
        let audio = Arc::new(TestAudio::default());
        let video = Arc::new(TestVideo::default());
        let source = Arc::new(TestSource::new(test_info(900, true)));
        let mut engine = PlaybackEngine::new(
            Arc::clone(&audio) as Arc<dyn AudioRenderer>,
            Arc::clone(&video) as Arc<dyn VideoRenderer>,
        );
        engine.set_source(Arc::clone(&source) as Arc<dyn FrameSource>);
        engine.seek(-1);

        let err = engine.start().unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidPosition(-1)));
        assert!(!audio.started.load(Ordering::Relaxed));
        assert!(!video.started.load(Ordering::Relaxed));
        assert!(source.requested.lock().unwrap().is_empty());
    }

    #[test]
    fn test_start_without_source_is_inert() {
        let audio = Arc::new(TestAudio::default());
        let video = Arc::new(TestVideo::default());
        let mut engine = PlaybackEngine::new(
            Arc::clone(&audio) as Arc<dyn AudioRenderer>,
            Arc::clone(&video) as Arc<dyn VideoRenderer>,
        );
        assert!(engine.start().is_ok());
        assert!(!audio.started.load(Ordering::Relaxed));
        assert!(!video.started.load(Ordering::Relaxed));
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let _ = env_logger::builder().is_test(true).try_init();

        let audio = Arc::new(TestAudio::default());
        let video = Arc::new(TestVideo::default());
        let source = Arc::new(TestSource::new(test_info(900, true)));
        let mut engine = PlaybackEngine::new(
            Arc::clone(&audio) as Arc<dyn AudioRenderer>,
            Arc::clone(&video) as Arc<dyn VideoRenderer>,
        );
        engine.set_source(Arc::clone(&source) as Arc<dyn FrameSource>);

        engine.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        engine.stop();

        assert!(audio.started.load(Ordering::Relaxed));
        assert!(audio.stopped.load(Ordering::Relaxed));
        assert!(video.started.load(Ordering::Relaxed));
        assert!(video.stopped.load(Ordering::Relaxed));
        assert!(engine.position() > 1);
        let rendered = video.rendered.lock().unwrap().clone();
        assert!(!rendered.is_empty());
        assert!(rendered.windows(2).all(|w| w[1] >= w[0]));

        // Idempotent after everything is already down.
        engine.stop();
    }
}
