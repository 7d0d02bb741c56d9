use pixelsong::audio::AudioSink;
use pixelsong::camera::{FrameSource, StillSource, StreamSource};
use pixelsong::color::Color;
use pixelsong::scheduler::{FixedStep, Scheduler, StepPlan, MAX_CATCH_UP};
use pixelsong::settings::{MusicSettings, Settings};
use pixelsong::sim::Simulation;
use pixelsong::sound::{default_instruments, ClipRef, Envelope, VoicePool};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Play {
    slot: usize,
    clip: ClipRef,
    volume: f32,
    pitch: f32,
    pan: f32,
}

#[derive(Default)]
struct Recorder {
    plays: Vec<Play>,
}

impl AudioSink for Recorder {
    fn play(&mut self, slot: usize, clip: ClipRef, volume: f32, pitch: f32, pan: f32) {
        self.plays.push(Play {
            slot,
            clip,
            volume,
            pitch,
            pan,
        });
    }
    fn stop(&mut self, _slot: usize) {}
    fn set_volume(&mut self, _slot: usize, _volume: f32) {}
    fn set_pitch(&mut self, _slot: usize, _pitch: f32) {}
    fn set_pan(&mut self, _slot: usize, _pan: f32) {}
}

/// Wraps a source and reports "not ready" for the first few polls of every
/// step.
struct Lagging<S> {
    inner: S,
    lag: u32,
    left: u32,
    polls: u32,
    waits: u32,
}

impl<S: FrameSource> FrameSource for Lagging<S> {
    fn dimensions(&self) -> (usize, usize) {
        self.inner.dimensions()
    }
    fn request(&mut self) {
        self.left = self.lag;
        self.inner.request();
    }
    fn poll(&mut self, out: &mut [Color]) -> anyhow::Result<bool> {
        self.polls += 1;
        if self.left > 0 {
            self.left -= 1;
            return Ok(false);
        }
        self.inner.poll(out)
    }
    fn wait(&mut self) {
        self.waits += 1;
    }
    fn name(&self) -> &str {
        "lagging"
    }
}

/// 8x8 grid where one step is one second and one column.
fn one_column_per_second() -> (Settings, Duration) {
    let settings = Settings {
        music: MusicSettings {
            tempo: 60.0,
            beats: 8,
            ..MusicSettings::default()
        },
        ..Settings::default()
    };
    let dt = FixedStep::step_size(&settings.music, 8, 1.0);
    (settings, dt)
}

fn scheduler(settings: &Settings, dt: Duration) -> Scheduler {
    sized_scheduler(settings, dt, 8)
}

fn sized_scheduler(settings: &Settings, dt: Duration, side: usize) -> Scheduler {
    let sim = Simulation::new(side, side, settings, default_instruments(), Some(1));
    let voices = VoicePool::new(settings.music.voices, Envelope::from(&settings.music));
    Scheduler::new(sim, FixedStep::new(dt), voices)
}

fn lower_half_red() -> Vec<Color> {
    (0..64)
        .map(|i| {
            if i / 8 < 4 {
                Color::new(1.0, 0.0, 0.0)
            } else {
                Color::BLACK
            }
        })
        .collect()
}

#[test]
fn long_stall_runs_a_bounded_number_of_steps() {
    let mut clock = FixedStep::new(Duration::from_millis(10));
    let plan = clock.advance(Duration::from_millis(1000));
    assert_eq!(
        plan,
        StepPlan {
            steps: MAX_CATCH_UP,
            skipped: 90
        }
    );
    assert_eq!(clock.backlog(), Duration::ZERO);
}

#[test]
fn partial_steps_carry_over() {
    let mut clock = FixedStep::new(Duration::from_millis(10));
    assert_eq!(clock.advance(Duration::from_millis(25)).steps, 2);
    assert_eq!(clock.backlog(), Duration::from_millis(5));
    assert_eq!(clock.advance(Duration::from_millis(5)).steps, 1);
    assert_eq!(clock.advance(Duration::from_millis(3)).steps, 0);

    clock.reset();
    assert_eq!(clock.backlog(), Duration::ZERO);
}

#[test]
fn step_size_is_one_column_but_never_faster_than_the_camera() {
    let music = MusicSettings::default();
    assert_eq!(FixedStep::step_size(&music, 128, 30.0), Duration::from_micros(62_500));
    // 1024 columns would be 7.8 ms, slower camera wins.
    assert_eq!(
        FixedStep::step_size(&music, 1024, 50.0),
        Duration::from_millis(20)
    );
}

#[test]
fn tick_skips_the_backlog_beyond_the_catch_up_limit() {
    let (settings, dt) = one_column_per_second();
    let mut sched = scheduler(&settings, dt);
    let mut source = StillSource::new(8, 8, vec![Color::BLACK; 64]).expect("frame size matches");
    let mut audio = Recorder::default();

    let plan = sched
        .tick(dt * 100, &mut source, &mut audio)
        .expect("still frames never fail");
    assert_eq!(plan.steps, MAX_CATCH_UP);
    assert_eq!(plan.skipped, 90);

    let stats = sched.stats();
    assert_eq!(stats.steps, MAX_CATCH_UP as u64);
    assert_eq!(stats.skipped, 90);
    assert_eq!(stats.faults, 0);
    // Only executed steps move the musical clock.
    assert!((sched.time() - MAX_CATCH_UP as f64).abs() < 1e-9);
}

#[test]
fn camera_frame_is_committed_after_the_step() {
    let (settings, dt) = one_column_per_second();
    let mut sched = scheduler(&settings, dt);
    let frame = lower_half_red();
    let mut source = StillSource::new(8, 8, frame.clone()).expect("frame size matches");
    let mut audio = Recorder::default();

    assert!(sched.camera_frame().iter().all(|c| *c == Color::BLACK));
    sched.step(&mut source, &mut audio).expect("step");
    assert_eq!(sched.camera_frame(), frame.as_slice());
    // The step itself still saw the old, black frame.
    assert_eq!(sched.sim().stats().valid, 0);

    sched.step(&mut source, &mut audio).expect("step");
    assert_eq!(sched.sim().stats().valid, 32);
}

#[test]
fn playhead_sounds_reach_the_audio_sink_one_step_later() {
    let (settings, dt) = one_column_per_second();
    assert_eq!(dt, Duration::from_secs(1));
    let mut sched = scheduler(&settings, dt);
    let mut source = StillSource::new(8, 8, lower_half_red()).expect("frame size matches");
    let mut audio = Recorder::default();

    for k in 0..4 {
        sched.step(&mut source, &mut audio).expect("step");
        assert_eq!(sched.sim().stats().column, k);
    }

    // Step 1 commits the frame, step 2 builds the shape, step 3 maps the
    // border row under column 2 and step 4 hands it to the voices.
    assert_eq!(audio.plays.len(), 1, "{:?}", audio.plays);
    let play = audio.plays[0];
    assert_eq!(play.slot, 0);
    assert_eq!(
        play.clip,
        ClipRef {
            instrument: 0,
            octave: 5
        }
    );
    assert_eq!(play.volume, 0.0);
    assert!((play.pitch - 2f32.powf(5.0 / 12.0)).abs() < 1e-6);
    assert!((play.pan + 0.5).abs() < 1e-6);
    assert_eq!(sched.voices().active(), 1);
}

#[test]
fn step_waits_for_a_late_frame() {
    let (settings, dt) = one_column_per_second();
    let mut sched = scheduler(&settings, dt);
    let frame = lower_half_red();
    let mut source = Lagging {
        inner: StillSource::new(8, 8, frame.clone()).expect("frame size matches"),
        lag: 3,
        left: 0,
        polls: 0,
        waits: 0,
    };
    let mut audio = Recorder::default();

    sched.step(&mut source, &mut audio).expect("step");
    assert_eq!(source.polls, 4);
    assert_eq!(source.waits, 3);
    assert_eq!(sched.camera_frame(), frame.as_slice());
}

#[test]
fn silence_stops_every_voice() {
    let (settings, dt) = one_column_per_second();
    let mut sched = scheduler(&settings, dt);
    let mut source = StillSource::new(8, 8, lower_half_red()).expect("frame size matches");
    let mut audio = Recorder::default();

    for _ in 0..4 {
        sched.step(&mut source, &mut audio).expect("step");
    }
    assert!(sched.voices().active() > 0);

    sched.silence(&mut audio);
    assert_eq!(sched.voices().active(), 0);
}

/// Runs `f` on its own thread and fails the test if it has not returned
/// within `limit`.
fn within<T: Send + 'static>(limit: Duration, f: impl FnOnce() -> T + Send + 'static) -> T {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(limit).expect("finished in time")
}

fn stream_file(name: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("pixelsong-{}-{}", std::process::id(), name));
    std::fs::write(&path, bytes).expect("write stream file");
    path
}

#[test]
fn stream_that_ends_before_its_first_frame_fails_the_step() {
    let path = stream_file("empty.rgb", &[]);
    let input = path.to_string_lossy().into_owned();

    let (result, stats, time) = within(Duration::from_secs(5), move || {
        let (settings, dt) = one_column_per_second();
        let mut sched = sized_scheduler(&settings, dt, 32);
        let mut source = StreamSource::open(&input, 32, 32).expect("file exists");
        let mut audio = Recorder::default();
        let result = sched.step(&mut source, &mut audio).map_err(|e| e.to_string());
        (result, sched.stats(), sched.time())
    });

    let err = result.expect_err("an empty stream never delivers a frame");
    assert!(err.contains("ended before its first frame"), "{err}");
    assert_eq!(stats.steps, 0);
    assert_eq!(time, 0.0);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn stream_repeats_its_last_frame_after_the_end() {
    let side = 32;
    // One frame whose first (top) row is red.
    let mut bytes = vec![0u8; side * side * 3];
    for px in bytes[..side * 3].chunks_exact_mut(3) {
        px[0] = 255;
    }
    let path = stream_file("one-frame.rgb", &bytes);
    let input = path.to_string_lossy().into_owned();

    let (frames, received) = within(Duration::from_secs(5), move || {
        let (settings, dt) = one_column_per_second();
        let mut sched = sized_scheduler(&settings, dt, side);
        let mut source = StreamSource::open(&input, side, side).expect("file exists");
        let mut audio = Recorder::default();
        let mut frames = Vec::new();
        for _ in 0..3 {
            sched.step(&mut source, &mut audio).expect("a delivered frame keeps repeating");
            frames.push(sched.camera_frame().to_vec());
        }
        (frames, source.received())
    });

    assert_eq!(received, 1);
    let red = Color::from_rgb8(255, 0, 0);
    for frame in &frames {
        assert_eq!(frame[(side - 1) * side], red);
        assert_eq!(frame[0], Color::BLACK);
    }
    assert_eq!(frames[0], frames[2]);

    let _ = std::fs::remove_file(&path);
}
