use crate::audio::AudioSink;
use crate::camera::FrameSource;
use crate::color::Color;
use crate::settings::MusicSettings;
use crate::sim::Simulation;
use crate::sound::{SoundSlot, VoicePool};
use std::any::Any;
use std::thread;
use std::time::Duration;

#[cfg(feature = "parallel")]
use std::panic::{self, AssertUnwindSafe};

/// Most steps run for one host tick; older backlog is dropped.
pub const MAX_CATCH_UP: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepPlan {
    pub steps: u32,
    pub skipped: u64,
}

/// Fixed-timestep accumulator with bounded catch-up.
#[derive(Debug, Clone)]
pub struct FixedStep {
    dt: Duration,
    backlog: Duration,
    max_steps: u32,
}

impl FixedStep {
    pub fn new(dt: Duration) -> Self {
        Self {
            dt: dt.max(Duration::from_micros(100)),
            backlog: Duration::ZERO,
            max_steps: MAX_CATCH_UP,
        }
    }

    /// One playhead column per step, but never faster than the camera.
    pub fn step_size(music: &MusicSettings, width: usize, camera_rate: f32) -> Duration {
        let column = 60.0 / music.tempo.max(1.0) as f64 * music.beats as f64 / width.max(1) as f64;
        let frame = 1.0 / camera_rate.max(1.0) as f64;
        Duration::from_secs_f64(column.max(frame))
    }

    pub fn dt(&self) -> Duration {
        self.dt
    }

    pub fn backlog(&self) -> Duration {
        self.backlog
    }

    /// Adds `elapsed` wall time and returns how many steps to run now.
    pub fn advance(&mut self, elapsed: Duration) -> StepPlan {
        self.backlog += elapsed;
        let dt = self.dt.as_nanos();
        let due = self.backlog.as_nanos() / dt;
        let max = self.max_steps as u128;

        if due > max {
            self.backlog = Duration::ZERO;
            return StepPlan {
                steps: self.max_steps,
                skipped: (due - max) as u64,
            };
        }
        self.backlog -= self.dt * due as u32;
        StepPlan {
            steps: due as u32,
            skipped: 0,
        }
    }

    pub fn reset(&mut self) {
        self.backlog = Duration::ZERO;
    }
}

/// Raw camera frames. The step reads `read` while the next frame lands in
/// `write`; they trade places after the step joins.
#[derive(Debug, Clone)]
pub struct CameraBuffers {
    pub read: Vec<Color>,
    pub write: Vec<Color>,
}

impl CameraBuffers {
    pub fn new(len: usize) -> Self {
        Self {
            read: vec![Color::BLACK; len],
            write: vec![Color::BLACK; len],
        }
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.read, &mut self.write);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub steps: u64,
    pub skipped: u64,
    pub faults: u64,
}

/// Owns the simulation and everything that must stay in lockstep with it.
pub struct Scheduler {
    sim: Simulation,
    clock: FixedStep,
    camera: CameraBuffers,
    play: Vec<SoundSlot>,
    voices: VoicePool,
    time: f64,
    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new(sim: Simulation, clock: FixedStep, voices: VoicePool) -> Self {
        let len = sim.width() * sim.height();
        Self {
            sim,
            clock,
            camera: CameraBuffers::new(len),
            play: Vec::new(),
            voices,
            time: 0.0,
            stats: SchedulerStats::default(),
        }
    }

    pub fn sim(&self) -> &Simulation {
        &self.sim
    }

    pub fn sim_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    pub fn clock(&self) -> &FixedStep {
        &self.clock
    }

    pub fn voices(&self) -> &VoicePool {
        &self.voices
    }

    /// Last committed camera frame.
    pub fn camera_frame(&self) -> &[Color] {
        &self.camera.read
    }

    /// Musical clock in seconds; advances by `dt` per executed step.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Runs the steps due for `elapsed` wall time.
    pub fn tick(
        &mut self,
        elapsed: Duration,
        source: &mut dyn FrameSource,
        audio: &mut dyn AudioSink,
    ) -> anyhow::Result<StepPlan> {
        let plan = self.clock.advance(elapsed);
        if plan.skipped > 0 {
            log::debug!("falling behind: skipped {} steps", plan.skipped);
            self.stats.skipped += plan.skipped;
        }
        for _ in 0..plan.steps {
            self.step(source, audio)?;
        }
        Ok(plan)
    }

    /// One fixed step. The simulation runs on a worker while this thread
    /// fetches the next camera frame and services the voices; both meet at
    /// the join before any buffer is swapped.
    ///
    /// Fails only when the source can no longer deliver frames. Nothing is
    /// committed then: the camera buffers, the sound list and the clock stay
    /// where they were.
    pub fn step(
        &mut self,
        source: &mut dyn FrameSource,
        audio: &mut dyn AudioSink,
    ) -> anyhow::Result<()> {
        let dt = self.clock.dt().as_secs_f32();
        let time = self.time;
        let Self {
            sim,
            camera,
            play,
            voices,
            ..
        } = self;
        let read = &camera.read;
        let write = &mut camera.write;

        let (joined, fetched) = overlap(
            move || sim.step(read, time, dt),
            || -> anyhow::Result<()> {
                source.request();
                voices.dispatch(play, audio);
                voices.advance(dt, audio);
                loop {
                    if source.poll(write)? {
                        return Ok(());
                    }
                    source.wait();
                }
            },
        );

        if let Err(payload) = joined {
            // The grid keeps whatever the step managed to write.
            log::error!("simulation step panicked: {}", panic_message(&*payload));
            self.stats.faults += 1;
        }
        fetched?;

        self.camera.swap();
        std::mem::swap(self.sim.sounds_mut(), &mut self.play);
        self.time += dt as f64;
        self.stats.steps += 1;
        Ok(())
    }

    /// Stops every voice and forgets pending candidates.
    pub fn silence(&mut self, audio: &mut dyn AudioSink) {
        self.voices.stop_all(audio);
        self.play.clear();
        self.sim.sounds_mut().clear();
    }
}

/// Runs `work` on a rayon pool thread while `here` runs on the calling
/// thread. A panic in `work` is caught and returned instead of unwinding.
#[cfg(feature = "parallel")]
fn overlap<R>(
    work: impl FnOnce() + Send,
    here: impl FnOnce() -> R,
) -> (thread::Result<()>, R) {
    let mut outcome = None;
    let result = rayon::in_place_scope(|s| {
        s.spawn(|_| outcome = Some(panic::catch_unwind(AssertUnwindSafe(work))));
        here()
    });
    (outcome.unwrap_or(Ok(())), result)
}

#[cfg(not(feature = "parallel"))]
fn overlap<R>(
    work: impl FnOnce() + Send,
    here: impl FnOnce() -> R,
) -> (thread::Result<()>, R) {
    thread::scope(|s| {
        let worker = s.spawn(work);
        let result = here();
        (worker.join(), result)
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
