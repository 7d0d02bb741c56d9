use std::time::Instant;

use anyhow::Result;
use pixelsong::audio::AudioSink;
use pixelsong::camera::PatternSource;
use pixelsong::scheduler::{FixedStep, Scheduler};
use pixelsong::settings::Settings;
use pixelsong::sim::Simulation;
use pixelsong::sound::{default_instruments, ClipRef, Envelope, VoicePool};

struct Args {
    steps: usize,
    w: usize,
    h: usize,
    seed: u64,
    ci_smoke: bool,
    max_ms: f64,
}

fn parse_args() -> Args {
    let mut args = Args {
        steps: 600,
        w: 160,
        h: 90,
        seed: 7,
        ci_smoke: false,
        max_ms: 20.0,
    };

    let argv = std::env::args().skip(1).collect::<Vec<_>>();
    let mut i = 0usize;
    while i < argv.len() {
        let k = argv[i].as_str();
        let v = argv.get(i + 1).map(|s| s.as_str());
        match (k, v) {
            ("--steps", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.steps = n.max(1);
                }
                i += 2;
            }
            ("--width", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.w = n.max(32);
                }
                i += 2;
            }
            ("--height", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.h = n.max(32);
                }
                i += 2;
            }
            ("--seed", Some(x)) => {
                if let Ok(n) = x.parse::<u64>() {
                    args.seed = n;
                }
                i += 2;
            }
            ("--max-ms", Some(x)) => {
                if let Ok(n) = x.parse::<f64>() {
                    args.max_ms = n.max(0.1);
                }
                i += 2;
            }
            ("--ci-smoke", _) => {
                args.ci_smoke = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    args
}

/// Counts what the voice pool asks of the audio service.
#[derive(Default)]
struct CountingAudio {
    plays: usize,
    stops: usize,
    updates: usize,
}

impl AudioSink for CountingAudio {
    fn play(&mut self, _slot: usize, _clip: ClipRef, _volume: f32, _pitch: f32, _pan: f32) {
        self.plays += 1;
    }
    fn stop(&mut self, _slot: usize) {
        self.stops += 1;
    }
    fn set_volume(&mut self, _slot: usize, _volume: f32) {
        self.updates += 1;
    }
    fn set_pitch(&mut self, _slot: usize, _pitch: f32) {
        self.updates += 1;
    }
    fn set_pan(&mut self, _slot: usize, _pan: f32) {
        self.updates += 1;
    }
}

fn main() -> Result<()> {
    let args = parse_args();
    let settings = Settings::default();
    let camera_rate = 30.0;

    let mut source = PatternSource::new(args.w, args.h, camera_rate, Some(args.seed))?;
    let sim = Simulation::new(args.w, args.h, &settings, default_instruments(), Some(args.seed));
    let dt = FixedStep::step_size(&settings.music, args.w, camera_rate);
    let voices = VoicePool::new(settings.music.voices, Envelope::from(&settings.music));
    let mut scheduler = Scheduler::new(sim, FixedStep::new(dt), voices);
    let mut audio = CountingAudio::default();

    println!(
        "step benchmark: steps={} size={}x{} dt={:.2}ms parallel={}",
        args.steps,
        args.w,
        args.h,
        dt.as_secs_f64() * 1000.0,
        cfg!(feature = "parallel")
    );

    let mut peak_shapes = 0usize;
    let mut triggered = 0usize;
    let mut worst_ms = 0.0f64;
    let start = Instant::now();
    for _ in 0..args.steps {
        let t = Instant::now();
        scheduler.step(&mut source, &mut audio)?;
        worst_ms = worst_ms.max(t.elapsed().as_secs_f64() * 1000.0);
        peak_shapes = peak_shapes.max(scheduler.sim().shapes().len());
        triggered += scheduler.sim().stats().triggered;
    }
    let ms = start.elapsed().as_secs_f64() * 1000.0 / args.steps as f64;

    println!(
        "  {:>8.3} ms/step  worst={:>8.3}  shapes(peak)={:>4}  triggers={:>5}  plays={:>5}  stops={:>5}  updates={:>6}",
        ms, worst_ms, peak_shapes, triggered, audio.plays, audio.stops, audio.updates
    );

    if args.ci_smoke && ms > args.max_ms {
        eprintln!("FAIL: {:.3} ms/step exceeds {:.3}", ms, args.max_ms);
        std::process::exit(1);
    }
    Ok(())
}
