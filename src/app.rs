use crate::audio::{AudioSink, CpalAudio, SilentAudio};
use crate::camera::{FrameSource, PatternSource, StreamSource, MIN_FRAME_SIDE};
use crate::config::{Config, SourceKind};
use crate::render::{Frame, HalfBlockRenderer, Renderer};
use crate::scheduler::{FixedStep, Scheduler};
use crate::settings::Settings;
use crate::sim::Simulation;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::sound::{default_instruments, Envelope, VoicePool};
use crate::terminal::TerminalGuard;
use crate::view::{rasterize, rasterize_colors, ViewMode};
use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::io::BufWriter;
use std::time::{Duration, Instant};

const HUD_ROWS: usize = 2;

/// Columns and rows, falling back to 80x24 when the size is unknown.
fn terminal_size() -> (usize, usize) {
    crossterm::terminal::size()
        .map(|(c, r)| (c as usize, r as usize))
        .unwrap_or((80, 24))
}

pub fn run(cfg: Config) -> anyhow::Result<()> {
    let mut settings = Settings::load(cfg.settings.as_deref()).context("load settings")?;
    settings
        .apply_overrides(&cfg)
        .context("apply command line overrides")?;

    let (cols, rows) = terminal_size();
    let width = cfg.width.unwrap_or(cols).max(MIN_FRAME_SIDE);
    let height = cfg
        .height
        .unwrap_or(rows.saturating_sub(HUD_ROWS) * 2)
        .max(MIN_FRAME_SIDE);

    let mut source: Box<dyn FrameSource> = match cfg.source {
        SourceKind::Pattern => Box::new(PatternSource::new(width, height, cfg.camera_rate, cfg.seed)?),
        SourceKind::Stream => Box::new(
            StreamSource::open(&cfg.input, width, height)
                .with_context(|| format!("open stream source {}", cfg.input))?,
        ),
    };

    let instruments = default_instruments();
    let mut audio: Box<dyn AudioSink> = if cfg.mute {
        Box::new(SilentAudio)
    } else {
        Box::new(
            CpalAudio::new(cfg.device.as_deref(), &instruments, settings.music.voices)
                .context("start audio output (use --mute to run silently)")?,
        )
    };

    let dt = FixedStep::step_size(&settings.music, width, cfg.camera_rate);
    log::info!(
        "grid {}x{}, source {}, step {:.2} ms",
        width,
        height,
        source.name(),
        dt.as_secs_f64() * 1000.0
    );

    let sim = Simulation::new(width, height, &settings, instruments, cfg.seed);
    let voices = VoicePool::new(settings.music.voices, Envelope::from(&settings.music));
    let mut scheduler = Scheduler::new(sim, FixedStep::new(dt), voices);

    let _term = TerminalGuard::new()?;
    let mut out = BufWriter::new(std::io::stdout());
    let mut renderer = HalfBlockRenderer::new();
    let mut ui = Ui::new(cfg.view);
    let mut snapshots: Option<SnapshotStore> = None;
    let mut term = (cols, rows);
    let mut rgba = Vec::new();
    let mut fps = RateCounter::new();
    let mut step_rate = RateCounter::new();
    let mut last = Instant::now();

    loop {
        let now = Instant::now();

        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(k) if k.kind != KeyEventKind::Release => {
                    let action = ui.handle_key(k.code, k.modifiers);
                    match action {
                        Action::Quit => {
                            scheduler.silence(&mut *audio);
                            return Ok(());
                        }
                        Action::None => {}
                        Action::Clear => scheduler.sim_mut().clear(),
                        Action::Burst => scheduler.sim_mut().burst(),
                        Action::Save => {
                            ui.status = save_snapshot(&mut snapshots, &cfg, &scheduler);
                        }
                        Action::BrowseNext | Action::BrowseBest => {
                            ui.status = browse_snapshot(&mut snapshots, &cfg, &mut ui, action);
                        }
                    }
                }
                Event::Resize(c, r) => term = (c as usize, r as usize),
                _ => {}
            }
        }

        let plan = scheduler.tick(now.duration_since(last), &mut *source, &mut *audio)?;
        last = now;
        step_rate.add(plan.steps);

        let hud_rows = if ui.show_hud { HUD_ROWS } else { 0 };
        let out_w = term.0.max(1);
        let out_h = term.1.saturating_sub(hud_rows).max(1) * 2;
        match &ui.browsing {
            Some((_, snap)) => {
                rasterize_colors(&snap.pixels, snap.width, snap.height, out_w, out_h, &mut rgba)
            }
            None => rasterize(
                scheduler.sim(),
                scheduler.camera_frame(),
                ui.view,
                out_w,
                out_h,
                &mut rgba,
            ),
        }

        let hud = if ui.show_hud {
            build_hud(&scheduler, source.name(), &ui, fps.rate(), step_rate.rate())
        } else {
            Vec::new()
        };
        let frame = Frame {
            pixels: &rgba,
            width: out_w,
            height: out_h,
            hud: &hud,
            overlay: ui.show_help.then_some(HELP),
            sync_updates: cfg.sync_updates,
        };
        renderer.present(&frame, &mut out)?;
        fps.add(1);

        let target = Duration::from_secs_f32(1.0 / cfg.fps.max(1) as f32);
        let elapsed = now.elapsed();
        if elapsed < target {
            std::thread::sleep(target - elapsed);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    None,
    Quit,
    Clear,
    Burst,
    Save,
    BrowseNext,
    BrowseBest,
}

struct Ui {
    view: ViewMode,
    show_hud: bool,
    show_help: bool,
    browsing: Option<(usize, Snapshot)>,
    status: String,
}

impl Ui {
    fn new(view: ViewMode) -> Self {
        Self {
            view,
            show_hud: true,
            show_help: false,
            browsing: None,
            status: String::new(),
        }
    }

    fn handle_key(&mut self, code: KeyCode, mods: KeyModifiers) -> Action {
        if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
            return Action::Quit;
        }
        match code {
            KeyCode::Esc if self.browsing.is_some() => {
                self.browsing = None;
                Action::None
            }
            KeyCode::Enter => {
                self.browsing = None;
                Action::None
            }
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Action::Quit,
            KeyCode::Tab => {
                self.view = self.view.next();
                Action::None
            }
            KeyCode::BackTab => {
                self.view = self.view.prev();
                Action::None
            }
            KeyCode::Char('c') | KeyCode::Char('C') => {
                self.view = if self.view == ViewMode::Camera {
                    ViewMode::Composite
                } else {
                    ViewMode::Camera
                };
                Action::None
            }
            KeyCode::Char('f') | KeyCode::Char('F') => {
                self.show_hud = !self.show_hud;
                Action::None
            }
            KeyCode::Char('h') | KeyCode::Char('H') | KeyCode::Char('?') | KeyCode::F(1) => {
                self.show_help = !self.show_help;
                Action::None
            }
            KeyCode::Char('x') | KeyCode::Char('X') => Action::Clear,
            KeyCode::Char(' ') => Action::Burst,
            KeyCode::Char('s') | KeyCode::Char('S') => Action::Save,
            KeyCode::Char('l') | KeyCode::Char('L') => Action::BrowseNext,
            KeyCode::Char('b') | KeyCode::Char('B') => Action::BrowseBest,
            _ => Action::None,
        }
    }
}

fn store<'a>(
    snapshots: &'a mut Option<SnapshotStore>,
    cfg: &Config,
) -> Result<&'a mut SnapshotStore, String> {
    if snapshots.is_none() {
        let opened = SnapshotStore::open(&cfg.snapshots).map_err(|e| e.to_string())?;
        *snapshots = Some(opened);
    }
    snapshots
        .as_mut()
        .ok_or_else(|| "snapshot store unavailable".to_string())
}

fn save_snapshot(snapshots: &mut Option<SnapshotStore>, cfg: &Config, scheduler: &Scheduler) -> String {
    let sim = scheduler.sim();
    let result = store(snapshots, cfg)
        .and_then(|s| {
            s.save(sim.pixels(), sim.width(), sim.height())
                .map(|score| (s.len(), score))
                .map_err(|e| e.to_string())
        });
    match result {
        Ok((n, score)) => format!("saved snapshot {} (score {:.3})", n - 1, score),
        Err(err) => {
            log::warn!("snapshot save failed: {err}");
            format!("save failed: {err}")
        }
    }
}

fn browse_snapshot(
    snapshots: &mut Option<SnapshotStore>,
    cfg: &Config,
    ui: &mut Ui,
    action: Action,
) -> String {
    let store = match store(snapshots, cfg) {
        Ok(s) => s,
        Err(err) => return format!("snapshots unavailable: {err}"),
    };
    if store.is_empty() {
        return "no snapshots saved yet".to_string();
    }
    let index = match (action, &ui.browsing) {
        (Action::BrowseBest, _) => store.best().unwrap_or(0),
        (_, Some((i, _))) => (i + 1) % store.len(),
        (_, None) => 0,
    };
    match store.load(index) {
        Ok(snap) => {
            let msg = format!(
                "snapshot {}/{} (score {:.3}), enter to return",
                index + 1,
                store.len(),
                snap.score
            );
            ui.browsing = Some((index, snap));
            msg
        }
        Err(err) => format!("load failed: {err}"),
    }
}

fn build_hud(scheduler: &Scheduler, source: &str, ui: &Ui, fps: f32, steps: f32) -> Vec<String> {
    let sim = scheduler.sim();
    let stats = scheduler.stats();
    let step = sim.stats();
    let voices = scheduler.voices();
    let view = if ui.browsing.is_some() {
        "snapshot"
    } else {
        ui.view.label()
    };
    vec![
        format!(
            "pixelsong | {} | {}x{} | view {} | fps {:.0} | steps/s {:.0} | skipped {} | faults {}",
            source,
            sim.width(),
            sim.height(),
            view,
            fps,
            steps,
            stats.skipped,
            stats.faults
        ),
        format!(
            "playhead {:>3} | shapes {:>4} | valid {:>5} | triggers {:>2} | voices {}/{} | {}",
            step.column,
            sim.shapes().len(),
            step.valid,
            step.triggered,
            voices.active(),
            voices.capacity(),
            ui.status
        ),
    ]
}

const HELP: &str = "pixelsong keys\n\
tab / shift-tab  next / previous view\n\
c  camera view on/off\n\
space  particle burst\n\
x  clear particles and blur\n\
s  save snapshot\n\
l  browse saved snapshots, b  best snapshot\n\
enter  back to live view\n\
f  show/hide HUD\n\
h or ?  toggle this help\n\
q or esc  quit";

/// Events per second over half-second windows.
struct RateCounter {
    last: Instant,
    count: u32,
    rate: f32,
}

impl RateCounter {
    fn new() -> Self {
        Self {
            last: Instant::now(),
            count: 0,
            rate: 0.0,
        }
    }

    fn add(&mut self, n: u32) {
        self.count += n;
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f32();
        if dt >= 0.5 {
            self.rate = self.count as f32 / dt;
            self.count = 0;
            self.last = now;
        }
    }

    fn rate(&self) -> f32 {
        self.rate
    }
}
