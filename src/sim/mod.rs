//! Per-pixel simulation core.
//!
//! One [`Simulation::step`] runs the particle pass over the whole grid, then
//! conditions the camera frame, updates shapes, blurs and composites every
//! cell, emits at the playhead column and finally adapts the cursor.

mod compositor;
mod condition;
mod cursor;
mod particle;
mod shape;

pub use condition::Conditioner;
pub use cursor::{playhead_beat, playhead_column, Cursor};
pub use particle::{advect, emit, Emission};
pub use shape::{Shape, ShapeArena, ShapeHandle};

use crate::color::Color;
use crate::settings::Settings;
use crate::sound::{Instrument, SoundMapper, SoundSlot};
use glam::Vec2;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Cell {
    pub velocity: Vec2,
    pub particle: Color,
    /// Seconds a slow particle has been accumulating toward a full pixel.
    pub particle_delta: f32,
    /// Blurred read + shape color.
    pub last: Color,
    pub read: Color,
    pub valid: bool,
    pub shape: Option<ShapeHandle>,
    /// Output of the shape stage for this cell.
    pub shape_color: Color,
    /// Color this cell currently contributes to its shape's accumulator.
    pub shape_added: Color,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepStats {
    pub column: usize,
    pub emitted: usize,
    pub triggered: usize,
    pub valid: usize,
}

pub struct Simulation {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    pixels: Vec<Color>,
    shapes: ShapeArena,
    cursor: Cursor,
    settings: Settings,
    conditioner: Conditioner,
    mapper: SoundMapper,
    sounds: Vec<SoundSlot>,
    emissions: Vec<Emission>,
    rng: fastrand::Rng,
    stats: StepStats,
    #[cfg(test)]
    fault: Option<&'static str>,
}

impl Simulation {
    pub fn new(
        width: usize,
        height: usize,
        settings: &Settings,
        instruments: Vec<Instrument>,
        seed: Option<u64>,
    ) -> Self {
        let len = width * height;
        Self {
            width,
            height,
            cells: vec![Cell::default(); len],
            pixels: vec![Color::BLACK; len],
            shapes: ShapeArena::new(),
            cursor: Cursor::new(settings.cursor.color),
            settings: *settings,
            conditioner: Conditioner::new(settings.camera),
            mapper: SoundMapper::new(instruments, settings.music),
            sounds: Vec::new(),
            emissions: Vec::new(),
            rng: seed.map(fastrand::Rng::with_seed).unwrap_or_default(),
            stats: StepStats::default(),
            #[cfg(test)]
            fault: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<&Cell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(x + y * self.width)
    }

    pub fn shapes(&self) -> &ShapeArena {
        &self.shapes
    }

    /// Composited colors of the last step.
    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn stats(&self) -> StepStats {
        self.stats
    }

    pub fn mapper(&self) -> &SoundMapper {
        &self.mapper
    }

    /// Sound candidates produced since the list was last swapped out.
    pub fn sounds_mut(&mut self) -> &mut Vec<SoundSlot> {
        &mut self.sounds
    }

    /// Advances the grid by `dt` seconds. `time` is the musical clock in
    /// seconds and picks the playhead column; `camera` must hold one raw color
    /// per cell.
    pub fn step(&mut self, camera: &[Color], time: f64, dt: f32) {
        let (width, height) = (self.width, self.height);
        let music = self.settings.music;
        let column = playhead_column(time / 60.0, music.tempo, music.beats, width);
        let mut stats = StepStats {
            column,
            ..StepStats::default()
        };

        particle::advect(&mut self.cells, width, height, &self.settings.particle, dt);
        self.conditioner.apply_frame(&mut self.cells, camera);

        #[cfg(test)]
        if let Some(message) = self.fault.take() {
            panic!("{message}");
        }

        let cursor = self.cursor.color();
        let mut sum = cursor;
        for y in 0..height {
            for x in 0..width {
                shape::update(
                    &mut self.cells,
                    &mut self.shapes,
                    width,
                    height,
                    x,
                    y,
                    &self.settings.camera,
                );

                let i = x + y * width;
                let cell = &mut self.cells[i];
                compositor::blur(cell, self.settings.camera.jitter, dt);
                let bar = compositor::cursor_bar(x, column, width, cursor, &self.settings.cursor);
                self.pixels[i] = compositor::composite(cell, bar);

                if !cell.valid {
                    continue;
                }
                stats.valid += 1;
                if x != column {
                    continue;
                }

                let shape = cell.shape_color;
                self.emissions.push(compositor::playhead_emission(
                    x,
                    y,
                    shape,
                    cursor,
                    &self.settings.particle,
                    self.settings.cursor.blend,
                ));
                if let Some(sound) = self.mapper.map(x, y, width, height, shape) {
                    self.sounds.push(sound);
                    stats.triggered += 1;
                }
                sum += shape;
            }
        }

        for emission in self.emissions.drain(..) {
            stats.emitted += emission.count;
            particle::emit(
                &mut self.cells,
                width,
                height,
                &emission,
                &self.settings.particle,
                &mut self.rng,
            );
        }

        self.cursor.adapt(sum, self.settings.cursor.adapt, dt);
        self.stats = stats;
    }

    /// Makes the next step panic once advection and conditioning are done.
    #[cfg(test)]
    pub(crate) fn fail_next_step(&mut self, message: &'static str) {
        self.fault = Some(message);
    }

    /// Scatters particles directly, outside the playhead.
    pub fn emit(&mut self, emission: Emission) {
        particle::emit(
            &mut self.cells,
            self.width,
            self.height,
            &emission,
            &self.settings.particle,
            &mut self.rng,
        );
    }

    /// A full-strength emission in the cursor color at a random position.
    pub fn burst(&mut self) {
        if self.cells.is_empty() {
            return;
        }
        let particle = &self.settings.particle;
        let emission = Emission {
            x: self.rng.usize(..self.width),
            y: self.rng.usize(..self.height),
            color: self.cursor.color(),
            radius: particle.radius.max,
            count: particle.count.max.round() as usize,
        };
        self.emit(emission);
    }

    /// Drops particles and blur. Shape membership is rebuilt from the next
    /// camera frame.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.velocity = Vec2::ZERO;
            cell.particle = Color::BLACK;
            cell.particle_delta = 0.0;
            cell.last = Color::BLACK;
        }
        self.pixels.fill(Color::BLACK);
    }
}
