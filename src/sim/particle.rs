use super::Cell;
use crate::color::{clamp01, finite_vec2, Color};
use crate::settings::ParticleSettings;
use glam::Vec2;

/// A burst of particles around a grid position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Emission {
    pub x: usize,
    pub y: usize,
    pub color: Color,
    pub radius: f32,
    pub count: usize,
}

/// Friction, fade and advection over the whole grid, row-major.
///
/// Slow cells accumulate time until their displacement reaches a full pixel.
/// Moving cells hand their velocity and color to the destination, which wraps
/// around the grid edges, and keep nothing of either.
pub fn advect(
    cells: &mut [Cell],
    width: usize,
    height: usize,
    settings: &ParticleSettings,
    dt: f32,
) {
    let friction = 1.0 - clamp01(settings.friction * dt);
    let fade = 1.0 - clamp01(settings.fade * dt);

    for i in 0..cells.len() {
        let cell = &mut cells[i];
        cell.velocity = finite_vec2(cell.velocity * friction);
        cell.particle = (cell.particle * fade).finite();

        let shift = cell.velocity * cell.particle_delta;
        if shift.x.abs() < 1.0 && shift.y.abs() < 1.0 {
            if cell.velocity.length_squared() > 0.01 {
                cell.particle_delta += dt;
            } else {
                cell.particle_delta = 0.0;
            }
            continue;
        }
        cell.particle_delta = 0.0;

        let (x, y) = ((i % width) as f32, (i / width) as f32);
        let j = wrap(x + shift.x, width) + wrap(y + shift.y, height) * width;
        if j == i {
            continue;
        }

        let velocity = std::mem::take(&mut cells[i].velocity);
        let color = std::mem::take(&mut cells[i].particle);
        let target = &mut cells[j];
        target.velocity = finite_vec2(target.velocity + velocity);
        target.particle = color.lerp(target.particle, 0.5).finite();
    }
}

/// Scatters `emission.count` particles. Destinations outside the grid are
/// dropped.
pub fn emit(
    cells: &mut [Cell],
    width: usize,
    height: usize,
    emission: &Emission,
    settings: &ParticleSettings,
    rng: &mut fastrand::Rng,
) {
    let shifted = emission.color.shift_hue(settings.shift);
    let target = (emission.color.polarize(settings.polarize) + shifted).finite();
    let r = emission.radius;

    for _ in 0..emission.count {
        let offset = Vec2::new(
            uniform(rng, -r, r * settings.forward),
            uniform(rng, -r, r),
        );
        let speed = uniform(rng, settings.speed.min, settings.speed.max);

        let px = (emission.x as f32 + offset.x).floor();
        let py = (emission.y as f32 + offset.y).floor();
        if px < 0.0 || py < 0.0 || px >= width as f32 || py >= height as f32 {
            continue;
        }

        let cell = &mut cells[px as usize + py as usize * width];
        cell.velocity = finite_vec2(cell.velocity + offset * speed);
        cell.particle = cell.particle.lerp(target, settings.shine).finite();
    }
}

fn uniform(rng: &mut fastrand::Rng, lo: f32, hi: f32) -> f32 {
    lo + (hi - lo) * rng.f32()
}

fn wrap(v: f32, bound: usize) -> usize {
    // rem_euclid can round up to `bound` for tiny negatives.
    (v.rem_euclid(bound as f32) as usize).min(bound - 1)
}
