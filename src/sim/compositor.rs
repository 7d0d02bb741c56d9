use super::{Cell, Emission};
use crate::color::{clamp01, Color};
use crate::settings::{CursorSettings, ParticleSettings};

pub(super) fn blur(cell: &mut Cell, jitter: f32, dt: f32) {
    let target = cell.read + cell.shape_color;
    cell.last = cell.last.lerp(target, clamp01(jitter * dt)).finite();
}

/// Cursor contribution for column `x`. Without a trail only the playhead
/// column is lit.
pub(super) fn cursor_bar(
    x: usize,
    column: usize,
    width: usize,
    cursor: Color,
    settings: &CursorSettings,
) -> Color {
    if x == column {
        return cursor;
    }
    if settings.trail <= 0.0 {
        return Color::BLACK;
    }
    let wrapped = if x > column {
        x as f32 - width as f32
    } else {
        x as f32
    };
    let distance = (column as f32 - wrapped).clamp(0.0, settings.trail);
    cursor * (1.0 - distance / settings.trail).powf(settings.fade)
}

pub(super) fn composite(cell: &Cell, bar: Color) -> Color {
    (bar + cell.last + cell.particle).finite()
}

/// Particles released by a valid pixel under the playhead; brighter shape
/// colors emit more particles over a wider radius.
pub(super) fn playhead_emission(
    x: usize,
    y: usize,
    shape: Color,
    cursor: Color,
    particle: &ParticleSettings,
    blend: f32,
) -> Emission {
    let ratio = shape.max_channel().max(0.0).powf(particle.power);
    Emission {
        x,
        y,
        color: shape.lerp(cursor, blend),
        radius: particle.radius.lerp(ratio),
        count: particle.count.lerp(ratio).round().max(0.0) as usize,
    }
}
