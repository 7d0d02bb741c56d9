use super::Cell;
use crate::color::Color;
use crate::settings::CameraSettings;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Turns raw camera pixels into validated read colors.
#[derive(Debug, Clone, Copy)]
pub struct Conditioner {
    settings: CameraSettings,
}

impl Conditioner {
    pub fn new(settings: CameraSettings) -> Self {
        Self { settings }
    }

    /// Returns the conditioned color and whether any channel reached the
    /// threshold. Invalid pixels come back black.
    pub fn apply(&self, raw: Color) -> (Color, bool) {
        let s = &self.settings;
        let mut c = raw.lerp(raw.polarize(1.0), s.polarize_pre);
        c = c * s.multiply_pre;
        c = c.powf(s.contrast);
        c = c * s.multiply_post;

        let valid = c.any_at_least(s.threshold);
        if valid {
            (c.lerp(c.polarize(1.0), s.polarize_post).finite(), true)
        } else {
            (Color::BLACK, false)
        }
    }

    pub(super) fn apply_frame(&self, cells: &mut [Cell], camera: &[Color]) {
        debug_assert_eq!(cells.len(), camera.len());

        #[cfg(feature = "parallel")]
        cells
            .par_iter_mut()
            .zip(camera.par_iter())
            .for_each(|(cell, raw)| self.apply_cell(cell, *raw));

        #[cfg(not(feature = "parallel"))]
        cells
            .iter_mut()
            .zip(camera.iter())
            .for_each(|(cell, raw)| self.apply_cell(cell, *raw));
    }

    fn apply_cell(&self, cell: &mut Cell, raw: Color) {
        let (read, valid) = self.apply(raw);
        cell.read = read;
        cell.valid = valid;
    }
}
