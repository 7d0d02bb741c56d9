use crate::color::Color;
use crate::sim::Simulation;
use clap::ValueEnum;

/// Which buffer is shown. Cycled with Tab / Shift-Tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ViewMode {
    Composite,
    Camera,
    Read,
    Shapes,
    Blur,
    Particles,
    Velocity,
}

impl ViewMode {
    pub const fn all() -> [Self; 7] {
        [
            Self::Composite,
            Self::Camera,
            Self::Read,
            Self::Shapes,
            Self::Blur,
            Self::Particles,
            Self::Velocity,
        ]
    }

    fn index(self) -> usize {
        Self::all().iter().position(|m| *m == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        let all = Self::all();
        all[(self.index() + 1) % all.len()]
    }

    pub fn prev(self) -> Self {
        let all = Self::all();
        all[(self.index() + all.len() - 1) % all.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Composite => "composite",
            Self::Camera => "camera",
            Self::Read => "read",
            Self::Shapes => "shapes",
            Self::Blur => "blur",
            Self::Particles => "particles",
            Self::Velocity => "velocity",
        }
    }

    /// Color of cell `i` in this view. `camera` is the last committed raw
    /// frame.
    pub fn sample(self, sim: &Simulation, camera: &[Color], i: usize) -> Color {
        let cell = &sim.cells()[i];
        match self {
            Self::Composite => sim.pixels()[i],
            Self::Camera => camera.get(i).copied().unwrap_or(Color::BLACK),
            Self::Read => cell.read,
            Self::Shapes => match cell.shape {
                Some(handle) => sim.shapes().average(handle),
                None => Color::BLACK,
            },
            Self::Blur => cell.last,
            Self::Particles => cell.particle,
            Self::Velocity => {
                let v = cell.velocity * 0.05;
                Color::new(v.x.abs(), v.y.abs(), v.length())
            }
        }
    }
}

/// Nearest-neighbour resample of the selected view into an RGBA8 buffer of
/// `out_w * out_h` pixels.
pub fn rasterize(
    sim: &Simulation,
    camera: &[Color],
    mode: ViewMode,
    out_w: usize,
    out_h: usize,
    out: &mut Vec<u8>,
) {
    resample(sim.width(), sim.height(), out_w, out_h, out, |i| {
        mode.sample(sim, camera, i)
    });
}

/// Same as [`rasterize`] for a plain bottom-up color buffer.
pub fn rasterize_colors(
    colors: &[Color],
    width: usize,
    height: usize,
    out_w: usize,
    out_h: usize,
    out: &mut Vec<u8>,
) {
    let (width, height) = if colors.len() == width * height {
        (width, height)
    } else {
        (0, 0)
    };
    resample(width, height, out_w, out_h, out, |i| colors[i]);
}

fn resample(
    w: usize,
    h: usize,
    out_w: usize,
    out_h: usize,
    out: &mut Vec<u8>,
    color_at: impl Fn(usize) -> Color,
) {
    out.clear();
    out.resize(out_w * out_h * 4, 0);
    if w == 0 || h == 0 || out_w == 0 || out_h == 0 {
        return;
    }

    for oy in 0..out_h {
        // Output rows go top down, grid rows bottom up.
        let y = h - 1 - (oy * h / out_h).min(h - 1);
        for ox in 0..out_w {
            let x = (ox * w / out_w).min(w - 1);
            let [r, g, b] = color_at(x + y * w).to_rgb8();
            let o = (ox + oy * out_w) * 4;
            out[o..o + 4].copy_from_slice(&[r, g, b, 255]);
        }
    }
}
