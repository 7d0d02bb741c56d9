use crate::color::{clamp01, lerp, Color};

/// Beat position inside the loop for a musical time given in minutes.
pub fn playhead_beat(minutes: f64, tempo: f32, beats: u32) -> f64 {
    if beats == 0 {
        return 0.0;
    }
    (minutes * tempo as f64).rem_euclid(beats as f64)
}

/// Grid column under the playhead: `beat * width / beats`, floored.
pub fn playhead_column(minutes: f64, tempo: f32, beats: u32, width: usize) -> usize {
    if beats == 0 || width == 0 {
        return 0;
    }
    let beat = playhead_beat(minutes, tempo, beats);
    let column = (beat * width as f64 / beats as f64).floor() as usize;
    column.min(width - 1)
}

/// Slowly adapting global tint. Hue and saturation follow the colors the
/// playhead scans; value stays where the configured color put it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cursor {
    color: Color,
    hue: f32,
    saturation: f32,
    value: f32,
}

impl Cursor {
    pub fn new(color: Color) -> Self {
        let (hue, saturation, value) = color.to_hsv();
        Self {
            color,
            hue,
            saturation,
            value,
        }
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn hue(&self) -> f32 {
        self.hue
    }

    pub fn saturation(&self) -> f32 {
        self.saturation
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn adapt(&mut self, sum: Color, rate: f32, dt: f32) {
        let (hue, saturation, _) = sum.finite().to_hsv();
        let t = clamp01(rate * dt);
        if hue.is_finite() && saturation.is_finite() {
            self.hue = lerp_hue(self.hue, hue, t);
            self.saturation = lerp(self.saturation, saturation, t);
        }
        self.color = Color::from_hsv(self.hue, self.saturation, self.value)
            .finite()
            .clamp(0.0, 5.0);
    }
}

/// Interpolates along the shorter arc of the hue circle.
fn lerp_hue(from: f32, to: f32, t: f32) -> f32 {
    let mut d = (to - from).rem_euclid(1.0);
    if d > 0.5 {
        d -= 1.0;
    }
    (from + d * t).rem_euclid(1.0)
}
