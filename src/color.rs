//! Linear float color with the handful of operations the simulation needs:
//! channel arithmetic, HSV conversion, polarize, hue shift and finite guards.

use glam::Vec2;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        let q = |v: f32| (clamp01(v) * 255.0 + 0.5) as u8;
        [q(self.r), q(self.g), q(self.b)]
    }

    pub fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Self::new(f(self.r), f(self.g), f(self.b))
    }

    /// Linear interpolation with `t` clamped to [0, 1].
    pub fn lerp(self, other: Self, t: f32) -> Self {
        let t = clamp01(t);
        self + (other - self) * t
    }

    pub fn max_channel(self) -> f32 {
        self.r.max(self.g).max(self.b)
    }

    pub fn any_at_least(self, threshold: f32) -> bool {
        self.r >= threshold || self.g >= threshold || self.b >= threshold
    }

    pub fn powf(self, exponent: f32) -> Self {
        self.map(|v| v.powf(exponent))
    }

    pub fn clamp(self, lo: f32, hi: f32) -> Self {
        self.map(|v| v.clamp(lo, hi))
    }

    pub fn is_finite(self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }

    /// Replaces every non-finite channel with zero.
    pub fn finite(self) -> Self {
        self.map(|v| if v.is_finite() { v } else { 0.0 })
    }

    pub fn sum(self) -> f32 {
        self.r + self.g + self.b
    }

    pub fn distance_sq(self, other: Self) -> f32 {
        let d = self - other;
        d.r * d.r + d.g * d.g + d.b * d.b
    }

    pub fn polarize(self, amount: f32) -> Self {
        self.map(|v| polarize(v, amount))
    }

    /// Hue, saturation and value, hue in [0, 1). Value is the max channel and
    /// may exceed 1 for over-bright colors.
    pub fn to_hsv(self) -> (f32, f32, f32) {
        let max = self.max_channel();
        let min = self.r.min(self.g).min(self.b);
        let delta = max - min;
        let saturation = if max > 0.0 { delta / max } else { 0.0 };
        let hue = if delta <= 0.0 {
            0.0
        } else if max == self.r {
            ((self.g - self.b) / delta).rem_euclid(6.0) / 6.0
        } else if max == self.g {
            ((self.b - self.r) / delta + 2.0) / 6.0
        } else {
            ((self.r - self.g) / delta + 4.0) / 6.0
        };
        (hue, saturation, max)
    }

    pub fn from_hsv(hue: f32, saturation: f32, value: f32) -> Self {
        let h = hue.rem_euclid(1.0) * 6.0;
        let sector = h.floor();
        let f = h - sector;
        let p = value * (1.0 - saturation);
        let q = value * (1.0 - saturation * f);
        let t = value * (1.0 - saturation * (1.0 - f));
        match sector as u32 % 6 {
            0 => Self::new(value, t, p),
            1 => Self::new(q, value, p),
            2 => Self::new(p, value, t),
            3 => Self::new(p, q, value),
            4 => Self::new(t, p, value),
            _ => Self::new(value, p, q),
        }
    }

    pub fn shift_hue(self, shift: f32) -> Self {
        let (h, s, v) = self.to_hsv();
        Self::from_hsv((h + shift).rem_euclid(1.0), s, v)
    }
}

impl Add for Color {
    type Output = Self;
    fn add(self, o: Self) -> Self {
        Self::new(self.r + o.r, self.g + o.g, self.b + o.b)
    }
}

impl AddAssign for Color {
    fn add_assign(&mut self, o: Self) {
        *self = *self + o;
    }
}

impl Sub for Color {
    type Output = Self;
    fn sub(self, o: Self) -> Self {
        Self::new(self.r - o.r, self.g - o.g, self.b - o.b)
    }
}

impl SubAssign for Color {
    fn sub_assign(&mut self, o: Self) {
        *self = *self - o;
    }
}

impl Mul<f32> for Color {
    type Output = Self;
    fn mul(self, k: f32) -> Self {
        Self::new(self.r * k, self.g * k, self.b * k)
    }
}

impl Div<f32> for Color {
    type Output = Self;
    fn div(self, k: f32) -> Self {
        Self::new(self.r / k, self.g / k, self.b / k)
    }
}

pub fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * clamp01(t)
}

/// Saturating S-curve around 0.5. `amount = 0` is a plain clamp, larger
/// amounts push values toward 0 and 1 without leaving [0, 1].
pub fn polarize(value: f32, amount: f32) -> f32 {
    let v = clamp01(value) * 2.0 - 1.0;
    let a = clamp01(amount);
    v / (2.0 - a + a * v.abs()) + 0.5
}

pub fn finite_vec2(v: Vec2) -> Vec2 {
    Vec2::new(
        if v.x.is_finite() { v.x } else { 0.0 },
        if v.y.is_finite() { v.y } else { 0.0 },
    )
}
