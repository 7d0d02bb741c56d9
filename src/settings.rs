use crate::color::Color;
use crate::config::Config;
use std::fmt;
use std::path::Path;

/// Inclusive `[min, max]` pair used for randomized and ratio-driven parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub min: f32,
    pub max: f32,
}

impl Span {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn lerp(self, t: f32) -> f32 {
        crate::color::lerp(self.min, self.max, t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    pub threshold: f32,
    pub contrast: f32,
    pub jitter: f32,
    /// Read-color threshold a pixel must reach to belong to a shape.
    pub shape: f32,
    pub inside: f32,
    pub border: f32,
    pub unite: f32,
    pub polarize_pre: f32,
    pub polarize_post: f32,
    pub multiply_pre: f32,
    pub multiply_post: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            contrast: 5.0,
            jitter: 3.0,
            shape: 0.5,
            inside: 0.0,
            border: 1.0,
            unite: 0.5,
            polarize_pre: 0.0,
            polarize_post: 0.0,
            multiply_pre: 1.0,
            multiply_post: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleSettings {
    pub fade: f32,
    pub friction: f32,
    pub power: f32,
    pub forward: f32,
    pub shine: f32,
    pub shift: f32,
    pub polarize: f32,
    pub speed: Span,
    pub count: Span,
    pub radius: Span,
}

impl Default for ParticleSettings {
    fn default() -> Self {
        Self {
            fade: 5.0,
            friction: 5.0,
            power: 5.0,
            forward: 0.75,
            shine: 0.75,
            shift: 0.25,
            polarize: 0.0,
            speed: Span::new(5.0, 10.0),
            count: Span::new(5.0, 25.0),
            radius: Span::new(1.0, 3.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorSettings {
    pub color: Color,
    pub blend: f32,
    /// Columns behind the playhead that still show a fading bar; 0 keeps the
    /// bar on the playhead column only.
    pub trail: f32,
    pub fade: f32,
    pub adapt: f32,
}

impl Default for CursorSettings {
    fn default() -> Self {
        Self {
            color: Color::new(1.0, 0.92, 0.016),
            blend: 0.25,
            trail: 0.0,
            fade: 5.0,
            adapt: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentMapping {
    HueBucket,
    NearestColor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicSettings {
    pub tempo: f32,
    pub beats: u32,
    pub voices: usize,
    pub threshold: f32,
    pub attack: f32,
    pub duration: f32,
    pub fade: f32,
    pub saturate: f32,
    pub attenuate: f32,
    pub octaves: (u8, u8),
    pub mapping: InstrumentMapping,
}

impl Default for MusicSettings {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            beats: 16,
            voices: 16,
            threshold: 0.1,
            attack: 0.01,
            duration: 0.1,
            fade: 0.1,
            saturate: 0.1,
            attenuate: 1.0,
            octaves: (4, 8),
            mapping: InstrumentMapping::HueBucket,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Settings {
    pub camera: CameraSettings,
    pub particle: ParticleSettings,
    pub cursor: CursorSettings,
    pub music: MusicSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsError {
    Io(String),
    Parse { line: usize, message: String },
    UnknownKey { line: usize, key: String },
    InvalidValue { field: &'static str, message: String },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Parse { line, message } => write!(f, "parse error at line {line}: {message}"),
            Self::UnknownKey { line, key } => write!(f, "unknown setting at line {line}: {key}"),
            Self::InvalidValue { field, message } => {
                write!(f, "invalid value for {field}: {message}")
            }
        }
    }
}

impl std::error::Error for SettingsError {}

impl Settings {
    /// Missing files fall back to defaults, like the runtime prefs do.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = match std::fs::read_to_string(path) {
            Ok(v) => v,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(SettingsError::Io(err.to_string())),
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, SettingsError> {
        let mut s = Self::default();
        for (line_idx, raw) in text.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key_raw, value_raw)) = line.split_once('=') else {
                return Err(SettingsError::Parse {
                    line: line_no,
                    message: "expected <group>.<key> = <value>".to_string(),
                });
            };
            let key = key_raw.trim();
            let v = Value {
                raw: value_raw.trim(),
                line: line_no,
            };
            match key {
                "camera.threshold" => s.camera.threshold = v.float()?,
                "camera.contrast" => s.camera.contrast = v.float()?,
                "camera.jitter" => s.camera.jitter = v.float()?,
                "camera.shape" => s.camera.shape = v.float()?,
                "camera.inside" => s.camera.inside = v.float()?,
                "camera.border" => s.camera.border = v.float()?,
                "camera.unite" => s.camera.unite = v.float()?,
                "camera.polarize_pre" => s.camera.polarize_pre = v.float()?,
                "camera.polarize_post" => s.camera.polarize_post = v.float()?,
                "camera.multiply_pre" => s.camera.multiply_pre = v.float()?,
                "camera.multiply_post" => s.camera.multiply_post = v.float()?,
                "particle.fade" => s.particle.fade = v.float()?,
                "particle.friction" => s.particle.friction = v.float()?,
                "particle.power" => s.particle.power = v.float()?,
                "particle.forward" => s.particle.forward = v.float()?,
                "particle.shine" => s.particle.shine = v.float()?,
                "particle.shift" => s.particle.shift = v.float()?,
                "particle.polarize" => s.particle.polarize = v.float()?,
                "particle.speed" => s.particle.speed = v.span()?,
                "particle.count" => s.particle.count = v.span()?,
                "particle.radius" => s.particle.radius = v.span()?,
                "cursor.color" => s.cursor.color = v.color()?,
                "cursor.blend" => s.cursor.blend = v.float()?,
                "cursor.trail" => s.cursor.trail = v.float()?,
                "cursor.fade" => s.cursor.fade = v.float()?,
                "cursor.adapt" => s.cursor.adapt = v.float()?,
                "music.tempo" => s.music.tempo = v.float()?,
                "music.beats" => s.music.beats = v.int()?,
                "music.voices" => s.music.voices = v.int()?,
                "music.threshold" => s.music.threshold = v.float()?,
                "music.attack" => s.music.attack = v.float()?,
                "music.duration" => s.music.duration = v.float()?,
                "music.fade" => s.music.fade = v.float()?,
                "music.saturate" => s.music.saturate = v.float()?,
                "music.attenuate" => s.music.attenuate = v.float()?,
                "music.octaves" => s.music.octaves = v.octaves()?,
                "music.mapping" => s.music.mapping = v.mapping()?,
                _ => {
                    return Err(SettingsError::UnknownKey {
                        line: line_no,
                        key: key.to_string(),
                    });
                }
            }
        }
        s.validate()?;
        Ok(s)
    }

    /// Command-line flags win over the settings file.
    pub fn apply_overrides(&mut self, cfg: &Config) -> Result<(), SettingsError> {
        if let Some(tempo) = cfg.tempo {
            self.music.tempo = tempo;
        }
        if let Some(beats) = cfg.beats {
            self.music.beats = beats;
        }
        if let Some(voices) = cfg.voices {
            self.music.voices = voices;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let c = &self.camera;
        check("camera.threshold", c.threshold, 0.0, 1.0)?;
        check("camera.contrast", c.contrast, 0.01, 20.0)?;
        check("camera.jitter", c.jitter, 0.0, 1000.0)?;
        check("camera.shape", c.shape, 0.0, 1.0)?;
        check("camera.inside", c.inside, -1.0, 1.0)?;
        check("camera.border", c.border, -1.0, 1.0)?;
        check("camera.unite", c.unite, 0.0, 1.0)?;
        check("camera.polarize_pre", c.polarize_pre, 0.0, 1.0)?;
        check("camera.polarize_post", c.polarize_post, 0.0, 1.0)?;
        check("camera.multiply_pre", c.multiply_pre, 0.0, 3.0)?;
        check("camera.multiply_post", c.multiply_post, 0.0, 3.0)?;

        let p = &self.particle;
        check("particle.fade", p.fade, 0.0, 1000.0)?;
        check("particle.friction", p.friction, 0.0, 1000.0)?;
        check("particle.power", p.power, 0.0, 100.0)?;
        check("particle.forward", p.forward, 0.0, 1.0)?;
        check("particle.shine", p.shine, 0.0, 1.0)?;
        check("particle.shift", p.shift, 0.0, 1.0)?;
        check("particle.polarize", p.polarize, 0.0, 1.0)?;
        check_span("particle.speed", p.speed, 0.0, 1000.0)?;
        check_span("particle.count", p.count, 0.0, 10_000.0)?;
        check_span("particle.radius", p.radius, 0.0, 1000.0)?;

        let k = &self.cursor;
        for channel in [k.color.r, k.color.g, k.color.b] {
            check("cursor.color", channel, 0.0, 5.0)?;
        }
        check("cursor.blend", k.blend, 0.0, 1.0)?;
        check("cursor.trail", k.trail, 0.0, 100.0)?;
        check("cursor.fade", k.fade, 0.0, 10.0)?;
        check("cursor.adapt", k.adapt, 0.0, 10.0)?;

        let m = &self.music;
        check("music.tempo", m.tempo, 1.0, 999.0)?;
        if m.beats == 0 {
            return Err(invalid("music.beats", "must be at least 1"));
        }
        if m.voices == 0 || m.voices > 256 {
            return Err(invalid("music.voices", "must be within 1..=256"));
        }
        check("music.threshold", m.threshold, 0.0, 1.0)?;
        check("music.attack", m.attack, 0.0, 10.0)?;
        check("music.duration", m.duration, 0.0, 60.0)?;
        check("music.fade", m.fade, 0.0, 60.0)?;
        check("music.saturate", m.saturate, 0.0, 1.0)?;
        check("music.attenuate", m.attenuate, 0.0, 4.0)?;
        if m.octaves.0 > m.octaves.1 || m.octaves.1 > 10 {
            return Err(invalid("music.octaves", "expected min <= max <= 10"));
        }
        Ok(())
    }
}

struct Value<'a> {
    raw: &'a str,
    line: usize,
}

impl Value<'_> {
    fn error(&self, message: &str) -> SettingsError {
        SettingsError::Parse {
            line: self.line,
            message: format!("{message} (got `{}`)", self.raw),
        }
    }

    fn float(&self) -> Result<f32, SettingsError> {
        self.raw
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.error("expected a number"))
    }

    fn int<T: TryFrom<u64>>(&self) -> Result<T, SettingsError> {
        let n = self
            .raw
            .parse::<u64>()
            .map_err(|_| self.error("expected a non-negative integer"))?;
        T::try_from(n).map_err(|_| self.error("integer out of range"))
    }

    fn octaves(&self) -> Result<(u8, u8), SettingsError> {
        let parts = self
            .raw
            .split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| self.error("expected whole octave numbers"))?;
        match parts.as_slice() {
            [min, max] => Ok((*min, *max)),
            _ => Err(self.error("expected <min>,<max>")),
        }
    }

    fn list(&self) -> Result<Vec<f32>, SettingsError> {
        self.raw
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f32>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| self.error("expected comma separated numbers"))
            })
            .collect()
    }

    fn span(&self) -> Result<Span, SettingsError> {
        match self.list()?.as_slice() {
            [min, max] => Ok(Span::new(*min, *max)),
            _ => Err(self.error("expected <min>,<max>")),
        }
    }

    fn color(&self) -> Result<Color, SettingsError> {
        match self.list()?.as_slice() {
            [r, g, b] => Ok(Color::new(*r, *g, *b)),
            _ => Err(self.error("expected <r>,<g>,<b>")),
        }
    }

    fn mapping(&self) -> Result<InstrumentMapping, SettingsError> {
        match self.raw.to_ascii_lowercase().as_str() {
            "hue" | "hue_bucket" => Ok(InstrumentMapping::HueBucket),
            "nearest" | "nearest_color" => Ok(InstrumentMapping::NearestColor),
            _ => Err(self.error("expected hue or nearest")),
        }
    }
}

fn invalid(field: &'static str, message: &str) -> SettingsError {
    SettingsError::InvalidValue {
        field,
        message: message.to_string(),
    }
}

fn check(field: &'static str, v: f32, lo: f32, hi: f32) -> Result<(), SettingsError> {
    if v.is_finite() && (lo..=hi).contains(&v) {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue {
            field,
            message: format!("{v} is outside {lo}..={hi}"),
        })
    }
}

fn check_span(field: &'static str, span: Span, lo: f32, hi: f32) -> Result<(), SettingsError> {
    check(field, span.min, lo, hi)?;
    check(field, span.max, lo, hi)?;
    if span.min > span.max {
        return Err(invalid(field, "min must not exceed max"));
    }
    Ok(())
}
