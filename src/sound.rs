//! Turns playhead pixels into voice assignments.
//!
//! The mapper runs inside the simulation step and only produces
//! [`SoundSlot`] candidates. The [`VoicePool`] runs on the cooperative thread,
//! enforces the polyphony budget and walks each voice through its envelope.

use crate::audio::AudioSink;
use crate::color::{lerp, Color};
use crate::settings::{InstrumentMapping, MusicSettings};

pub const PENTATONIC: [i32; 5] = [0, 3, 5, 7, 10];

/// Rounds `note` to the nearest pitch class in `scale`, keeping its octave.
/// Ties go to the earlier scale entry.
pub fn snap(note: i32, scale: &[i32]) -> i32 {
    let source = note.rem_euclid(12);
    let target = scale
        .iter()
        .copied()
        .min_by_key(|n| (n - source).abs())
        .unwrap_or(source);
    note - source + target
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timbre {
    Sine,
    Pluck,
    Glass,
    Pad,
    Marimba,
    Reed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instrument {
    pub name: &'static str,
    /// Color this instrument answers to under [`InstrumentMapping::NearestColor`].
    pub reference: Color,
    pub timbre: Timbre,
    /// One clip per octave, starting at octave 0.
    pub octaves: usize,
}

pub fn default_instruments() -> Vec<Instrument> {
    let voices = [
        ("bell", Timbre::Sine),
        ("pluck", Timbre::Pluck),
        ("glass", Timbre::Glass),
        ("pad", Timbre::Pad),
        ("marimba", Timbre::Marimba),
        ("reed", Timbre::Reed),
    ];
    let n = voices.len();
    voices
        .into_iter()
        .enumerate()
        .map(|(i, (name, timbre))| Instrument {
            name,
            reference: Color::from_hsv(i as f32 / n as f32, 1.0, 1.0),
            timbre,
            octaves: 10,
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClipRef {
    pub instrument: usize,
    pub octave: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoundSlot {
    pub clip: ClipRef,
    /// Snapped semitone the clip and pitch were derived from.
    pub note: i32,
    pub volume: f32,
    pub pitch: f32,
    pub pan: f32,
}

#[derive(Clone, Debug)]
pub struct SoundMapper {
    instruments: Vec<Instrument>,
    settings: MusicSettings,
}

impl SoundMapper {
    pub fn new(instruments: Vec<Instrument>, settings: MusicSettings) -> Self {
        Self {
            instruments,
            settings,
        }
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Semitone for row `y`. Saturated colors use the whole octave range,
    /// grey ones are squeezed toward the bottom by `saturate`.
    pub fn note_for(&self, y: usize, height: usize, saturation: f32) -> i32 {
        let ratio = y as f32 / height.max(1) as f32
            * (1.0 - self.settings.saturate * (1.0 - saturation));
        let (lo, hi) = self.settings.octaves;
        let semitone = lerp(lo as f32 * 12.0, hi as f32 * 12.0, ratio);
        snap(semitone.floor() as i32, &PENTATONIC)
    }

    pub fn instrument_for(&self, color: Color, hue: f32) -> Option<usize> {
        let n = self.instruments.len();
        if n == 0 {
            return None;
        }
        match self.settings.mapping {
            InstrumentMapping::HueBucket => {
                let idx = (hue * n as f32).floor();
                (idx >= 0.0 && (idx as usize) < n).then_some(idx as usize)
            }
            InstrumentMapping::NearestColor => self
                .instruments
                .iter()
                .enumerate()
                .min_by(|a, b| {
                    color
                        .distance_sq(a.1.reference)
                        .total_cmp(&color.distance_sq(b.1.reference))
                })
                .map(|(i, _)| i),
        }
    }

    /// Candidate for the pixel at `(x, y)`, or `None` when it is too dark or
    /// no clip exists for the resulting instrument and octave.
    pub fn map(&self, x: usize, y: usize, width: usize, height: usize, color: Color) -> Option<SoundSlot> {
        let (hue, saturation, value) = color.finite().to_hsv();
        if value < self.settings.threshold {
            return None;
        }

        let note = self.note_for(y, height, saturation);
        let instrument = self.instrument_for(color, hue)?;
        let octave = usize::try_from(note.div_euclid(12)).ok()?;
        if octave >= self.instruments[instrument].octaves {
            return None;
        }

        Some(SoundSlot {
            clip: ClipRef { instrument, octave },
            note,
            volume: (value * value * self.settings.attenuate).clamp(0.0, 1.0),
            pitch: 2f32.powf(note.rem_euclid(12) as f32 / 12.0),
            pan: (x as f32 / width.max(1) as f32).clamp(0.0, 1.0) * 2.0 - 1.0,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub attack: f32,
    pub hold: f32,
    pub release: f32,
}

impl From<&MusicSettings> for Envelope {
    fn from(m: &MusicSettings) -> Self {
        Self {
            attack: m.attack,
            hold: m.duration,
            release: m.fade,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Attack,
    Hold,
    Release,
}

#[derive(Clone, Copy, Debug)]
struct Voice {
    state: VoiceState,
    elapsed: f32,
    sound: Option<SoundSlot>,
}

impl Voice {
    const IDLE: Self = Self {
        state: VoiceState::Idle,
        elapsed: 0.0,
        sound: None,
    };

    fn volume(&self) -> f32 {
        self.sound.map(|s| s.volume).unwrap_or(0.0)
    }
}

/// Fixed set of playback slots. Idle slots live on a stack; every slot is
/// either on the stack or in a non-idle state.
#[derive(Clone, Debug)]
pub struct VoicePool {
    voices: Vec<Voice>,
    idle: Vec<usize>,
    envelope: Envelope,
}

impl VoicePool {
    pub fn new(capacity: usize, envelope: Envelope) -> Self {
        Self {
            voices: vec![Voice::IDLE; capacity],
            // Reversed so slot 0 is handed out first.
            idle: (0..capacity).rev().collect(),
            envelope,
        }
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    pub fn active(&self) -> usize {
        self.voices.len() - self.idle.len()
    }

    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    pub fn state(&self, slot: usize) -> Option<VoiceState> {
        self.voices.get(slot).map(|v| v.state)
    }

    pub fn sound(&self, slot: usize) -> Option<SoundSlot> {
        self.voices.get(slot).and_then(|v| v.sound)
    }

    /// Starts the loudest candidates. Without an idle slot a candidate may
    /// steal the quietest playing voice if it is louder; everything else is
    /// dropped. Drains `candidates`.
    pub fn dispatch(&mut self, candidates: &mut Vec<SoundSlot>, audio: &mut dyn AudioSink) {
        candidates.sort_by(|a, b| b.volume.total_cmp(&a.volume));

        for sound in candidates.iter().take(self.voices.len()) {
            let slot = match self.idle.pop() {
                Some(slot) => slot,
                None => {
                    let Some(victim) = self.quietest_below(sound.volume) else {
                        break;
                    };
                    audio.stop(victim);
                    victim
                }
            };
            self.start(slot, *sound, audio);
        }
        candidates.clear();
    }

    fn quietest_below(&self, volume: f32) -> Option<usize> {
        self.voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.state != VoiceState::Idle && v.volume() < volume)
            .min_by(|a, b| a.1.volume().total_cmp(&b.1.volume()))
            .map(|(i, _)| i)
    }

    fn start(&mut self, slot: usize, sound: SoundSlot, audio: &mut dyn AudioSink) {
        let voice = &mut self.voices[slot];
        voice.sound = Some(sound);
        voice.elapsed = 0.0;
        let initial = if self.envelope.attack > 0.0 {
            voice.state = VoiceState::Attack;
            0.0
        } else {
            voice.state = VoiceState::Hold;
            sound.volume
        };
        audio.play(slot, sound.clip, initial, sound.pitch, sound.pan);
    }

    /// Moves every voice along its envelope by one fixed step.
    pub fn advance(&mut self, dt: f32, audio: &mut dyn AudioSink) {
        let env = self.envelope;
        for slot in 0..self.voices.len() {
            let voice = &mut self.voices[slot];
            if voice.state == VoiceState::Idle {
                continue;
            }
            voice.elapsed += dt;
            let volume = voice.volume();

            match voice.state {
                VoiceState::Attack if voice.elapsed >= env.attack => {
                    voice.state = VoiceState::Hold;
                    voice.elapsed = 0.0;
                    audio.set_volume(slot, volume);
                }
                VoiceState::Attack => {
                    audio.set_volume(slot, volume * voice.elapsed / env.attack);
                }
                VoiceState::Hold if voice.elapsed >= env.hold => {
                    voice.state = VoiceState::Release;
                    voice.elapsed = 0.0;
                }
                VoiceState::Hold => {}
                VoiceState::Release if voice.elapsed >= env.release => {
                    *voice = Voice::IDLE;
                    audio.stop(slot);
                    self.idle.push(slot);
                }
                VoiceState::Release => {
                    audio.set_volume(slot, volume * (1.0 - voice.elapsed / env.release));
                }
                VoiceState::Idle => {}
            }
        }
    }

    /// Silences everything and returns all slots to the idle stack.
    pub fn stop_all(&mut self, audio: &mut dyn AudioSink) {
        for slot in 0..self.voices.len() {
            if self.voices[slot].state != VoiceState::Idle {
                self.voices[slot] = Voice::IDLE;
                audio.stop(slot);
                self.idle.push(slot);
            }
        }
    }
}
