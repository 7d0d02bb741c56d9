use crate::sound::{ClipRef, Instrument, Timbre};
use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use ringbuf::traits::{Consumer as _, Producer as _, Split as _};
use ringbuf::HeapRb;
use std::f32::consts::{FRAC_PI_4, TAU};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host side of voice playback. Slots are owned by the voice pool; the sink
/// only follows its instructions.
pub trait AudioSink {
    fn play(&mut self, slot: usize, clip: ClipRef, volume: f32, pitch: f32, pan: f32);
    fn stop(&mut self, slot: usize);
    fn set_volume(&mut self, slot: usize, volume: f32);
    fn set_pitch(&mut self, slot: usize, pitch: f32);
    fn set_pan(&mut self, slot: usize, pan: f32);
}

/// Sink for `--mute` and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentAudio;

impl AudioSink for SilentAudio {
    fn play(&mut self, _slot: usize, _clip: ClipRef, _volume: f32, _pitch: f32, _pan: f32) {}
    fn stop(&mut self, _slot: usize) {}
    fn set_volume(&mut self, _slot: usize, _volume: f32) {}
    fn set_pitch(&mut self, _slot: usize, _pitch: f32) {}
    fn set_pan(&mut self, _slot: usize, _pan: f32) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceCommand {
    Play {
        slot: usize,
        clip: ClipRef,
        volume: f32,
        pitch: f32,
        pan: f32,
    },
    Stop { slot: usize },
    Volume { slot: usize, value: f32 },
    Pitch { slot: usize, value: f32 },
    Pan { slot: usize, value: f32 },
}

const CLIP_SECONDS: f32 = 1.5;
// C0
const BASE_HZ: f32 = 16.3516;

/// Mono clips indexed by instrument, then octave. Each clip is the
/// instrument's C of that octave; pitch shifts it within the octave.
#[derive(Clone, Default)]
pub struct ClipBank {
    clips: Vec<Vec<Arc<[f32]>>>,
}

impl ClipBank {
    pub fn synthesize(instruments: &[Instrument], sample_rate_hz: u32) -> Self {
        let clips = instruments
            .iter()
            .map(|inst| {
                (0..inst.octaves)
                    .map(|octave| {
                        let freq = BASE_HZ * 2f32.powi(octave as i32);
                        synth_clip(inst.timbre, freq, sample_rate_hz)
                    })
                    .collect()
            })
            .collect();
        Self { clips }
    }

    pub fn get(&self, clip: ClipRef) -> Option<&Arc<[f32]>> {
        self.clips.get(clip.instrument)?.get(clip.octave)
    }

    pub fn len(&self) -> usize {
        self.clips.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn synth_clip(timbre: Timbre, freq: f32, sample_rate_hz: u32) -> Arc<[f32]> {
    let sr = sample_rate_hz.max(1) as f32;
    let nyquist = sr * 0.5;
    let len = (CLIP_SECONDS * sr) as usize;

    // (frequency ratio, amplitude) partials and exponential decay rate.
    let (partials, decay): (&[(f32, f32)], f32) = match timbre {
        Timbre::Sine => (&[(1.0, 1.0)], 3.0),
        Timbre::Pluck => (&[(1.0, 1.0), (2.0, 0.5), (3.0, 0.25), (4.0, 0.12)], 6.0),
        Timbre::Glass => (&[(1.0, 1.0), (2.76, 0.5), (5.4, 0.25)], 2.0),
        Timbre::Pad => (&[(1.0, 1.0), (2.0, 0.5), (3.0, 0.25)], 1.0),
        Timbre::Marimba => (&[(1.0, 1.0), (4.0, 0.3), (9.9, 0.1)], 8.0),
        Timbre::Reed => (&[(1.0, 1.0), (3.0, 0.33), (5.0, 0.2), (7.0, 0.14)], 2.0),
    };
    let norm: f32 = partials.iter().map(|(_, a)| a).sum();

    (0..len)
        .map(|n| {
            let t = n as f32 / sr;
            let mut v = 0.0;
            for &(ratio, amp) in partials {
                let f = freq * ratio;
                if f < nyquist {
                    v += amp * (TAU * f * t).sin();
                }
            }
            let attack = match timbre {
                Timbre::Pad => (t / 0.08).min(1.0),
                _ => (t / 0.002).min(1.0),
            };
            v / norm * attack * (-decay * t).exp()
        })
        .collect()
}

#[derive(Clone, Default)]
struct MixVoice {
    clip: Option<Arc<[f32]>>,
    pos: f32,
    volume: f32,
    pitch: f32,
    pan: f32,
    target_volume: f32,
    target_pitch: f32,
    target_pan: f32,
}

/// Audio callback state. Owned by the cpal stream closure.
struct Mixer {
    bank: ClipBank,
    voices: Vec<MixVoice>,
    smooth: f32,
}

impl Mixer {
    fn new(bank: ClipBank, voices: usize, sample_rate_hz: u32) -> Self {
        // ~5 ms one-pole smoothing for volume, pitch and pan.
        let smooth = 1.0 - (-1.0 / (0.005 * sample_rate_hz.max(1) as f32)).exp();
        Self {
            bank,
            voices: vec![MixVoice::default(); voices],
            smooth,
        }
    }

    fn apply(&mut self, cmd: VoiceCommand) {
        match cmd {
            VoiceCommand::Play {
                slot,
                clip,
                volume,
                pitch,
                pan,
            } => {
                let Some(voice) = self.voices.get_mut(slot) else {
                    return;
                };
                let Some(data) = self.bank.get(clip) else {
                    // Unknown clip: the note is simply not heard.
                    voice.clip = None;
                    return;
                };
                *voice = MixVoice {
                    clip: Some(Arc::clone(data)),
                    pos: 0.0,
                    volume,
                    pitch,
                    pan,
                    target_volume: volume,
                    target_pitch: pitch,
                    target_pan: pan,
                };
            }
            VoiceCommand::Stop { slot } => {
                if let Some(voice) = self.voices.get_mut(slot) {
                    voice.clip = None;
                }
            }
            VoiceCommand::Volume { slot, value } => {
                if let Some(voice) = self.voices.get_mut(slot) {
                    voice.target_volume = value;
                }
            }
            VoiceCommand::Pitch { slot, value } => {
                if let Some(voice) = self.voices.get_mut(slot) {
                    voice.target_pitch = value;
                }
            }
            VoiceCommand::Pan { slot, value } => {
                if let Some(voice) = self.voices.get_mut(slot) {
                    voice.target_pan = value;
                }
            }
        }
    }

    fn next_frame(&mut self) -> (f32, f32) {
        let k = self.smooth;
        let (mut left, mut right) = (0.0f32, 0.0f32);
        for voice in &mut self.voices {
            let Some(clip) = voice.clip.as_ref() else {
                continue;
            };
            let idx = voice.pos as usize;
            if idx + 1 >= clip.len() {
                voice.clip = None;
                continue;
            }
            let frac = voice.pos - idx as f32;
            let s = clip[idx] + (clip[idx + 1] - clip[idx]) * frac;

            voice.volume += (voice.target_volume - voice.volume) * k;
            voice.pitch += (voice.target_pitch - voice.pitch) * k;
            voice.pan += (voice.target_pan - voice.pan) * k;

            let angle = (voice.pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
            let v = s * voice.volume;
            left += v * angle.cos();
            right += v * angle.sin();
            voice.pos += voice.pitch.max(0.0);
        }
        (soft_clip(left), soft_clip(right))
    }
}

fn soft_clip(v: f32) -> f32 {
    (v * 0.7).tanh()
}

fn write_frames<T: SizedSample + FromSample<f32>>(
    data: &mut [T],
    channels: usize,
    mixer: &mut Mixer,
    commands: &mut ringbuf::HeapCons<VoiceCommand>,
    muted: &AtomicBool,
) {
    while let Some(cmd) = commands.try_pop() {
        mixer.apply(cmd);
    }
    let silent = muted.load(Ordering::Relaxed);
    for frame in data.chunks_mut(channels.max(1)) {
        let (l, r) = if silent { (0.0, 0.0) } else { mixer.next_frame() };
        match frame {
            [mono] => *mono = T::from_sample((l + r) * 0.5),
            [a, b, rest @ ..] => {
                *a = T::from_sample(l);
                *b = T::from_sample(r);
                for s in rest {
                    *s = T::from_sample(0.0);
                }
            }
            [] => {}
        }
    }
}

pub fn list_output_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .context("enumerate output devices")?;

    let mut out = io::stdout();
    writeln!(out, "Output devices:")?;
    for dev in devices {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        writeln!(out, "  - {}", name)?;
    }
    Ok(())
}

fn select_output_device(
    host: &cpal::Host,
    device_query: Option<&str>,
) -> anyhow::Result<cpal::Device> {
    let devices = host
        .output_devices()
        .context("enumerate output devices")?
        .collect::<Vec<_>>();

    let want = device_query.map(|s| s.to_lowercase());
    if let Some(want) = want.as_deref() {
        if let Some(dev) = devices.iter().find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(want))
                .unwrap_or(false)
        }) {
            return Ok(dev.clone());
        }
        return Err(anyhow!("no output device matching: {want}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("no default output device found"))
}

/// Voice playback on a cpal output stream. Commands cross to the audio
/// callback through a lock-free queue.
pub struct CpalAudio {
    _stream: cpal::Stream,
    commands: ringbuf::HeapProd<VoiceCommand>,
    muted: Arc<AtomicBool>,
    dropped: u64,
    pub sample_rate_hz: u32,
}

impl CpalAudio {
    pub fn new(
        device_query: Option<&str>,
        instruments: &[Instrument],
        voices: usize,
    ) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = select_output_device(&host, device_query)?;
        let supported = device
            .default_output_config()
            .context("get default output config")?;
        let sample_rate_hz = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let bank = ClipBank::synthesize(instruments, sample_rate_hz);
        log::info!(
            "audio: {} Hz, {} channels, {} clips",
            sample_rate_hz,
            channels,
            bank.len()
        );
        let mut mixer = Mixer::new(bank, voices, sample_rate_hz);

        // Several commands per voice per step, with headroom for catch-up.
        let rb = HeapRb::<VoiceCommand>::new(voices.max(1) * 64);
        let (prod, mut cons) = rb.split();

        let muted = Arc::new(AtomicBool::new(false));
        let muted_for_cb = Arc::clone(&muted);
        let err_fn = |err| log::warn!("audio stream error: {err}");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    write_frames(data, channels, &mut mixer, &mut cons, &muted_for_cb)
                },
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _| {
                    write_frames(data, channels, &mut mixer, &mut cons, &muted_for_cb)
                },
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_output_stream(
                &config,
                move |data: &mut [u16], _| {
                    write_frames(data, channels, &mut mixer, &mut cons, &muted_for_cb)
                },
                err_fn,
                None,
            )?,
            fmt => return Err(anyhow!("unsupported sample format: {fmt:?}")),
        };

        stream.play().context("start output stream")?;

        Ok(Self {
            _stream: stream,
            commands: prod,
            muted,
            dropped: 0,
            sample_rate_hz,
        })
    }

    fn send(&mut self, cmd: VoiceCommand) {
        if self.commands.try_push(cmd).is_err() {
            self.dropped += 1;
        }
    }
}

impl AudioSink for CpalAudio {
    fn play(&mut self, slot: usize, clip: ClipRef, volume: f32, pitch: f32, pan: f32) {
        self.send(VoiceCommand::Play {
            slot,
            clip,
            volume,
            pitch,
            pan,
        });
    }

    fn stop(&mut self, slot: usize) {
        self.send(VoiceCommand::Stop { slot });
    }

    fn set_volume(&mut self, slot: usize, volume: f32) {
        self.send(VoiceCommand::Volume { slot, value: volume });
    }

    fn set_pitch(&mut self, slot: usize, pitch: f32) {
        self.send(VoiceCommand::Pitch { slot, value: pitch });
    }

    fn set_pan(&mut self, slot: usize, pan: f32) {
        self.send(VoiceCommand::Pan { slot, value: pan });
    }
}

impl Drop for CpalAudio {
    fn drop(&mut self) {
        self.muted.store(true, Ordering::Relaxed);
        if self.dropped > 0 {
            log::warn!("audio: {} voice commands dropped (queue full)", self.dropped);
        }
    }
}
