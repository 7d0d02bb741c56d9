//! Frame sources standing in for the camera.
//!
//! Sources are polled from the cooperative thread: [`FrameSource::request`]
//! asks for the next frame, [`FrameSource::poll`] copies it out once ready
//! and [`FrameSource::wait`] parks the thread between polls.

use crate::color::Color;
use anyhow::{anyhow, Context};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

pub const MIN_FRAME_SIDE: usize = 32;

/// Longest single wait on a stream before polling again.
const STREAM_WAIT: Duration = Duration::from_millis(50);

pub trait FrameSource {
    /// Fixed for the lifetime of the source.
    fn dimensions(&self) -> (usize, usize);

    /// Starts acquiring the next frame.
    fn request(&mut self);

    /// Copies the requested frame into `out` and returns true once it is
    /// ready; false means "not yet". An error means no frame will ever come.
    fn poll(&mut self, out: &mut [Color]) -> anyhow::Result<bool>;

    /// Called between polls that were not ready.
    fn wait(&mut self) {
        thread::yield_now();
    }

    fn name(&self) -> &str;
}

pub fn check_dimensions(width: usize, height: usize) -> anyhow::Result<()> {
    if width < MIN_FRAME_SIDE || height < MIN_FRAME_SIDE {
        return Err(anyhow!(
            "frame must be at least {MIN_FRAME_SIDE}x{MIN_FRAME_SIDE}, got {width}x{height}"
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Blob {
    pos: (f32, f32),
    vel: (f32, f32),
    radius: f32,
    color: Color,
}

/// Colored blobs drifting over a dark background. Every request advances the
/// pattern by one camera frame.
pub struct PatternSource {
    width: usize,
    height: usize,
    rate: f32,
    blobs: Vec<Blob>,
    pending: bool,
}

impl PatternSource {
    pub fn new(width: usize, height: usize, camera_rate: f32, seed: Option<u64>) -> anyhow::Result<Self> {
        check_dimensions(width, height)?;
        let mut rng = seed.map(fastrand::Rng::with_seed).unwrap_or_default();
        let (w, h) = (width as f32, height as f32);
        let blobs = (0..5)
            .map(|i| Blob {
                pos: (rng.f32() * w, rng.f32() * h),
                vel: ((rng.f32() - 0.5) * w * 0.2, (rng.f32() - 0.5) * h * 0.2),
                radius: (0.08 + rng.f32() * 0.1) * w.min(h),
                color: Color::from_hsv(i as f32 / 5.0, 0.8, 1.0),
            })
            .collect();
        Ok(Self {
            width,
            height,
            rate: camera_rate.max(1.0),
            blobs,
            pending: false,
        })
    }

    fn advance(&mut self) {
        let dt = 1.0 / self.rate;
        let (w, h) = (self.width as f32, self.height as f32);
        for blob in &mut self.blobs {
            blob.pos.0 += blob.vel.0 * dt;
            blob.pos.1 += blob.vel.1 * dt;
            if blob.pos.0 < 0.0 || blob.pos.0 >= w {
                blob.vel.0 = -blob.vel.0;
                blob.pos.0 = blob.pos.0.clamp(0.0, w - 1.0);
            }
            if blob.pos.1 < 0.0 || blob.pos.1 >= h {
                blob.vel.1 = -blob.vel.1;
                blob.pos.1 = blob.pos.1.clamp(0.0, h - 1.0);
            }
        }
    }

    fn draw(&self, out: &mut [Color]) {
        for (i, px) in out.iter_mut().enumerate() {
            let (x, y) = ((i % self.width) as f32, (i / self.width) as f32);
            let mut c = Color::new(0.05, 0.05, 0.08);
            for blob in &self.blobs {
                let dx = x - blob.pos.0;
                let dy = y - blob.pos.1;
                let d = (dx * dx + dy * dy).sqrt() / blob.radius;
                if d < 1.0 {
                    let falloff = 1.0 - d * d;
                    c += blob.color * falloff;
                }
            }
            *px = c.clamp(0.0, 1.0);
        }
    }
}

impl FrameSource for PatternSource {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn request(&mut self) {
        self.advance();
        self.pending = true;
    }

    fn poll(&mut self, out: &mut [Color]) -> anyhow::Result<bool> {
        if !self.pending {
            return Ok(false);
        }
        self.draw(out);
        self.pending = false;
        Ok(true)
    }

    fn name(&self) -> &str {
        "pattern"
    }
}

/// The same frame on every request.
pub struct StillSource {
    width: usize,
    height: usize,
    frame: Vec<Color>,
}

impl StillSource {
    pub fn new(width: usize, height: usize, frame: Vec<Color>) -> anyhow::Result<Self> {
        if frame.len() != width * height {
            return Err(anyhow!(
                "still frame has {} pixels, expected {}x{}",
                frame.len(),
                width,
                height
            ));
        }
        Ok(Self {
            width,
            height,
            frame,
        })
    }
}

impl FrameSource for StillSource {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn request(&mut self) {}

    fn poll(&mut self, out: &mut [Color]) -> anyhow::Result<bool> {
        out.copy_from_slice(&self.frame);
        Ok(true)
    }

    fn name(&self) -> &str {
        "still"
    }
}

#[derive(Default)]
struct Feed {
    frame: Option<Vec<Color>>,
    ended: bool,
}

/// Shared between the reader thread and the source. `arrived` is signalled
/// for every frame and once more when the reader exits.
#[derive(Default)]
struct Latest {
    feed: Mutex<Feed>,
    arrived: Condvar,
    received: AtomicU64,
}

impl Latest {
    fn publish(&self, frame: Vec<Color>) {
        if let Ok(mut feed) = self.feed.lock() {
            feed.frame = Some(frame);
        }
        self.received.fetch_add(1, Ordering::Relaxed);
        self.arrived.notify_all();
    }

    fn finish(&self) {
        if let Ok(mut feed) = self.feed.lock() {
            feed.ended = true;
        }
        self.arrived.notify_all();
    }
}

/// Raw RGB24 frames (`width * height * 3` bytes each) read on a background
/// thread from a file or stdin, e.g.
/// `ffmpeg -f v4l2 -i /dev/video0 -vf scale=128:72 -f rawvideo -pix_fmt rgb24 -`.
/// Only the most recent frame is kept; a poll is ready as soon as one frame
/// has arrived and returns the newest, repeating it while nothing newer comes
/// in (including after the stream ends). A stream that ends before its first
/// frame fails every poll.
pub struct StreamSource {
    width: usize,
    height: usize,
    label: String,
    latest: Arc<Latest>,
    stop: Arc<AtomicBool>,
    reader: Option<thread::JoinHandle<()>>,
}

impl StreamSource {
    /// `input` is a path, or `-` for stdin.
    pub fn open(input: &str, width: usize, height: usize) -> anyhow::Result<Self> {
        check_dimensions(width, height)?;
        let reader: Box<dyn Read + Send> = if input == "-" {
            Box::new(io::stdin())
        } else {
            let file = File::open(Path::new(input))
                .with_context(|| format!("open frame stream {input}"))?;
            Box::new(file)
        };

        let latest = Arc::new(Latest::default());
        let stop = Arc::new(AtomicBool::new(false));
        let latest_for_thread = Arc::clone(&latest);
        let stop_for_thread = Arc::clone(&stop);
        let label = input.to_string();
        let label_for_thread = label.clone();

        let handle = thread::Builder::new()
            .name("frame-reader".to_string())
            .spawn(move || {
                read_loop(
                    BufReader::new(reader),
                    width,
                    height,
                    &latest_for_thread,
                    &stop_for_thread,
                    &label_for_thread,
                );
                latest_for_thread.finish();
            })
            .context("spawn frame reader thread")?;

        Ok(Self {
            width,
            height,
            label,
            latest,
            stop,
            reader: Some(handle),
        })
    }
}

fn read_loop(
    mut reader: impl Read,
    width: usize,
    height: usize,
    latest: &Latest,
    stop: &AtomicBool,
    label: &str,
) {
    let row_bytes = width * 3;
    let mut raw = vec![0u8; row_bytes * height];
    while !stop.load(Ordering::Relaxed) {
        match reader.read_exact(&mut raw) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                log::warn!("frame stream {label}: end of stream");
                break;
            }
            Err(err) => {
                log::warn!("frame stream {label}: {err}");
                break;
            }
        }
        // Rows arrive top first; the grid's row 0 is the bottom.
        let frame = raw
            .chunks_exact(row_bytes)
            .rev()
            .flat_map(|row| row.chunks_exact(3))
            .map(|px| Color::from_rgb8(px[0], px[1], px[2]))
            .collect();
        latest.publish(frame);
    }
}

impl StreamSource {
    /// Frames read from the stream so far.
    pub fn received(&self) -> u64 {
        self.latest.received.load(Ordering::Relaxed)
    }
}

impl FrameSource for StreamSource {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    // The reader thread streams continuously; there is nothing to kick off.
    fn request(&mut self) {}

    fn poll(&mut self, out: &mut [Color]) -> anyhow::Result<bool> {
        let feed = self
            .latest
            .feed
            .lock()
            .map_err(|_| anyhow!("frame stream {}: reader panicked", self.label))?;
        match (&feed.frame, feed.ended) {
            (Some(frame), _) => {
                out.copy_from_slice(frame);
                Ok(true)
            }
            (None, true) => Err(anyhow!(
                "frame stream {} ended before its first frame",
                self.label
            )),
            (None, false) => Ok(false),
        }
    }

    fn wait(&mut self) {
        let Ok(feed) = self.latest.feed.lock() else {
            return;
        };
        if feed.frame.is_none() && !feed.ended {
            let _ = self.latest.arrived.wait_timeout(feed, STREAM_WAIT);
        }
    }

    fn name(&self) -> &str {
        &self.label
    }
}

impl Drop for StreamSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // A reader blocked on stdin never wakes up; only join finished threads.
        if let Some(h) = self.reader.take() {
            if h.is_finished() {
                let _ = h.join();
            }
        }
    }
}
