//! Saved frames on disk as binary PPM, each tagged with a score.

use crate::color::Color;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    Io(String),
    Format { path: PathBuf, message: String },
    OutOfRange { index: usize, len: usize },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Format { path, message } => {
                write!(f, "bad snapshot {}: {message}", path.display())
            }
            Self::OutOfRange { index, len } => {
                write!(f, "snapshot {index} out of range ({len} saved)")
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

fn io_err(err: std::io::Error) -> SnapshotError {
    SnapshotError::Io(err.to_string())
}

/// Rates a frame. Higher is better.
pub trait Scorer {
    fn score(&self, pixels: &[Color]) -> f32;
}

impl<F: Fn(&[Color]) -> f32> Scorer for F {
    fn score(&self, pixels: &[Color]) -> f32 {
        self(pixels)
    }
}

/// Favors frames that have both bright and dark regions and a mid-level
/// average magnitude. Scores fall in [0, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceScorer;

impl Scorer for BalanceScorer {
    fn score(&self, pixels: &[Color]) -> f32 {
        if pixels.is_empty() {
            return 0.0;
        }
        let n = pixels.len() as f32;
        let (mut bright, mut dark, mut total) = (0.0f32, 0.0f32, 0.0f32);
        for px in pixels {
            let v = px.finite().max_channel().clamp(0.0, 1.0);
            if v >= 0.66 {
                bright += 1.0;
            } else if v <= 0.33 {
                dark += 1.0;
            }
            total += v;
        }
        let (bright, dark, avg) = (bright / n, dark / n, total / n);
        let contrast = 4.0 * bright * dark;
        let level = 1.0 - (avg - 0.5).abs() * 2.0;
        (0.5 * contrast + 0.5 * level).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub width: usize,
    pub height: usize,
    /// Row 0 is the bottom row, like the grid.
    pub pixels: Vec<Color>,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct Entry {
    path: PathBuf,
    score: f32,
}

pub struct SnapshotStore {
    dir: PathBuf,
    entries: Vec<Entry>,
    next_id: u32,
    scorer: Box<dyn Scorer>,
}

impl SnapshotStore {
    /// Opens (creating if needed) `dir` and indexes the snapshots in it.
    pub fn open(dir: &Path) -> Result<Self, SnapshotError> {
        Self::with_scorer(dir, Box::new(BalanceScorer))
    }

    pub fn with_scorer(dir: &Path, scorer: Box<dyn Scorer>) -> Result<Self, SnapshotError> {
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().is_some_and(|e| e == "ppm") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        let mut next_id = 0;
        for path in paths {
            if let Some(id) = snapshot_id(&path) {
                next_id = next_id.max(id + 1);
            }
            match read_header(&path) {
                Ok(header) => entries.push(Entry {
                    path,
                    score: header.score,
                }),
                Err(err) => log::warn!("skipping snapshot: {err}"),
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            entries,
            next_id,
            scorer,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn score(&self, index: usize) -> Option<f32> {
        self.entries.get(index).map(|e| e.score)
    }

    /// Index of the highest scoring snapshot.
    pub fn best(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.score.total_cmp(&b.1.score))
            .map(|(i, _)| i)
    }

    /// Writes the frame and returns its score.
    pub fn save(&mut self, pixels: &[Color], width: usize, height: usize) -> Result<f32, SnapshotError> {
        let path = self.dir.join(format!("snapshot-{:06}.ppm", self.next_id));
        if pixels.len() != width * height {
            return Err(SnapshotError::Format {
                path,
                message: format!("{} pixels for {width}x{height}", pixels.len()),
            });
        }
        let score = self.scorer.score(pixels);

        let mut body = format!("P6\n# score {score}\n{width} {height}\n255\n").into_bytes();
        body.reserve(pixels.len() * 3);
        for row in (0..height).rev() {
            for px in &pixels[row * width..(row + 1) * width] {
                body.extend_from_slice(&px.to_rgb8());
            }
        }

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &body).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;

        self.next_id += 1;
        self.entries.push(Entry { path, score });
        Ok(score)
    }

    pub fn load(&self, index: usize) -> Result<Snapshot, SnapshotError> {
        let entry = self.entries.get(index).ok_or(SnapshotError::OutOfRange {
            index,
            len: self.entries.len(),
        })?;
        let data = std::fs::read(&entry.path).map_err(io_err)?;
        let header = parse_header(&data).map_err(|message| SnapshotError::Format {
            path: entry.path.clone(),
            message,
        })?;

        let raster = &data[header.offset..];
        let (w, h) = (header.width, header.height);
        if w == 0 || h == 0 || raster.len() < w * h * 3 {
            return Err(SnapshotError::Format {
                path: entry.path.clone(),
                message: "truncated pixel data".to_string(),
            });
        }
        let mut pixels = vec![Color::BLACK; w * h];
        for (file_row, row) in raster.chunks_exact(w * 3).take(h).enumerate() {
            let y = h - 1 - file_row;
            for (x, px) in row.chunks_exact(3).enumerate() {
                pixels[x + y * w] = Color::from_rgb8(px[0], px[1], px[2]);
            }
        }
        Ok(Snapshot {
            width: w,
            height: h,
            pixels,
            score: header.score,
        })
    }
}

fn snapshot_id(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("snapshot-")?
        .parse()
        .ok()
}

struct Header {
    width: usize,
    height: usize,
    score: f32,
    offset: usize,
}

fn read_header(path: &Path) -> Result<Header, SnapshotError> {
    let data = std::fs::read(path).map_err(io_err)?;
    parse_header(&data).map_err(|message| SnapshotError::Format {
        path: path.to_path_buf(),
        message,
    })
}

/// `P6`, an optional `# score <f>` comment, width, height, maxval 255.
fn parse_header(data: &[u8]) -> Result<Header, String> {
    let mut fields: Vec<String> = Vec::with_capacity(4);
    let mut score = 0.0;
    let mut pos = 0;
    while fields.len() < 4 {
        let end = data[pos..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|n| pos + n)
            .ok_or("unterminated header")?;
        let line = std::str::from_utf8(&data[pos..end]).map_err(|_| "header is not text")?;
        pos = end + 1;
        if let Some(comment) = line.trim().strip_prefix('#') {
            if let Some(v) = comment.trim().strip_prefix("score") {
                score = v.trim().parse().unwrap_or(0.0);
            }
            continue;
        }
        fields.extend(line.split_whitespace().map(str::to_string));
    }

    if fields[0] != "P6" {
        return Err(format!("expected P6, got {}", fields[0]));
    }
    let width = fields[1].parse().map_err(|_| "bad width")?;
    let height = fields[2].parse().map_err(|_| "bad height")?;
    if fields[3] != "255" {
        return Err("only 8-bit snapshots are supported".to_string());
    }
    Ok(Header {
        width,
        height,
        score,
        offset: pos,
    })
}
