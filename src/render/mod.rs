mod halfblock;

pub use halfblock::HalfBlockRenderer;

use std::fmt::Write as _;
use std::io::Write;

/// One host tick worth of output. `pixels` is RGBA8, `width * height * 4`
/// bytes, with `height` even: two pixel rows per terminal row.
pub struct Frame<'a> {
    pub pixels: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub hud: &'a [String],
    pub overlay: Option<&'a str>,
    pub sync_updates: bool,
}

impl Frame<'_> {
    pub fn text_rows(&self) -> usize {
        self.height / 2
    }

    pub fn total_rows(&self) -> usize {
        self.text_rows() + self.hud.len()
    }
}

/// Render sink: presents the pixel buffer once per host tick.
pub trait Renderer {
    fn name(&self) -> &'static str;
    fn present(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()>;
}

/// Centered box over the picture; the first line is the title.
pub fn overlay_box(buf: &mut String, cols: usize, rows: usize, text: &str) {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() || cols < 8 || rows < 4 {
        return;
    }
    let inner = lines
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .min(cols - 4);
    let body = lines.len().min(rows - 2);
    let left = (cols - (inner + 4)) / 2 + 1;
    let top = (rows - (body + 2)) / 2 + 1;
    let rule = "-".repeat(inner + 2);

    buf.push_str("\x1b[0m\x1b[38;2;230;236;250m\x1b[48;2;8;10;18m");
    let _ = write!(buf, "\x1b[{};{}H+{}+", top, left, rule);
    for (i, line) in lines.iter().take(body).enumerate() {
        let clipped: String = line.chars().take(inner).collect();
        let pad = inner - clipped.chars().count();
        let _ = write!(buf, "\x1b[{};{}H| ", top + 1 + i, left);
        if i == 0 {
            let _ = write!(buf, "\x1b[1m{clipped}\x1b[22m");
        } else {
            buf.push_str(&clipped);
        }
        let _ = write!(buf, "{} |", " ".repeat(pad));
    }
    let _ = write!(buf, "\x1b[{};{}H+{}+\x1b[0m", top + body + 1, left, rule);
}
