use crate::render::{overlay_box, Frame, Renderer};
use std::fmt::Write as _;
use std::io::Write;

const UPPER_HALF: char = '\u{2580}';

/// Two pixels per cell: foreground paints the upper half, background the
/// lower. Color escapes are only emitted when they change.
#[derive(Default)]
pub struct HalfBlockRenderer {
    buf: String,
}

impl HalfBlockRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn rgb(px: &[u8]) -> (u8, u8, u8) {
    (px[0], px[1], px[2])
}

impl Renderer for HalfBlockRenderer {
    fn name(&self) -> &'static str {
        "halfblock"
    }

    fn present(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
        let (w, h) = (frame.width, frame.height);
        if w == 0 || h < 2 || frame.pixels.len() < w * h * 4 {
            return Ok(());
        }

        let buf = &mut self.buf;
        buf.clear();
        if frame.sync_updates {
            buf.push_str("\x1b[?2026h");
        }
        // Home, reset, autowrap off while full-width rows are painted.
        buf.push_str("\x1b[H\x1b[0m\x1b[?7l");

        let mut fg = None;
        let mut bg = None;
        for row in 0..frame.text_rows() {
            let _ = write!(buf, "\x1b[{};1H", row + 1);
            for x in 0..w {
                let top = rgb(&frame.pixels[(row * 2 * w + x) * 4..]);
                let bottom = rgb(&frame.pixels[((row * 2 + 1) * w + x) * 4..]);
                if fg != Some(top) {
                    let _ = write!(buf, "\x1b[38;2;{};{};{}m", top.0, top.1, top.2);
                    fg = Some(top);
                }
                if bg != Some(bottom) {
                    let _ = write!(buf, "\x1b[48;2;{};{};{}m", bottom.0, bottom.1, bottom.2);
                    bg = Some(bottom);
                }
                buf.push(UPPER_HALF);
            }
        }

        for (i, line) in frame.hud.iter().enumerate() {
            let _ = write!(buf, "\x1b[{};1H\x1b[0m\x1b[2K", frame.text_rows() + i + 1);
            buf.extend(line.chars().take(w));
        }

        if let Some(text) = frame.overlay {
            overlay_box(buf, w, frame.total_rows(), text);
        }

        buf.push_str("\x1b[?7h");
        if frame.sync_updates {
            buf.push_str("\x1b[?2026l");
        }
        out.write_all(buf.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}
