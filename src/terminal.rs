use crate::scheduler::panic_message;
use anyhow::Context;
use crossterm::{
    cursor,
    terminal::{self, ClearType},
    ExecutableCommand,
};
use std::io::{stdout, Write};
use std::panic::{self, PanicHookInfo};
use std::sync::{Arc, Mutex};
use std::thread;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

/// Keeps panic reports off the screen. While installed, every report goes to
/// the log at debug level and the newest one is held for
/// [`QuietPanics::take_last`]. Dropping it puts the previous hook back.
pub struct QuietPanics {
    last: Arc<Mutex<Option<String>>>,
    previous: Option<PanicHook>,
}

impl QuietPanics {
    pub fn install() -> Self {
        let last = Arc::new(Mutex::new(None));
        let previous = panic::take_hook();
        let slot = Arc::clone(&last);
        panic::set_hook(Box::new(move |info| {
            let report = describe(info);
            log::debug!("{report}");
            if let Ok(mut slot) = slot.lock() {
                *slot = Some(report);
            }
        }));
        Self {
            last,
            previous: Some(previous),
        }
    }

    pub fn take_last(&self) -> Option<String> {
        self.last.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl Drop for QuietPanics {
    fn drop(&mut self) {
        // The hook cannot be swapped while unwinding; the process is on its
        // way out then anyway.
        if thread::panicking() {
            return;
        }
        if let Some(previous) = self.previous.take() {
            panic::set_hook(previous);
        }
    }
}

fn describe(info: &PanicHookInfo<'_>) -> String {
    let current = thread::current();
    let name = current.name().unwrap_or("<unnamed>");
    let message = panic_message(info.payload());
    match info.location() {
        Some(at) => format!("thread '{name}' panicked at {at}: {message}"),
        None => format!("thread '{name}' panicked: {message}"),
    }
}

/// Raw mode plus alternate screen for the lifetime of the guard. Panics are
/// kept quiet meanwhile; one that takes the app down is printed after the
/// screen is restored.
pub struct TerminalGuard {
    panics: QuietPanics,
}

impl TerminalGuard {
    pub fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("enable raw mode")?;
        // Constructed before the remaining setup so a failure below still
        // restores the terminal.
        let guard = Self {
            panics: QuietPanics::install(),
        };

        let mut out = stdout();
        out.execute(terminal::EnterAlternateScreen)
            .context("enter alternate screen")?;
        out.execute(terminal::Clear(ClearType::All))
            .context("clear screen")?;
        out.execute(cursor::Hide).context("hide cursor")?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut out = stdout();
        let _ = out.write_all(b"\x1b[?2026l\x1b[?7h\x1b[0m");
        let _ = out.flush();
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);

        if thread::panicking() {
            if let Some(report) = self.panics.take_last() {
                eprintln!("{report}");
            }
        }
    }
}
