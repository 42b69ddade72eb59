//! Terminal helpers for the browser client's quit key

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Guard that restores terminal state on drop
pub(crate) struct RawModeGuard {
    was_raw: bool,
}

impl RawModeGuard {
    pub(crate) fn new() -> io::Result<Self> {
        let was_raw = terminal::is_raw_mode_enabled()?;
        if !was_raw {
            terminal::enable_raw_mode()?;
        }
        Ok(Self { was_raw })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if !self.was_raw {
            let _ = terminal::disable_raw_mode();
        }
    }
}

/// Leave raw mode unconditionally
pub(crate) fn restore() {
    let _ = terminal::disable_raw_mode();
}

/// Block until `key` is pressed or `cancel` is set.
///
/// Returns true when the key was pressed. Every other key is ignored.
pub(crate) fn wait_for_key(key: char, cancel: &AtomicBool) -> io::Result<bool> {
    let _guard = RawModeGuard::new()?;

    while !cancel.load(Ordering::SeqCst) {
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        if let Event::Key(KeyEvent {
            code: KeyCode::Char(c),
            kind: KeyEventKind::Press,
            ..
        }) = event::read()?
        {
            if c == key {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Open a URL in the default browser
pub(crate) fn open_in_browser(url: &str) -> Result<(), String> {
    #[cfg(target_os = "macos")]
    let result = std::process::Command::new("open")
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    #[cfg(target_os = "windows")]
    let result = std::process::Command::new("cmd")
        .args(["/C", "start", url])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let result = std::process::Command::new("xdg-open")
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    result.map_err(|e| e.to_string())?;
    Ok(())
}
