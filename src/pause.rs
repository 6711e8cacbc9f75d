//! # Pause/resume controller
//!
//! Toggles the pause flag every time the pause key is pressed. In a terminal
//! [KeyReader] switches stdin to raw mode and forwards every key press as it
//! is typed, no Enter needed. When stdin is not a terminal, input is read
//! line by line instead.
//!
//! Where the flag is honoured is up to the mission runner, see
//! [PauseScope](crate::config::PauseScope).

use crate::state::{CancelToken, MissionFlags};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use flume::{Receiver, Sender};
use log::{debug, info, warn};
use std::io::{BufRead, IsTerminal};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often the raw mode reader checks whether it should stop
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Toggles [MissionFlags] pause on a designated key
#[derive(Debug, Clone)]
pub struct PauseController {
    flags: Arc<MissionFlags>,
    key: String,
}

impl PauseController {
    /// New controller toggling `flags` on `key`
    pub fn new(flags: Arc<MissionFlags>, key: impl Into<String>) -> Self {
        Self {
            flags,
            key: key.into(),
        }
    }

    /// Handle one line of input.
    ///
    /// Returns the new pause state if the line is the pause key, `None` if the
    /// line was ignored.
    pub fn handle_input(&self, line: &str) -> Option<bool> {
        if line.trim() != self.key {
            return None;
        }

        let paused = self.flags.toggle_pause();
        if paused {
            info!("Mission paused, enter '{}' to resume", self.key);
        } else {
            info!("Mission resumed");
        }
        Some(paused)
    }

    /// Handle input lines until the sender is dropped or `cancel` fires
    pub async fn run(self, lines: Receiver<String>, cancel: CancelToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                line = lines.recv_async() => match line {
                    Ok(line) => {
                        self.handle_input(&line);
                    }
                    Err(_) => return,
                },
            }
        }
    }

    /// Spawn [PauseController::run()] on the tokio runtime
    pub fn spawn(self, lines: Receiver<String>, cancel: CancelToken) -> JoinHandle<()> {
        tokio::spawn(self.run(lines, cancel))
    }
}

/// Keys typed on the standard input, read from a dedicated thread.
///
/// In a terminal every key press is sent as a one character string and
/// Ctrl-C, which raw mode no longer turns into a signal, cancels the
/// `interrupt` token. Otherwise whole lines are sent.
///
/// [KeyReader::stop()] must be called to give the terminal back.
pub struct KeyReader {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
    raw: bool,
}

impl KeyReader {
    /// Start reading, returns the reader and the keys it forwards
    pub fn start(interrupt: CancelToken) -> (Self, Receiver<String>) {
        let (tx, rx) = flume::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let raw = std::io::stdin().is_terminal();

        let stop_thread = stop.clone();
        let spawned = std::thread::Builder::new()
            .name("stdin-keys".into())
            .spawn(move || {
                if raw {
                    read_keys(&tx, &stop_thread, &interrupt);
                } else {
                    read_lines(&tx);
                }
            });
        let thread = match spawned {
            Ok(thread) => Some(thread),
            Err(e) => {
                warn!("Cannot read keyboard input, pause disabled: {}", e);
                None
            }
        };

        (Self { stop, thread, raw }, rx)
    }

    /// Stop reading and restore the terminal
    ///
    /// A line reader blocked on stdin cannot be woken up and is left behind.
    pub async fn stop(mut self) {
        self.stop.store(true, Relaxed);

        let Some(thread) = self.thread.take() else {
            return;
        };
        if !self.raw {
            return;
        }
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => debug!("Keyboard reader stopped"),
            Ok(Err(_)) => warn!("Keyboard reader panicked"),
            Err(e) => warn!("Cannot wait for the keyboard reader: {}", e),
        }
    }
}

fn read_keys(keys: &Sender<String>, stop: &AtomicBool, interrupt: &CancelToken) {
    if let Err(e) = terminal::enable_raw_mode() {
        warn!("Cannot read single keys, falling back to lines: {}", e);
        return read_lines(keys);
    }

    while !stop.load(Relaxed) && !keys.is_disconnected() {
        match event::poll(KEY_POLL_INTERVAL) {
            Ok(true) => (),
            Ok(false) => continue,
            Err(e) => {
                warn!("Keyboard input lost: {}", e);
                break;
            }
        }

        let key = match event::read() {
            Ok(Event::Key(KeyEvent {
                code: KeyCode::Char(key),
                modifiers,
                kind: KeyEventKind::Press,
                ..
            })) => (key, modifiers),
            Ok(_) => continue,
            Err(e) => {
                warn!("Keyboard input lost: {}", e);
                break;
            }
        };

        match key {
            ('c', modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                warn!("Interrupted, aborting the tour");
                interrupt.cancel();
            }
            (key, _) => {
                if keys.send(key.to_string()).is_err() {
                    break;
                }
            }
        }
    }

    if let Err(e) = terminal::disable_raw_mode() {
        warn!("Cannot restore the terminal: {}", e);
    }
}

fn read_lines(keys: &Sender<String>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { return };
        if keys.send(line).is_err() {
            return;
        }
    }
}
