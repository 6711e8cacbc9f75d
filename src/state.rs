//! # Shared mission state
//!
//! Flags shared between the mission runner, the altitude watchdog and the
//! pause controller. Every flag has a single writer, so plain atomics are
//! enough; [Notify] wakes tasks waiting for a change.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::Arc;
use tokio::sync::Notify;

/// Safety and pause flags of a mission run
#[derive(Debug, Default)]
pub struct MissionFlags {
    above_max_alt: AtomicBool,
    paused: AtomicBool,
    breach: Notify,
    pause_changed: Notify,
}

impl MissionFlags {
    /// New flags, not breached and not paused
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the safety flag at the start of a mission run
    pub fn reset_breach(&self) {
        self.above_max_alt.store(false, SeqCst);
    }

    /// Latch the safety flag.
    ///
    /// Returns `true` only for the call that moved the flag from false to
    /// true. Concurrent and repeated calls return `false`.
    pub fn latch_breach(&self) -> bool {
        let latched = self
            .above_max_alt
            .compare_exchange(false, true, SeqCst, SeqCst)
            .is_ok();
        if latched {
            self.breach.notify_waiters();
        }
        latched
    }

    /// True once the altitude ceiling has been breached in this run
    pub fn is_breached(&self) -> bool {
        self.above_max_alt.load(SeqCst)
    }

    /// Wait until the safety flag is latched
    pub async fn breached(&self) {
        loop {
            let notified = self.breach.notified();
            if self.is_breached() {
                return;
            }
            notified.await;
        }
    }

    /// Flip the pause flag and return the new value
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.paused.fetch_xor(true, SeqCst);
        self.pause_changed.notify_waiters();
        paused
    }

    /// True while the mission is paused
    pub fn is_paused(&self) -> bool {
        self.paused.load(SeqCst)
    }

    /// Wait until the pause flag is cleared
    pub async fn resumed(&self) {
        loop {
            let notified = self.pause_changed.notified();
            if !self.is_paused() {
                return;
            }
            notified.await;
        }
    }
}

/// Cancellation signal threaded through every blocking wait.
///
/// Clones share the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// New, not cancelled, token
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel all waits using this token or one of its clones
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// True once [CancelToken::cancel()] has been called
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(SeqCst)
    }

    /// Wait for cancellation
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
