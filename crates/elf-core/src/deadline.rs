//! Per-call deadlines.
//!
//! A [`Deadline`] is created once per public call and shared by every store
//! round-trip the call makes. While a handle is in use a [`Watchdog`] thread
//! waits for the remaining time; on expiry it interrupts the handle so the
//! running statement fails with `SQLITE_INTERRUPT`. The interrupt is repeated
//! until the watchdog is disarmed, so statements started after expiry fail
//! too. Enforcement does not depend on signals and behaves the same on every
//! platform.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rusqlite::InterruptHandle;
use tracing::warn;

use crate::error::{Error, Result};

const REINTERRUPT_INTERVAL: Duration = Duration::from_millis(5);

/// Absolute point in time by which a call must finish.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    /// Start a deadline running now.
    pub fn after(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Time left before expiry (zero once expired).
    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.limit
    }

    /// Fail with a timeout error if the deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            Err(Error::timeout(self.limit))
        } else {
            Ok(())
        }
    }
}

/// Supervises one store handle for the lifetime of a unit of work.
pub struct Watchdog {
    cancel: Option<mpsc::Sender<()>>,
    fired: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Arm a watchdog that interrupts `interrupt` when `deadline` expires.
    pub fn arm(deadline: &Deadline, interrupt: InterruptHandle) -> Self {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let wait = deadline.remaining();

        let handle = thread::Builder::new()
            .name("elf-watchdog".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(wait) {
                    flag.store(true, Ordering::SeqCst);
                    // An interrupt only reaches statements already running, so
                    // keep firing until the handle is given back.
                    loop {
                        interrupt.interrupt();
                        match cancelled.recv_timeout(REINTERRUPT_INTERVAL) {
                            Err(RecvTimeoutError::Timeout) => continue,
                            _ => break,
                        }
                    }
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Without a supervisor the deadline is still checked between steps.
                warn!("Failed to spawn watchdog thread: {}", e);
                None
            }
        };

        Self {
            cancel: Some(cancel),
            fired,
            handle,
        }
    }

    /// Stop supervising. Returns `true` if the deadline fired and the handle
    /// was interrupted.
    pub fn disarm(mut self) -> bool {
        self.stop();
        self.fired.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

/// True when a store error was caused by an interrupt.
pub fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::OperationInterrupted
    )
}
