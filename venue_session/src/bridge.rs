//! Blocking completion signals for asynchronous gateway answers.
//!
//! The caller arms a wait for a logical `Step` before sending the request, the
//! gateway callback signals that step with an `Outcome`, and the caller blocks on
//! the returned `PendingWait`. Each wait is a single-use `bounded(1)` channel.
//!
//! A fatal disconnect calls `signal_all`, so no caller stays blocked on a
//! connection that will never answer. Without a deadline `block` waits forever;
//! the deadline is opt-in through the venue config.
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use log::{debug, error};
use venue_common::records::QueryKind;
use venue_common::{Result, VenueError};

/// Logical request a caller can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Transport connection.
    Connect,
    /// Authenticate response.
    Authenticate,
    /// Login response (or ready event).
    Login,
    /// Password change response.
    ChangePassword,
    /// One reference-data sweep query.
    Sweep(QueryKind),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Connect => write!(f, "connect"),
            Step::Authenticate => write!(f, "authenticate"),
            Step::Login => write!(f, "login"),
            Step::ChangePassword => write!(f, "change-password"),
            Step::Sweep(kind) => write!(f, "{} query", kind),
        }
    }
}

/// How a wait was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The expected event arrived without error.
    Completed,
    /// The expected event carried an error.
    Failed(String),
    /// The connection dropped while waiting.
    Disconnected(String),
    /// The optional deadline passed first.
    TimedOut,
}

/// Registry of armed waits, keyed by step.
#[derive(Default)]
pub struct EventBridge {
    armed: Mutex<HashMap<Step, (u64, Sender<Outcome>)>>,
    next_id: AtomicU64,
}

impl EventBridge {
    /// Create an empty bridge.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a fresh wait for `step`. Fails if one is already outstanding.
    pub fn arm(&self, step: Step) -> Result<PendingWait<'_>> {
        let mut armed = self.armed.lock()?;
        if armed.contains_key(&step) {
            return Err(VenueError::WaitAlreadyArmed(step.to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = bounded(1);
        armed.insert(step, (id, tx));
        debug!("Armed wait for {}", step);
        Ok(PendingWait {
            bridge: self,
            step,
            id,
            rx,
        })
    }

    /// Release the wait armed for `step`. Returns `false` when nothing was armed.
    pub fn signal(&self, step: Step, outcome: Outcome) -> bool {
        let tx = match self.armed.lock() {
            Ok(mut armed) => armed.remove(&step),
            Err(e) => {
                error!("Event bridge lock poisoned while signalling {}: {}", step, e);
                None
            }
        };
        match tx {
            Some((_, tx)) => {
                debug!("Signalled {} with {:?}", step, outcome);
                tx.send(outcome).is_ok()
            }
            None => false,
        }
    }

    /// Release every armed wait with the same outcome. Returns how many were armed.
    pub fn signal_all(&self, outcome: Outcome) -> usize {
        let drained: Vec<(Step, Sender<Outcome>)> = match self.armed.lock() {
            Ok(mut armed) => armed.drain().map(|(step, (_, tx))| (step, tx)).collect(),
            Err(e) => {
                error!("Event bridge lock poisoned while releasing all waits: {}", e);
                Vec::new()
            }
        };
        for (step, tx) in &drained {
            debug!("Released {} with {:?}", step, outcome);
            let _ = tx.send(outcome.clone());
        }
        drained.len()
    }

    /// Whether a wait is currently armed for `step`.
    pub fn is_armed(&self, step: Step) -> bool {
        self.armed
            .lock()
            .map(|armed| armed.contains_key(&step))
            .unwrap_or(false)
    }

    // Only removes the entry if it still belongs to the wait being dropped.
    fn disarm(&self, step: Step, id: u64) {
        if let Ok(mut armed) = self.armed.lock() {
            if armed.get(&step).is_some_and(|(armed_id, _)| *armed_id == id) {
                armed.remove(&step);
            }
        }
    }
}

/// One armed, single-use wait. Dropping it disarms the step.
pub struct PendingWait<'a> {
    bridge: &'a EventBridge,
    step: Step,
    id: u64,
    rx: Receiver<Outcome>,
}

impl PendingWait<'_> {
    /// Step this wait is armed for.
    pub fn step(&self) -> Step {
        self.step
    }

    /// Block until signalled, or until `deadline` passes when one is given.
    pub fn block(self, deadline: Option<Duration>) -> Outcome {
        let received = match deadline {
            None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(timeout) => self.rx.recv_timeout(timeout),
        };
        match received {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Outcome::TimedOut,
            // Sender dropped without a signal: the bridge itself went away.
            Err(RecvTimeoutError::Disconnected) => {
                Outcome::Disconnected(format!("wait for {} abandoned", self.step))
            }
        }
    }
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        self.bridge.disarm(self.step, self.id);
    }
}
