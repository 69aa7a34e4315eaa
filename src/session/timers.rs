//! Cancellable session timers.
//!
//! Each timer is an owned [`Sleep`]. Cancelling drops it, so an expiry that
//! was cancelled can never be observed afterwards.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Sleep};

/// Interval between countdown ticks.
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// The timers a session can have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Delay before checking the stream for a subject.
    Detection,
    /// One second of countdown.
    CountdownTick,
    /// End of the capture pulse.
    Pulse,
}

type Slot = Option<Pin<Box<Sleep>>>;

#[derive(Debug, Default)]
pub(crate) struct Timers {
    detection: Slot,
    countdown: Slot,
    pulse: Slot,
}

impl Timers {
    fn slot(&mut self, kind: TimerKind) -> &mut Slot {
        match kind {
            TimerKind::Detection => &mut self.detection,
            TimerKind::CountdownTick => &mut self.countdown,
            TimerKind::Pulse => &mut self.pulse,
        }
    }

    /// Arms `kind` to expire after `after`, replacing any pending expiry.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn arm(&mut self, kind: TimerKind, after: Duration) {
        *self.slot(kind) = Some(Box::pin(sleep(after)));
    }

    /// Cancels `kind`. Returns true if it was armed.
    pub(crate) fn cancel(&mut self, kind: TimerKind) -> bool {
        self.slot(kind).take().is_some()
    }

    pub(crate) fn cancel_all(&mut self) {
        self.detection = None;
        self.countdown = None;
        self.pulse = None;
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self, kind: TimerKind) -> bool {
        match kind {
            TimerKind::Detection => self.detection.is_some(),
            TimerKind::CountdownTick => self.countdown.is_some(),
            TimerKind::Pulse => self.pulse.is_some(),
        }
    }

    pub(crate) fn any_armed(&self) -> bool {
        self.detection.is_some() || self.countdown.is_some() || self.pulse.is_some()
    }

    /// Waits for the next armed timer to expire and disarms it.
    ///
    /// Pends forever when nothing is armed. Dropping the returned future
    /// before it completes leaves every timer armed.
    pub(crate) async fn expired(&mut self) -> TimerKind {
        let kind = tokio::select! {
            biased;
            _ = wait(&mut self.detection) => TimerKind::Detection,
            _ = wait(&mut self.countdown) => TimerKind::CountdownTick,
            _ = wait(&mut self.pulse) => TimerKind::Pulse,
        };
        self.cancel(kind);
        kind
    }
}

async fn wait(slot: &mut Slot) {
    match slot {
        Some(timer) => timer.as_mut().await,
        None => pending::<()>().await,
    }
}
