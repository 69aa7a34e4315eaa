//! Async command loop around a [`CaptureSession`].
//!
//! The driver owns the session and runs on a single task, interleaving
//! commands from [`SessionHandle`]s with the session's own timers. Nothing
//! runs in parallel: a command and a timer expiry are never applied at the
//! same time, and a `Stop` processed before a timer's deadline cancels it.
//! Queued commands take priority over timers that are ready at the same
//! poll.

use super::lifecycle::CaptureSession;
use super::state::{SessionSnapshot, SessionStats};
use crate::capture::VideoSource;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Default depth of the command queue.
pub const COMMAND_QUEUE_DEPTH: usize = 32;

/// Errors returned by [`SessionHandle`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The driver loop has ended.
    #[error("capture session driver has shut down")]
    Closed,
}

/// Commands accepted by the driver.
#[derive(Debug)]
pub enum SessionCommand {
    /// Acquire a stream.
    Start,
    /// Release the stream and cancel timers.
    Stop,
    /// Capture a still if allowed.
    Capture,
    /// Start or restart a countdown of this many seconds.
    BeginCountdown(u32),
    /// Reply with the current state.
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Stops the session and ends the loop.
    Shutdown,
}

/// Owns a session and applies commands and timer expiries to it.
pub struct SessionDriver<S: VideoSource> {
    session: CaptureSession<S>,
    commands: mpsc::Receiver<SessionCommand>,
}

impl<S: VideoSource> SessionDriver<S> {
    /// Wraps a session and returns the driver with a handle to it.
    pub fn new(session: CaptureSession<S>) -> (Self, SessionHandle) {
        Self::with_queue_depth(session, COMMAND_QUEUE_DEPTH)
    }

    /// Like [`new`](Self::new) with a custom command queue depth.
    pub fn with_queue_depth(session: CaptureSession<S>, depth: usize) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (
            Self {
                session,
                commands: rx,
            },
            SessionHandle { tx },
        )
    }

    /// Runs until a `Shutdown` command arrives or every handle is dropped.
    ///
    /// The session is stopped before returning, releasing any held stream.
    pub async fn run(mut self) -> SessionStats {
        tracing::debug!("Session driver started");
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                kind = self.session.next_timer() => self.session.handle_timer(kind),
            }
        }

        self.session.stop();
        let stats = self.session.stats();
        tracing::info!(
            captures = stats.captures,
            device_errors = stats.device_errors,
            "Session driver finished"
        );
        stats
    }

    fn apply(&mut self, command: SessionCommand) {
        tracing::trace!(?command, "Applying session command");
        match command {
            SessionCommand::Start => self.session.start(),
            SessionCommand::Stop => self.session.stop(),
            SessionCommand::Capture => self.session.capture(),
            SessionCommand::BeginCountdown(seconds) => self.session.begin_countdown(seconds),
            SessionCommand::Snapshot(reply) => {
                // Receiver may have given up waiting
                let _ = reply.send(self.session.snapshot());
            }
            SessionCommand::Shutdown => {}
        }
    }
}

/// Cloneable handle for sending commands to a [`SessionDriver`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn send(&self, command: SessionCommand) -> Result<(), DriverError> {
        self.tx.send(command).await.map_err(|_| DriverError::Closed)
    }

    /// Requests device access.
    pub async fn start(&self) -> Result<(), DriverError> {
        self.send(SessionCommand::Start).await
    }

    /// Releases the stream and cancels pending timers.
    pub async fn stop(&self) -> Result<(), DriverError> {
        self.send(SessionCommand::Stop).await
    }

    /// Captures a still if the session allows it.
    pub async fn capture(&self) -> Result<(), DriverError> {
        self.send(SessionCommand::Capture).await
    }

    /// Starts a countdown ending in a capture.
    pub async fn begin_countdown(&self, seconds: u32) -> Result<(), DriverError> {
        self.send(SessionCommand::BeginCountdown(seconds)).await
    }

    /// Returns the session state after every previously sent command has
    /// been applied.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, DriverError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Snapshot(reply)).await?;
        response.await.map_err(|_| DriverError::Closed)
    }

    /// Stops the session and ends the driver loop.
    pub async fn shutdown(&self) -> Result<(), DriverError> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Blocking [`stop`](Self::stop) for threads outside the runtime.
    pub fn blocking_stop(&self) -> Result<(), DriverError> {
        self.tx
            .blocking_send(SessionCommand::Stop)
            .map_err(|_| DriverError::Closed)
    }

    /// Blocking [`shutdown`](Self::shutdown) for threads outside the runtime,
    /// such as signal handlers.
    pub fn blocking_shutdown(&self) -> Result<(), DriverError> {
        self.tx
            .blocking_send(SessionCommand::Shutdown)
            .map_err(|_| DriverError::Closed)
    }

    /// True once the driver has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
