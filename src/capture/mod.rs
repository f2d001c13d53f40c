//! Speech-capture module
//!
//! Owns the lifecycle of a live transcription stream over an opaque host
//! recognition capability: initialization, start, incremental result
//! accumulation, stop, and auto-restart when the host ends the stream early.
//! Stream events and user commands are merged into one queue and handled by a
//! single task in arrival order, so the state machine never sees overlapping
//! transitions.

mod capability;
mod controller;
mod error;
mod replay;

pub(crate) use capability::SpeechCapability;
pub(crate) use controller::{CaptureSnapshot, SessionStatus};
pub(crate) use error::CaptureError;
pub(crate) use replay::ReplayCapability;

use capability::StreamEvent;
use controller::CaptureController;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;

/// Capture event for subscribers
#[derive(Clone, Debug)]
pub(crate) enum CaptureEvent {
    /// The stream is live and accumulating
    Started,
    /// Interim transcript (still being recognized)
    PartialTranscript { text: String },
    /// Full committed transcript after a final segment landed
    CommittedTranscript { text: String },
    /// A stream error that did not end the session
    Error { message: String },
    /// Microphone access was revoked; re-granting is required
    PermissionRevoked,
    /// The stream ended on its own; a restart attempt is underway
    Restarting,
    /// The restart attempt failed; the session returned to idle
    RestartFailed { message: String },
    /// The session stopped at the user's request
    Stopped { transcript: String },
}

/// User-facing session commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Start,
    Stop,
    Shutdown,
}

/// Everything the controller reacts to, merged into one ordered queue.
#[derive(Debug, Clone)]
pub(crate) enum Input {
    Command(Command),
    Stream(StreamEvent),
}

/// Client for one capture session
///
/// `start`/`stop` enqueue requests and return immediately; outcomes arrive
/// through [`subscribe`](Self::subscribe) and the latest state is readable
/// through [`snapshot`](Self::snapshot).
pub(crate) struct CaptureClient {
    input_tx: mpsc::UnboundedSender<Input>,
    event_tx: broadcast::Sender<CaptureEvent>,
    snapshot_rx: watch::Receiver<CaptureSnapshot>,
}

impl CaptureClient {
    /// Initialize a capture session
    ///
    /// Opens an unstarted stream on the host capability and spawns the run
    /// loop that drives the state machine. Callable once microphone
    /// permission is granted; fails with
    /// [`CaptureError::UnsupportedCapability`] when the host offers no
    /// streaming recognition service.
    pub(crate) fn initialize(
        capability: &dyn SpeechCapability,
        locale: &str,
    ) -> Result<Self, CaptureError> {
        let (event_tx, _) = broadcast::channel(100);
        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
        let stream = capability.open(locale, stream_tx)?;
        let (input_tx, mut input_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(CaptureSnapshot::default());
        let mut session = CaptureController::new(stream, event_tx.clone());

        // merge stream events into the command queue
        let forward_tx = input_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = stream_rx.recv().await {
                if forward_tx.send(Input::Stream(event)).is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(input) = input_rx.recv().await {
                if matches!(input, Input::Command(Command::Shutdown)) {
                    session.shutdown();
                    break;
                }
                session.handle_input(input);
                let _ = snapshot_tx.send(session.snapshot());
            }
            debug!("capture session run loop exited");
        });

        Ok(Self {
            input_tx,
            event_tx,
            snapshot_rx,
        })
    }

    /// Subscribe to capture events
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.event_tx.subscribe()
    }

    /// Get the latest status/transcript snapshot
    pub(crate) fn snapshot(&self) -> CaptureSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Request the session to start listening
    pub(crate) fn start(&self) {
        self.send(Command::Start);
    }

    /// Request the session to stop listening
    pub(crate) fn stop(&self) {
        self.send(Command::Stop);
    }

    fn send(&self, command: Command) {
        if self.input_tx.send(Input::Command(command)).is_err() {
            debug!("capture session is gone; {:?} dropped", command);
        }
    }
}

impl Drop for CaptureClient {
    fn drop(&mut self) {
        let _ = self.input_tx.send(Input::Command(Command::Shutdown));
    }
}

#[cfg(test)]
mod tests {
    use super::capability::{SpeechStream, StreamEventSender};
    use super::*;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    struct AbsentCapability;

    impl SpeechCapability for AbsentCapability {
        fn open(
            &self,
            _locale: &str,
            _events: StreamEventSender,
        ) -> Result<Box<dyn SpeechStream>, CaptureError> {
            Err(CaptureError::UnsupportedCapability)
        }
    }

    #[tokio::test]
    async fn test_initialize_without_capability_fails() {
        let result = CaptureClient::initialize(&AbsentCapability, "en-US");
        assert!(matches!(result, Err(CaptureError::UnsupportedCapability)));
    }

    #[tokio::test]
    async fn test_session_over_replay_capability() {
        let capability = ReplayCapability::from_script("hello world");
        let client =
            CaptureClient::initialize(&capability, "en-US").expect("replay is always available");
        let mut events = client.subscribe();
        client.start();

        // a single-utterance script plays, the stream ends, and the restart
        // attempt fails on the exhausted script
        let settled = timeout(Duration::from_secs(10), async {
            loop {
                match events.recv().await {
                    Ok(CaptureEvent::RestartFailed { .. }) => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await;
        assert!(settled.is_ok(), "session never settled");

        let snapshot = timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = client.snapshot();
                if snapshot.status == SessionStatus::Idle && !snapshot.transcript.is_empty() {
                    break snapshot;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("snapshot never settled");
        assert_eq!(snapshot.transcript, "hello world");
        assert_eq!(snapshot.interim, "");
    }
}
