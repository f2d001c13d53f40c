//! Capture session state management
//!
//! The controller is an explicit state machine owning the committed
//! transcript, the interim fragment, and the session status. Every mutation
//! goes through one of the transition methods below, driven one input at a
//! time by the client's run loop, so no two transitions ever overlap.
//!
//! Intended state is tracked in `should_be_listening`, set synchronously by
//! start/stop requests and read only when the stream ends. Hosts with a
//! bounded utterance window terminate the stream on their own even when the
//! user has not asked to stop; in that case the controller re-starts the same
//! stream once per end. A failed restart returns the session to idle and
//! disables further restarts until the user starts again.

use super::capability::{Segment, SpeechStream, StreamErrorKind, StreamEvent};
use super::{CaptureEvent, Command, Input};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

/// Session status as seen by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SessionStatus {
    /// No active stream
    #[default]
    Idle,
    /// Stream open and accumulating text
    Listening,
    /// Microphone access was revoked; a new session requires re-granting
    Error,
}

/// Point-in-time view of the session for the presentation layer.
#[derive(Debug, Clone, Default)]
pub(crate) struct CaptureSnapshot {
    pub status: SessionStatus,
    /// Space-joined committed transcript
    pub transcript: String,
    /// Best-guess text for speech not yet finalized; empty unless listening
    pub interim: String,
}

pub(crate) struct CaptureController {
    stream: Box<dyn SpeechStream>,
    committed_segments: Vec<String>,
    interim: String,
    status: SessionStatus,
    should_be_listening: bool,
    event_tx: broadcast::Sender<CaptureEvent>,
}

impl CaptureController {
    pub(crate) fn new(
        stream: Box<dyn SpeechStream>,
        event_tx: broadcast::Sender<CaptureEvent>,
    ) -> Self {
        Self {
            stream,
            committed_segments: Vec::new(),
            interim: String::new(),
            status: SessionStatus::Idle,
            should_be_listening: false,
            event_tx,
        }
    }

    pub(crate) fn handle_input(&mut self, input: Input) {
        match input {
            Input::Command(Command::Start) => self.request_start(),
            Input::Command(Command::Stop) => self.request_stop(),
            // Shutdown is intercepted by the client run loop, which calls
            // `shutdown()` directly and never forwards it here; this arm exists
            // only to keep the match exhaustive and mirrors that handling.
            Input::Command(Command::Shutdown) => self.shutdown(),
            Input::Stream(StreamEvent::Started) => self.on_started(),
            Input::Stream(StreamEvent::Result(segments)) => self.on_result(segments),
            Input::Stream(StreamEvent::Error(kind)) => self.on_error(kind),
            Input::Stream(StreamEvent::Ended) => self.on_ended(),
        }
    }

    /// Get the full committed transcript text
    pub(crate) fn transcript(&self) -> String {
        self.committed_segments.join(" ")
    }

    pub(crate) fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            status: self.status,
            transcript: self.transcript(),
            interim: self.interim.clone(),
        }
    }

    /// Stop the underlying stream; called by the run loop on shutdown.
    pub(crate) fn shutdown(&mut self) {
        self.stream.stop();
    }

    /// User-initiated start: begins a brand-new session from empty.
    fn request_start(&mut self) {
        if self.status == SessionStatus::Error {
            warn!("start requested but microphone access must be granted again");
            return;
        }
        if self.should_be_listening {
            debug!("start requested while already listening; ignoring");
            return;
        }
        self.committed_segments.clear();
        self.interim.clear();
        self.should_be_listening = true;
        if let Err(e) = self.stream.start() {
            error!("failed to start recognition stream: {}", e);
            self.should_be_listening = false;
            self.emit(CaptureEvent::Error {
                message: e.to_string(),
            });
        }
    }

    /// User-initiated stop: no auto-restart on the stream end that follows.
    fn request_stop(&mut self) {
        if !self.should_be_listening && self.status != SessionStatus::Listening {
            debug!("stop requested but the session is not listening; ignoring");
            return;
        }
        self.should_be_listening = false;
        self.stream.stop();
        if self.status == SessionStatus::Listening {
            self.status = SessionStatus::Idle;
        }
        self.interim.clear();
        self.emit(CaptureEvent::Stopped {
            transcript: self.transcript(),
        });
    }

    fn on_started(&mut self) {
        if self.status == SessionStatus::Error || !self.should_be_listening {
            debug!("stream started after the session left the listening state");
            return;
        }
        self.status = SessionStatus::Listening;
        self.emit(CaptureEvent::Started);
    }

    /// Append final segments to the transcript and replace the interim
    /// fragment with this event's interim content.
    fn on_result(&mut self, segments: Vec<Segment>) {
        if self.status != SessionStatus::Listening {
            debug!("dropping recognition result delivered while not listening");
            return;
        }
        let mut finals: Vec<&str> = Vec::new();
        let mut interim = String::new();
        for segment in &segments {
            let text = segment.text.trim();
            if text.is_empty() {
                continue;
            }
            if segment.is_final {
                finals.push(text);
            } else {
                if !interim.is_empty() {
                    interim.push(' ');
                }
                interim.push_str(text);
            }
        }
        if !finals.is_empty() {
            self.committed_segments.push(finals.join(" "));
            self.emit(CaptureEvent::CommittedTranscript {
                text: self.transcript(),
            });
        }
        // the latest event replaces the interim fragment wholesale
        self.interim = interim;
        self.emit(CaptureEvent::PartialTranscript {
            text: self.interim.clone(),
        });
    }

    fn on_error(&mut self, kind: StreamErrorKind) {
        match kind {
            StreamErrorKind::PermissionRevoked => {
                warn!("microphone access revoked during capture");
                self.should_be_listening = false;
                self.status = SessionStatus::Error;
                self.interim.clear();
                self.stream.stop();
                self.emit(CaptureEvent::PermissionRevoked);
            }
            kind => {
                // hosts recover from these on the next start; the stream end
                // that follows drives the restart
                warn!("transient recognition error: {:?}", kind);
            }
        }
    }

    fn on_ended(&mut self) {
        self.interim.clear();
        if self.status == SessionStatus::Error {
            return;
        }
        let was_listening = self.status == SessionStatus::Listening;
        self.status = SessionStatus::Idle;
        if !self.should_be_listening {
            if was_listening {
                debug!("recognition stream ended");
            }
            return;
        }
        // one restart attempt per stream end; the transcript is preserved
        match self.stream.start() {
            Ok(()) => {
                debug!("recognition stream ended early; restarting");
                self.emit(CaptureEvent::Restarting);
            }
            Err(e) => {
                error!("failed to restart recognition stream: {}", e);
                self.should_be_listening = false;
                self.emit(CaptureEvent::RestartFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    fn emit(&self, event: CaptureEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::super::error::CaptureError;
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct StreamProbe {
        starts: AtomicUsize,
        stops: AtomicUsize,
        fail_start: AtomicBool,
    }

    impl StreamProbe {
        fn starts(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    struct TestStream {
        probe: Arc<StreamProbe>,
    }

    impl SpeechStream for TestStream {
        fn start(&mut self) -> Result<(), CaptureError> {
            self.probe.starts.fetch_add(1, Ordering::SeqCst);
            if self.probe.fail_start.load(Ordering::SeqCst) {
                return Err(CaptureError::StartFailed("stream refused to start".into()));
            }
            Ok(())
        }

        fn stop(&mut self) {
            self.probe.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller() -> (
        CaptureController,
        Arc<StreamProbe>,
        broadcast::Receiver<CaptureEvent>,
    ) {
        let probe = Arc::new(StreamProbe::default());
        let (event_tx, event_rx) = broadcast::channel(100);
        let stream = Box::new(TestStream {
            probe: probe.clone(),
        });
        (CaptureController::new(stream, event_tx), probe, event_rx)
    }

    fn final_segment(text: &str) -> Segment {
        Segment {
            text: text.to_string(),
            is_final: true,
        }
    }

    fn interim_segment(text: &str) -> Segment {
        Segment {
            text: text.to_string(),
            is_final: false,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<CaptureEvent>) -> Vec<CaptureEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn start_listening(controller: &mut CaptureController) {
        controller.handle_input(Input::Command(Command::Start));
        controller.handle_input(Input::Stream(StreamEvent::Started));
    }

    #[test]
    fn test_start_opens_stream_and_listens() {
        let (mut c, probe, _rx) = controller();
        c.handle_input(Input::Command(Command::Start));
        assert_eq!(probe.starts(), 1);
        assert_eq!(c.snapshot().status, SessionStatus::Idle);
        c.handle_input(Input::Stream(StreamEvent::Started));
        assert_eq!(c.snapshot().status, SessionStatus::Listening);
    }

    #[test]
    fn test_start_while_listening_is_noop() {
        let (mut c, probe, _rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Result(vec![final_segment(
            "hello",
        )])));
        c.handle_input(Input::Command(Command::Start));
        assert_eq!(probe.starts(), 1);
        assert_eq!(c.transcript(), "hello");
    }

    #[test]
    fn test_final_and_interim_accumulation() {
        let (mut c, _probe, _rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Result(vec![final_segment(
            "hello",
        )])));
        c.handle_input(Input::Stream(StreamEvent::Result(vec![interim_segment(
            "world",
        )])));
        let snapshot = c.snapshot();
        assert_eq!(snapshot.transcript, "hello");
        assert_eq!(snapshot.interim, "world");

        c.handle_input(Input::Stream(StreamEvent::Result(vec![final_segment(
            "world there",
        )])));
        let snapshot = c.snapshot();
        assert_eq!(snapshot.transcript, "hello world there");
        assert_eq!(snapshot.interim, "");
    }

    #[test]
    fn test_interim_replaced_wholesale() {
        let (mut c, _probe, _rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Result(vec![interim_segment(
            "one two",
        )])));
        c.handle_input(Input::Stream(StreamEvent::Result(vec![interim_segment(
            "three",
        )])));
        assert_eq!(c.snapshot().interim, "three");
    }

    #[test]
    fn test_mixed_event_joins_finals_in_order() {
        let (mut c, _probe, _rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Result(vec![
            final_segment("good"),
            final_segment("morning"),
            interim_segment("every"),
        ])));
        let snapshot = c.snapshot();
        assert_eq!(snapshot.transcript, "good morning");
        assert_eq!(snapshot.interim, "every");
    }

    #[test]
    fn test_blank_segments_are_ignored() {
        let (mut c, _probe, _rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Result(vec![
            final_segment("   "),
            interim_segment(""),
        ])));
        let snapshot = c.snapshot();
        assert_eq!(snapshot.transcript, "");
        assert_eq!(snapshot.interim, "");
    }

    #[test]
    fn test_results_dropped_while_idle() {
        let (mut c, _probe, _rx) = controller();
        c.handle_input(Input::Stream(StreamEvent::Result(vec![final_segment(
            "ghost",
        )])));
        assert_eq!(c.transcript(), "");
    }

    #[test]
    fn test_stop_then_end_does_not_restart() {
        let (mut c, probe, _rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Result(vec![interim_segment(
            "pending",
        )])));
        c.handle_input(Input::Command(Command::Stop));
        let snapshot = c.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert_eq!(snapshot.interim, "");
        assert_eq!(probe.stops(), 1);

        c.handle_input(Input::Stream(StreamEvent::Ended));
        assert_eq!(probe.starts(), 1);
        assert_eq!(c.snapshot().status, SessionStatus::Idle);
    }

    #[test]
    fn test_end_without_stop_restarts_once_and_preserves_transcript() {
        let (mut c, probe, _rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Result(vec![final_segment(
            "hello",
        )])));

        c.handle_input(Input::Stream(StreamEvent::Ended));
        assert_eq!(probe.starts(), 2);
        assert_eq!(c.transcript(), "hello");

        c.handle_input(Input::Stream(StreamEvent::Started));
        c.handle_input(Input::Stream(StreamEvent::Result(vec![final_segment(
            "world",
        )])));
        c.handle_input(Input::Stream(StreamEvent::Ended));
        assert_eq!(probe.starts(), 3);
        assert_eq!(c.transcript(), "hello world");

        c.handle_input(Input::Stream(StreamEvent::Started));
        c.handle_input(Input::Command(Command::Stop));
        c.handle_input(Input::Stream(StreamEvent::Ended));
        assert_eq!(probe.starts(), 3);
        assert_eq!(c.transcript(), "hello world");
    }

    #[test]
    fn test_restart_failure_returns_to_idle() {
        let (mut c, probe, mut rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Result(vec![final_segment(
            "kept",
        )])));
        probe.fail_start.store(true, Ordering::SeqCst);

        c.handle_input(Input::Stream(StreamEvent::Ended));
        assert_eq!(probe.starts(), 2);
        assert_eq!(c.snapshot().status, SessionStatus::Idle);
        assert_eq!(c.transcript(), "kept");
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, CaptureEvent::RestartFailed { .. })));

        // auto-restart is disabled after the failure
        c.handle_input(Input::Stream(StreamEvent::Ended));
        assert_eq!(probe.starts(), 2);
    }

    #[test]
    fn test_permission_revoked_enters_error_state() {
        let (mut c, probe, mut rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Result(vec![interim_segment(
            "half",
        )])));
        c.handle_input(Input::Stream(StreamEvent::Error(
            StreamErrorKind::PermissionRevoked,
        )));
        let snapshot = c.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Error);
        assert_eq!(snapshot.interim, "");
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, CaptureEvent::PermissionRevoked)));

        // the end that follows must not resurrect the session
        c.handle_input(Input::Stream(StreamEvent::Ended));
        assert_eq!(c.snapshot().status, SessionStatus::Error);

        // no further start succeeds without re-granting
        c.handle_input(Input::Command(Command::Start));
        assert_eq!(probe.starts(), 1);
        assert_eq!(c.snapshot().status, SessionStatus::Error);
    }

    #[test]
    fn test_transient_error_keeps_listening_until_end() {
        let (mut c, probe, _rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Error(StreamErrorKind::NoSpeech)));
        assert_eq!(c.snapshot().status, SessionStatus::Listening);

        c.handle_input(Input::Stream(StreamEvent::Ended));
        assert_eq!(probe.starts(), 2);
    }

    #[test]
    fn test_fresh_start_clears_previous_transcript() {
        let (mut c, probe, _rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Result(vec![final_segment(
            "first note",
        )])));
        c.handle_input(Input::Command(Command::Stop));
        c.handle_input(Input::Stream(StreamEvent::Ended));
        assert_eq!(c.transcript(), "first note");

        c.handle_input(Input::Command(Command::Start));
        assert_eq!(probe.starts(), 2);
        assert_eq!(c.transcript(), "");
    }

    #[test]
    fn test_stop_before_stream_started() {
        let (mut c, probe, mut rx) = controller();
        c.handle_input(Input::Command(Command::Start));
        c.handle_input(Input::Command(Command::Stop));
        assert_eq!(probe.stops(), 1);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, CaptureEvent::Stopped { .. })));

        // a late Started must not flip the session back to listening
        c.handle_input(Input::Stream(StreamEvent::Started));
        assert_eq!(c.snapshot().status, SessionStatus::Idle);
    }

    #[test]
    fn test_stopped_event_carries_transcript() {
        let (mut c, _probe, mut rx) = controller();
        start_listening(&mut c);
        c.handle_input(Input::Stream(StreamEvent::Result(vec![final_segment(
            "note text",
        )])));
        c.handle_input(Input::Command(Command::Stop));
        let events = drain(&mut rx);
        let stopped = events
            .iter()
            .find_map(|e| match e {
                CaptureEvent::Stopped { transcript } => Some(transcript.clone()),
                _ => None,
            })
            .expect("stop should emit a Stopped event");
        assert_eq!(stopped, "note text");
    }
}
