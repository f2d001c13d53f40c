//! Host speech-recognition capability interface
//!
//! The app ships no recognizer of its own; whatever the host provides is
//! reached through these traits. A capability opens an unstarted stream and
//! the stream reports back through [`StreamEvent`]s on the channel it was
//! given at open time.

use super::error::CaptureError;
use tokio::sync::mpsc;

/// Channel on which an open stream delivers its events.
pub(crate) type StreamEventSender = mpsc::UnboundedSender<StreamEvent>;

/// One recognition hypothesis delivered by the host service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub text: String,
    /// Final segments will not be revised further; interim segments are the
    /// current best guess for in-progress audio.
    pub is_final: bool,
}

/// Events emitted by an open recognition stream.
#[derive(Debug, Clone)]
pub(crate) enum StreamEvent {
    /// The stream is live and audio is being recognized
    Started,
    /// A batch of recognition hypotheses
    Result(Vec<Segment>),
    /// The stream hit an error; a separate `Ended` usually follows
    Error(StreamErrorKind),
    /// The stream terminated (host utterance window, stop, or failure)
    Ended,
}

/// Error classification reported by the host stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub(crate) enum StreamErrorKind {
    /// Microphone access was withdrawn while the stream was open
    PermissionRevoked,
    /// No speech was detected within the host's utterance window
    NoSpeech,
    /// Audio capture failed (device unplugged or claimed elsewhere)
    AudioCapture,
    /// The recognition service could not be reached
    Network,
    /// The stream was aborted by the host
    Aborted,
}

/// A streaming speech-recognition service offered by the host.
pub(crate) trait SpeechCapability: Send + Sync {
    /// Open an unstarted recognition stream for `locale`.
    ///
    /// Events for the stream's whole lifetime are delivered on `events`,
    /// including across restarts of the same stream handle.
    fn open(
        &self,
        locale: &str,
        events: StreamEventSender,
    ) -> Result<Box<dyn SpeechStream>, CaptureError>;
}

/// An open recognition stream. `start` and `stop` request state changes;
/// the outcome arrives later as stream events.
pub(crate) trait SpeechStream: Send {
    fn start(&mut self) -> Result<(), CaptureError>;
    fn stop(&mut self);
}
