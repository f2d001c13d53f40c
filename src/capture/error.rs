//! Error types for the capture module

/// Errors returned by capture session initialization and stream control.
///
/// Failures that arrive asynchronously (access revocation, a failed
/// auto-restart) are reported as [`super::CaptureEvent`]s instead.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CaptureError {
    #[error("no streaming speech-recognition capability is available on this host")]
    UnsupportedCapability,

    #[error("recognition stream failed to start: {0}")]
    StartFailed(String),
}
