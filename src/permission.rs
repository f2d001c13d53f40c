//! Microphone permission gate
//!
//! Resolves microphone access before a capture session may start. The gate
//! only needs permission, not a live audio handle: the default probe acquires
//! the platform's default input device, opens an input stream just long
//! enough for the host to resolve access, and releases it before reporting
//! the grant. The gate keeps no state between calls; callers track the last
//! outcome as [`PermissionState`].

use tracing::{info, warn};

/// Microphone permission as tracked by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum PermissionState {
    /// Not yet resolved
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Denial reasons reported by the gate
#[derive(Debug, thiserror::Error)]
pub(crate) enum PermissionError {
    #[error("no audio input device is available")]
    NoInputDevice,

    #[error("audio input device could not be acquired: {0}")]
    DeviceUnavailable(String),
}

/// A probe that resolves microphone access, releasing any acquired handle
/// before it returns.
pub(crate) trait MicrophoneProbe: Send + Sync {
    fn request_microphone(&self) -> Result<(), PermissionError>;
}

/// Probe backed by the default cpal input device.
pub(crate) struct InputDeviceProbe;

impl MicrophoneProbe for InputDeviceProbe {
    fn request_microphone(&self) -> Result<(), PermissionError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(PermissionError::NoInputDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let config = device
            .default_input_config()
            .map_err(|e| PermissionError::DeviceUnavailable(e.to_string()))?;
        let stream = device
            .build_input_stream_raw(
                &config.config(),
                config.sample_format(),
                |_, _| {},
                |err| warn!("probe stream error: {}", err),
                None,
            )
            .map_err(|e| PermissionError::DeviceUnavailable(e.to_string()))?;
        stream
            .play()
            .map_err(|e| PermissionError::DeviceUnavailable(e.to_string()))?;

        // release the device before reporting the grant so it never competes
        // with the capture session's own stream
        drop(stream);
        info!("microphone probe succeeded on device: {}", device_name);
        Ok(())
    }
}

/// Probe for hosts that manage microphone access themselves (e.g. replay);
/// grants without touching the audio stack.
pub(crate) struct TrustedProbe;

impl MicrophoneProbe for TrustedProbe {
    fn request_microphone(&self) -> Result<(), PermissionError> {
        Ok(())
    }
}

/// Gate that resolves microphone access through a probe.
pub(crate) struct PermissionGate {
    probe: Box<dyn MicrophoneProbe>,
}

impl PermissionGate {
    pub(crate) fn new(probe: Box<dyn MicrophoneProbe>) -> Self {
        Self { probe }
    }

    pub(crate) fn with_default_probe() -> Self {
        Self::new(Box::new(InputDeviceProbe))
    }

    /// Request microphone access once. Ok means granted with the probe handle
    /// already released; Err carries a human-readable denial reason. Safe to
    /// call again after a denial.
    pub(crate) fn request_access(&self) -> Result<(), PermissionError> {
        match self.probe.request_microphone() {
            Ok(()) => {
                info!("microphone access granted");
                Ok(())
            }
            Err(e) => {
                warn!("microphone access denied: {}", e);
                Err(e)
            }
        }
    }
}
