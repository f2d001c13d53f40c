//! Replay capability for driving the capture pipeline from a text file
//!
//! Each non-empty line of the script is one utterance. A stream run plays a
//! single utterance as growing interim hypotheses followed by one final
//! segment, then ends on its own the way hosts with a bounded utterance
//! window do, so consecutive lines flow through the session's auto-restart.
//! Starting an exhausted script fails, which ends the session.

use super::capability::{Segment, SpeechCapability, SpeechStream, StreamEvent, StreamEventSender};
use super::error::CaptureError;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Delay between successive interim hypotheses
const HYPOTHESIS_DELAY: Duration = Duration::from_millis(120);

pub(crate) struct ReplayCapability {
    utterances: Vec<String>,
}

impl ReplayCapability {
    pub(crate) fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_script(&std::fs::read_to_string(path)?))
    }

    pub(crate) fn from_script(script: &str) -> Self {
        let utterances = script
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { utterances }
    }
}

impl SpeechCapability for ReplayCapability {
    fn open(
        &self,
        _locale: &str,
        events: StreamEventSender,
    ) -> Result<Box<dyn SpeechStream>, CaptureError> {
        Ok(Box::new(ReplayStream {
            pending: self.utterances.clone().into(),
            events,
            cancelled: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct ReplayStream {
    pending: VecDeque<String>,
    events: StreamEventSender,
    cancelled: Arc<AtomicBool>,
}

impl SpeechStream for ReplayStream {
    fn start(&mut self) -> Result<(), CaptureError> {
        let Some(utterance) = self.pending.pop_front() else {
            return Err(CaptureError::StartFailed(
                "replay script exhausted".to_string(),
            ));
        };
        self.cancelled.store(false, Ordering::SeqCst);
        let events = self.events.clone();
        let cancelled = self.cancelled.clone();
        tokio::spawn(async move {
            let _ = events.send(StreamEvent::Started);
            let words: Vec<&str> = utterance.split_whitespace().collect();
            for end in 1..=words.len() {
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }
                let _ = events.send(StreamEvent::Result(vec![Segment {
                    text: words[..end].join(" "),
                    is_final: false,
                }]));
                sleep(HYPOTHESIS_DELAY).await;
            }
            if !cancelled.load(Ordering::SeqCst) {
                let _ = events.send(StreamEvent::Result(vec![Segment {
                    text: utterance,
                    is_final: true,
                }]));
            }
            let _ = events.send(StreamEvent::Ended);
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
