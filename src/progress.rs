//! Fractured Key - Progress Reporting & Cancellation
//!
//! The engine never talks to a UI directly. It reports stage transitions
//! and per-carrier outcomes to a [`ProgressObserver`] supplied by the
//! caller, and polls a [`CancelToken`] between stages.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

/// Workflow stages of both paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Deriving,
    Encrypting,
    Splitting,
    Embedding,
    Extracting,
    Combining,
    Decrypting,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Deriving => "deriving key",
            Stage::Encrypting => "encrypting",
            Stage::Splitting => "splitting",
            Stage::Embedding => "embedding",
            Stage::Extracting => "extracting",
            Stage::Combining => "combining",
            Stage::Decrypting => "decrypting",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Something the engine wants the caller to know about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The workflow entered a new stage
    Stage(Stage),
    /// A carrier finished processing
    Carrier {
        index: usize,
        total: usize,
        path: PathBuf,
        ok: bool,
    },
    /// The workflow ended in failure while in `stage`
    Failed { stage: Stage, reason: String },
}

/// Receives progress from a running workflow.
///
/// Called from worker threads during parallel embed/extract.
pub trait ProgressObserver: Send + Sync {
    fn notify(&self, event: ProgressEvent);
}

/// Observer that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn notify(&self, _event: ProgressEvent) {}
}

/// Forwards events over a channel, e.g. to a UI thread
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<ProgressEvent>,
}

impl ChannelObserver {
    /// New observer plus the receiving end
    pub fn unbounded() -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl ProgressObserver for ChannelObserver {
    fn notify(&self, event: ProgressEvent) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl<F> ProgressObserver for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn notify(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Cooperative cancellation flag shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_delivers() {
        let (observer, rx) = ChannelObserver::unbounded();
        observer.notify(ProgressEvent::Stage(Stage::Deriving));
        observer.notify(ProgressEvent::Stage(Stage::Done));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![ProgressEvent::Stage(Stage::Deriving), ProgressEvent::Stage(Stage::Done)]
        );
    }

    #[test]
    fn test_channel_observer_survives_dropped_receiver() {
        let (observer, rx) = ChannelObserver::unbounded();
        drop(rx);
        observer.notify(ProgressEvent::Stage(Stage::Idle));
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Deriving.to_string(), "deriving key");
    }
}
