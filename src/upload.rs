// ============================================================================
// UPLOAD COORDINATOR: single-flight mask persistence with one catch-up
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc;

use crate::canvas::MaskSurface;
use crate::io::{BlobStore, IoResult, StoreError};
use crate::logger::LogScope;

/// Where the coordinator is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum UploadState {
    #[default]
    Idle,
    Uploading,
    /// A mutation settled while the current upload was in flight.
    UploadingWithPendingRepeat,
}

/// What a settle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettleOutcome {
    /// An upload job was spawned.
    Started,
    /// An upload is already in flight; one catch-up is now queued.
    Queued,
    /// The mask is empty: the handle should be cleared, nothing was sent.
    Emptied,
    /// Nothing to persist (zero-size surface, or serialization failed).
    Skipped,
}

/// How a finished upload should be applied by the owner.
#[derive(Debug)]
pub struct UploadCompletion {
    pub generation: u64,
    pub result: Result<String, StoreError>,
    /// A mutation settled mid-flight: settle once more now.
    pub repeat: bool,
}

/// Enforces at most one upload in flight.  Extra settles during an upload
/// collapse into a single follow-up, since only the latest mask matters.
pub struct UploadCoordinator {
    state: UploadState,
    sender: mpsc::Sender<IoResult>,
    uploads_started: u64,
}

impl UploadCoordinator {
    /// `sender` is the owner's job channel; completions arrive as
    /// [`IoResult::MaskUploaded`] and must be handed back via [`finish`](Self::finish).
    pub fn new(sender: mpsc::Sender<IoResult>) -> Self {
        Self {
            state: UploadState::Idle,
            sender,
            uploads_started: 0,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state != UploadState::Idle
    }

    /// Total upload jobs spawned over the coordinator's lifetime.
    pub fn uploads_started(&self) -> u64 {
        self.uploads_started
    }

    /// A mutation settled.  The surface is serialized here, on the caller's
    /// thread, and only the bytes travel to the background job, tagged with
    /// the generation in `scope`.
    pub fn settle(
        &mut self,
        surface: &MaskSurface,
        store: &Arc<dyn BlobStore>,
        scope: LogScope,
    ) -> SettleOutcome {
        if self.is_busy() {
            self.state = UploadState::UploadingWithPendingRepeat;
            return SettleOutcome::Queued;
        }

        if !surface.has_area() {
            return SettleOutcome::Skipped;
        }
        if surface.is_empty() {
            return SettleOutcome::Emptied;
        }

        let bytes = match surface.serialize() {
            Ok(bytes) => bytes,
            Err(e) => {
                log_err!(@scope, "Mask serialization failed, upload skipped: {}", e);
                return SettleOutcome::Skipped;
            }
        };

        self.state = UploadState::Uploading;
        self.uploads_started += 1;
        let store = Arc::clone(store);
        let sender = self.sender.clone();
        log_info!(@scope, "Uploading mask ({} bytes)", bytes.len());
        let generation = scope.generation;
        rayon::spawn(move || {
            let result = store.upload(bytes);
            // Receiver dropped means the project is gone; nothing to report to.
            let _ = sender.send(IoResult::MaskUploaded { generation, result });
        });
        SettleOutcome::Started
    }

    /// Forget a queued catch-up.  The in-flight upload still completes and
    /// must be passed to [`finish`](Self::finish).
    pub fn drop_pending_repeat(&mut self) {
        if self.state == UploadState::UploadingWithPendingRepeat {
            self.state = UploadState::Uploading;
        }
    }

    /// Account for a finished upload and return to Idle.
    pub fn finish(&mut self, generation: u64, result: Result<String, StoreError>) -> UploadCompletion {
        let repeat = self.state == UploadState::UploadingWithPendingRepeat;
        self.state = UploadState::Idle;
        UploadCompletion {
            generation,
            result,
            repeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Point;
    use crate::io::MemoryStore;
    use std::time::Duration;
    use uuid::Uuid;

    fn scope(generation: u64) -> LogScope {
        LogScope {
            project: Uuid::nil(),
            generation,
        }
    }

    fn painted_surface() -> MaskSurface {
        let mut s = MaskSurface::new(16, 16);
        s.stroke_segment(None, Point::new(8.0, 8.0), 3.0, false);
        s
    }

    fn recv_upload(rx: &mpsc::Receiver<IoResult>) -> (u64, Result<String, StoreError>) {
        match rx.recv_timeout(Duration::from_secs(10)).expect("upload result") {
            IoResult::MaskUploaded { generation, result } => (generation, result),
            _ => panic!("unexpected job result"),
        }
    }

    #[test]
    fn settle_while_uploading_queues_a_single_repeat() {
        let (tx, rx) = mpsc::channel();
        let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
        let mut up = UploadCoordinator::new(tx);
        let surface = painted_surface();

        assert_eq!(up.settle(&surface, &store, scope(1)), SettleOutcome::Started);
        assert_eq!(up.state(), UploadState::Uploading);
        assert_eq!(up.settle(&surface, &store, scope(1)), SettleOutcome::Queued);
        assert_eq!(up.settle(&surface, &store, scope(1)), SettleOutcome::Queued);
        assert_eq!(up.state(), UploadState::UploadingWithPendingRepeat);
        assert_eq!(up.uploads_started(), 1);

        let (generation, result) = recv_upload(&rx);
        let done = up.finish(generation, result);
        assert!(done.repeat);
        assert!(done.result.is_ok());
        assert_eq!(up.state(), UploadState::Idle);

        assert_eq!(up.settle(&surface, &store, scope(1)), SettleOutcome::Started);
        let (generation, result) = recv_upload(&rx);
        assert!(!up.finish(generation, result).repeat);
        assert_eq!(up.uploads_started(), 2);
    }

    #[test]
    fn empty_and_zero_size_surfaces_never_hit_the_store() {
        let (tx, rx) = mpsc::channel();
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn BlobStore> = memory.clone();
        let mut up = UploadCoordinator::new(tx);

        assert_eq!(up.settle(&MaskSurface::new(8, 8), &store, scope(0)), SettleOutcome::Emptied);
        assert_eq!(up.settle(&MaskSurface::default(), &store, scope(0)), SettleOutcome::Skipped);
        assert_eq!(up.state(), UploadState::Idle);
        assert_eq!(up.uploads_started(), 0);
        assert!(rx.try_recv().is_err());
        assert!(memory.is_empty());
    }

    #[test]
    fn dropped_repeat_does_not_come_back_on_finish() {
        let (tx, rx) = mpsc::channel();
        let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
        let mut up = UploadCoordinator::new(tx);
        let surface = painted_surface();

        up.settle(&surface, &store, scope(1));
        up.settle(&surface, &store, scope(1));
        up.drop_pending_repeat();
        assert_eq!(up.state(), UploadState::Uploading);
        assert!(up.is_busy());

        let (generation, result) = recv_upload(&rx);
        let done = up.finish(generation, result);
        assert!(!done.repeat);
        assert_eq!(up.state(), UploadState::Idle);

        // Nothing queued on an idle coordinator.
        up.drop_pending_repeat();
        assert_eq!(up.state(), UploadState::Idle);
    }

    #[test]
    fn failed_upload_returns_to_idle() {
        let (tx, _rx) = mpsc::channel();
        let mut up = UploadCoordinator::new(tx);
        let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
        up.settle(&painted_surface(), &store, scope(3));
        let done = up.finish(3, Err(StoreError::Rejected("offline".to_string())));
        assert!(done.result.is_err());
        assert!(!done.repeat);
        assert!(!up.is_busy());
    }
}
