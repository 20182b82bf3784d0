use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-slot, non-blocking mutual exclusion for bulk uploads.
///
/// `try_acquire` never waits: if the slot is taken it returns `None` at once.
#[derive(Debug, Clone, Default)]
pub struct UploadGuard {
    held: Arc<AtomicBool>,
}

impl UploadGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<UploadPermit> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| UploadPermit {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the slot when dropped, on every exit path
#[derive(Debug)]
pub struct UploadPermit {
    held: Arc<AtomicBool>,
}

impl Drop for UploadPermit {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}
