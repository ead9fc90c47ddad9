//! Fire-and-forget execution queue.
//!
//! Each submitted request runs on its own worker task; the queue is the
//! sole owner of requests, and workers write results into a shared slot.
//! Completed requests are reclaimed by the drain pass on the host's
//! frame-begin tick.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use tracing::error;

use super::run;

/// Reserved id returned when an async request cannot be started.
pub const INVALID_EXEC_ID: u32 = u32::MAX;

/// What an async request executes.
#[derive(Debug, Clone)]
pub enum ExecKind {
    /// A command line run through the host shell.
    Command(String),
    /// A program spawned with an argv vector.
    Run(String, Vec<String>),
}

/// Completion event for an async request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncExecFinished {
    pub request_id: u32,
    pub exit_code: i32,
}

/// Result slot shared between a request and its worker.
///
/// The worker stores the exit code before publishing the completed flag
/// with release ordering; the drain loop samples with acquire, so an
/// observed completion always carries the final exit code.
#[derive(Debug)]
struct ExecSlot {
    exit_code: AtomicI32,
    completed: AtomicBool,
}

impl ExecSlot {
    fn new() -> Self {
        Self {
            exit_code: AtomicI32::new(0),
            completed: AtomicBool::new(false),
        }
    }

    fn finish(&self, code: i32) {
        self.exit_code.store(code, Ordering::Relaxed);
        self.completed.store(true, Ordering::Release);
    }

    fn poll(&self) -> Option<i32> {
        if self.completed.load(Ordering::Acquire) {
            Some(self.exit_code.load(Ordering::Relaxed))
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct ExecRequest {
    id: u32,
    slot: Arc<ExecSlot>,
}

/// Queue of outstanding async requests.
#[derive(Debug)]
pub struct ExecQueue {
    next_id: AtomicU32,
    pending: Mutex<Vec<ExecRequest>>,
}

impl Default for ExecQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecQueue {
    /// Create an empty queue. Ids start at 1; 0 and `u32::MAX` are reserved.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Allocate the next request id, wrapping from `u32::MAX - 1` back to 1.
    fn allocate_id(&self) -> u32 {
        self.next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| {
                let next = id.wrapping_add(1);
                Some(if next == u32::MAX { 1 } else { next })
            })
            .unwrap_or(INVALID_EXEC_ID)
    }

    /// Enqueue a request and start its worker. Returns the request id, or
    /// [`INVALID_EXEC_ID`] when no async runtime is reachable.
    pub fn submit(&self, kind: ExecKind) -> u32 {
        if tokio::runtime::Handle::try_current().is_err() {
            error!("cannot execute asynchronously outside a runtime");
            return INVALID_EXEC_ID;
        }

        let id = self.allocate_id();
        let slot = Arc::new(ExecSlot::new());

        {
            let Ok(mut pending) = self.pending.lock() else {
                return INVALID_EXEC_ID;
            };
            pending.push(ExecRequest {
                id,
                slot: Arc::clone(&slot),
            });
        }

        tokio::spawn(async move {
            let code = match kind {
                ExecKind::Command(line) => run::system_command(&line, false).await,
                ExecKind::Run(file, args) => run::system_run(&file, &args).await,
            };
            slot.finish(code);
        });

        id
    }

    /// Remove completed requests and return their completion events, in
    /// queue-iteration order.
    pub fn drain_completed(&self) -> Vec<AsyncExecFinished> {
        let Ok(mut pending) = self.pending.lock() else {
            return Vec::new();
        };

        let mut finished = Vec::new();
        pending.retain(|request| match request.slot.poll() {
            Some(exit_code) => {
                finished.push(AsyncExecFinished {
                    request_id: request.id,
                    exit_code,
                });
                false
            }
            None => true,
        });
        finished
    }

    /// Number of requests not yet reclaimed by the drain pass.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn drain_until_done(queue: &ExecQueue) -> Vec<AsyncExecFinished> {
        let mut events = Vec::new();
        for _ in 0..500 {
            events.extend(queue.drain_completed());
            if queue.pending_len() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        events
    }

    #[tokio::test]
    async fn test_submit_and_drain() {
        let queue = ExecQueue::new();
        let id = queue.submit(ExecKind::Command("true".to_string()));
        assert_ne!(id, 0);
        assert_ne!(id, INVALID_EXEC_ID);

        let events = drain_until_done(&queue).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request_id, id);
        assert_eq!(events[0].exit_code, 0);
    }

    #[tokio::test]
    async fn test_exit_code_propagated() {
        let queue = ExecQueue::new();
        let id = queue.submit(ExecKind::Command("exit 7".to_string()));

        let events = drain_until_done(&queue).await;
        assert_eq!(events, vec![AsyncExecFinished {
            request_id: id,
            exit_code: 7,
        }]);
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_nonzero() {
        let queue = ExecQueue::new();
        let a = queue.submit(ExecKind::Command("true".to_string()));
        let b = queue.submit(ExecKind::Run("true".to_string(), Vec::new()));
        assert_ne!(a, b);
        assert_ne!(a, 0);
        assert_ne!(b, 0);

        drain_until_done(&queue).await;
    }

    #[tokio::test]
    async fn test_id_wraps_past_max() {
        let queue = ExecQueue::new();
        queue.next_id.store(u32::MAX - 1, Ordering::SeqCst);

        assert_eq!(queue.allocate_id(), u32::MAX - 1);
        // Wrapped: MAX is never handed out, the counter restarts at 1.
        assert_eq!(queue.allocate_id(), 1);
    }

    #[tokio::test]
    async fn test_drain_is_nonblocking() {
        let queue = ExecQueue::new();
        queue.submit(ExecKind::Command("sleep 5".to_string()));

        // The request is still running; drain must return immediately.
        assert!(queue.drain_completed().is_empty());
        assert_eq!(queue.pending_len(), 1);
    }
}
