//! Cross-thread schedule requests.
//!
//! Producer threads never touch the queue engine. They push requests into an
//! [`Inbox`] through a [`RemoteScheduler`]; the owner thread drains the inbox
//! at the top of `run()` and after every executed event, stamping each
//! request with the global clock at drain time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_queue::SegQueue;
use kairos_types::Context;

use crate::Simulator;

/// Work sent from a producer thread.
pub type RemoteCallback = Box<dyn FnOnce(&mut Simulator) + Send>;

/// A schedule request waiting for the owner thread.
pub struct RemoteRequest {
    pub context: Context,
    pub delay: u64,
    pub callback: RemoteCallback,
}

impl std::fmt::Debug for RemoteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRequest")
            .field("context", &self.context)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Unbounded lock-free queue of remote requests.
#[derive(Debug)]
pub struct Inbox {
    requests: SegQueue<RemoteRequest>,
    /// Lets the owner skip the queue without touching it on the hot path.
    empty: AtomicBool,
}

impl Default for Inbox {
    fn default() -> Self {
        Self {
            requests: SegQueue::new(),
            empty: AtomicBool::new(true),
        }
    }
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: RemoteRequest) {
        self.requests.push(request);
        self.empty.store(false, Ordering::Release);
    }

    /// Takes every queued request in arrival order.
    ///
    /// Requests pushed while draining are either taken now or leave the
    /// hint cleared for the next drain.
    pub fn drain(&self) -> Vec<RemoteRequest> {
        if self.empty.load(Ordering::Acquire) {
            return Vec::new();
        }
        self.empty.store(true, Ordering::Release);
        let mut batch = Vec::with_capacity(self.requests.len());
        while let Some(request) = self.requests.pop() {
            batch.push(request);
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Sendable handle producer threads use to schedule into a simulator.
#[derive(Debug, Clone)]
pub struct RemoteScheduler {
    inbox: Arc<Inbox>,
}

impl RemoteScheduler {
    pub(crate) fn new(inbox: Arc<Inbox>) -> Self {
        Self { inbox }
    }

    /// Queues `callback` to run in `context`, `delay` after the global clock
    /// at the moment the owner thread picks the request up.
    pub fn schedule_with_context<F>(&self, context: Context, delay: u64, callback: F)
    where
        F: FnOnce(&mut Simulator) + Send + 'static,
    {
        self.inbox.push(RemoteRequest {
            context,
            delay,
            callback: Box::new(callback),
        });
    }

    /// Requests not yet picked up by the owner thread.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(delay: u64) -> RemoteRequest {
        RemoteRequest {
            context: Context::Global,
            delay,
            callback: Box::new(|_| {}),
        }
    }

    #[test]
    fn drain_preserves_arrival_order() {
        let inbox = Inbox::new();
        for delay in [3, 1, 2] {
            inbox.push(request(delay));
        }
        let delays: Vec<_> = inbox.drain().into_iter().map(|r| r.delay).collect();
        assert_eq!(delays, vec![3, 1, 2]);
        assert!(inbox.is_empty());
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn producers_on_many_threads() {
        let inbox = Arc::new(Inbox::new());
        let remote = RemoteScheduler::new(Arc::clone(&inbox));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let remote = remote.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        remote.schedule_with_context(Context::node(t), i, |_| {});
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(remote.pending(), 100);
        assert_eq!(inbox.drain().len(), 100);
    }
}
