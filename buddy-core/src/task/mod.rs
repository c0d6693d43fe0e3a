//! Tracked outgoing sends.
//!
//! Every payload a conversation sends runs as its own task so the
//! conversation never waits on the network. The pool keeps the join
//! handles, reports each outcome back over a channel, and aborts whatever
//! is still in flight when it is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::conversation::MessageId;
use crate::network::Outbound;
use crate::payload::Payload;

/// Result of one finished send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub task_id: u64,
    /// Log entry whose delivery status depends on this send, if any.
    pub message: Option<MessageId>,
    pub delivered: bool,
}

pub struct SendTaskPool {
    outbound: Arc<dyn Outbound>,
    tasks: HashMap<u64, JoinHandle<()>>,
    next_task_id: u64,
    pool_tx: mpsc::UnboundedSender<SendOutcome>,
    pool_rx: mpsc::UnboundedReceiver<SendOutcome>,
}

impl SendTaskPool {
    pub fn new(outbound: Arc<dyn Outbound>) -> Self {
        let (pool_tx, pool_rx) = mpsc::unbounded_channel();
        Self {
            outbound,
            tasks: HashMap::new(),
            next_task_id: 1,
            pool_tx,
            pool_rx,
        }
    }

    /// Start delivering `payload` in the background.
    pub fn spawn(&mut self, payload: Payload, message: Option<MessageId>) -> u64 {
        let task_id = self.next_task_id;
        self.next_task_id += 1;

        let outbound = Arc::clone(&self.outbound);
        let tx = self.pool_tx.clone();
        let handle = tokio::spawn(async move {
            let delivered = outbound.deliver(payload).await;
            let _ = tx.send(SendOutcome {
                task_id,
                message,
                delivered,
            });
        });
        self.tasks.insert(task_id, handle);
        task_id
    }

    /// Wait for the next finished send.
    ///
    /// Pends forever while nothing is in flight, which makes it safe to
    /// poll from a `select!` loop.
    pub async fn next_outcome(&mut self) -> SendOutcome {
        loop {
            if let Some(outcome) = self.pool_rx.recv().await {
                self.tasks.remove(&outcome.task_id);
                return outcome;
            }
            // Unreachable while `pool_tx` is alive.
            std::future::pending::<()>().await;
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Abort every send that has not finished yet.
    pub fn abort_all(&mut self) {
        if !self.tasks.is_empty() {
            debug!("aborting {} in-flight sends", self.tasks.len());
        }
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}

impl Drop for SendTaskPool {
    fn drop(&mut self) {
        self.abort_all();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixed(bool);

    #[async_trait]
    impl Outbound for Fixed {
        async fn deliver(&self, _payload: Payload) -> bool {
            self.0
        }
    }

    struct Never;

    #[async_trait]
    impl Outbound for Never {
        async fn deliver(&self, _payload: Payload) -> bool {
            std::future::pending::<()>().await;
            true
        }
    }

    #[tokio::test]
    async fn outcome_carries_message_and_status() {
        let mut pool = SendTaskPool::new(Arc::new(Fixed(false)));
        let id = pool.spawn(Payload::text("hi"), Some(MessageId(4)));

        let outcome = tokio::time::timeout(Duration::from_secs(5), pool.next_outcome())
            .await
            .expect("timeout");
        assert_eq!(
            outcome,
            SendOutcome {
                task_id: id,
                message: Some(MessageId(4)),
                delivered: false
            }
        );
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn abort_all_cancels_pending_sends() {
        let mut pool = SendTaskPool::new(Arc::new(Never));
        pool.spawn(Payload::Nudge, None);
        pool.spawn(Payload::TypingStart, None);
        assert_eq!(pool.in_flight(), 2);

        pool.abort_all();
        assert_eq!(pool.in_flight(), 0);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), pool.next_outcome())
                .await
                .is_err()
        );
    }
}
