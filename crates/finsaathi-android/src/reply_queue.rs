/// Thread-safe reply queue for worker threads to Main Thread communication
///
/// Channel calls are executed on the bridge's worker runtime, but Flutter's
/// reply callbacks must be invoked on the Android main thread. Workers push
/// finished replies here; the activity drains them from its main looper.
///
/// Architecture: JNI Thread → Worker Runtime → Reply Queue → Main UI Thread → App
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use serde_json::Value;

use finsaathi_channel::Outcome;

/// A finished call, ready to be handed back to the application layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingReply {
    /// Call id chosen by the Java side
    pub id: i64,
    /// Reply envelope (`[value]`, `[code, message, details]` or `null`)
    pub envelope: Value,
}

impl PendingReply {
    pub fn new(id: i64, outcome: &Outcome) -> Self {
        Self {
            id,
            envelope: outcome.to_envelope(),
        }
    }
}

/// Thread-safe reply queue; clones share the same queue
#[derive(Clone)]
pub struct ReplyQueue {
    sender: Sender<PendingReply>,
    receiver: Receiver<PendingReply>,
}

impl ReplyQueue {
    /// Create a new reply queue
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Push a reply from any thread
    pub fn send(&self, reply: PendingReply) -> Result<()> {
        self.sender
            .send(reply)
            .map_err(|e| anyhow::anyhow!("Failed to queue reply: {}", e))
    }

    /// Drain all pending replies on the main thread
    pub fn drain(&self) -> Vec<PendingReply> {
        self.receiver.try_iter().collect()
    }
}

impl Default for ReplyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drain_preserves_push_order() {
        let queue = ReplyQueue::new();
        queue
            .send(PendingReply::new(1, &Outcome::Success(json!(true))))
            .unwrap();
        queue.send(PendingReply::new(2, &Outcome::Unsupported)).unwrap();

        let replies = queue.drain();
        assert_eq!(replies.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn clones_send_across_threads() {
        let queue = ReplyQueue::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sender = queue.clone();
                std::thread::spawn(move || {
                    sender
                        .send(PendingReply::new(i, &Outcome::Success(json!(i))))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut ids: Vec<i64> = queue.drain().into_iter().map(|r| r.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn reply_serializes_with_envelope() {
        let reply = PendingReply::new(9, &Outcome::failure("GOOGLE_SIGN_IN_ERROR", "boom"));
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"id": 9, "envelope": ["GOOGLE_SIGN_IN_ERROR", "boom", null]})
        );
    }
}
