//! Per-observer reliable delivery

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::ws::protocol::ServerMsg;

use super::replication::{Audience, Outbound};
use super::ParticipantId;

/// Reliable messages buffered per observer before it is dropped as too slow
pub const OBSERVER_BUFFER: usize = 1024;

/// Ordered reliable streams, one per connected observer.
///
/// Replication only sends diffs, so an observer that cannot keep up is
/// disconnected instead of having messages skipped.
#[derive(Clone)]
pub struct ObserverRegistry {
    capacity: usize,
    senders: Arc<DashMap<ParticipantId, mpsc::Sender<ServerMsg>>>,
}

impl ObserverRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            senders: Arc::new(DashMap::new()),
        }
    }

    /// Open the reliable stream for a new connection
    pub fn register(&self, participant: ParticipantId) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.senders.insert(participant, tx);
        rx
    }

    pub fn unregister(&self, participant: ParticipantId) {
        self.senders.remove(&participant);
    }

    #[cfg(test)]
    pub fn is_registered(&self, participant: ParticipantId) -> bool {
        self.senders.contains_key(&participant)
    }

    /// Route one tick's reliable messages to their audiences, in order.
    ///
    /// Returns the observers dropped because their buffer was full. Their
    /// receivers yield what was already queued and then close.
    pub fn deliver(&self, messages: Vec<Outbound>) -> Vec<ParticipantId> {
        let mut overflowed = Vec::new();
        if messages.is_empty() {
            return overflowed;
        }

        for Outbound { audience, msg } in messages {
            let mut failed = Vec::new();
            match audience {
                Audience::Owner(owner) => {
                    if let Some(tx) = self.senders.get(&owner) {
                        if let Err(e) = tx.try_send(msg) {
                            failed.push((owner, matches!(e, TrySendError::Full(_))));
                        }
                    }
                }
                Audience::All => {
                    for entry in self.senders.iter() {
                        if let Err(e) = entry.value().try_send(msg.clone()) {
                            failed.push((*entry.key(), matches!(e, TrySendError::Full(_))));
                        }
                    }
                }
            }

            for (participant, full) in failed {
                self.senders.remove(&participant);
                if full {
                    warn!(
                        participant_id = %participant,
                        capacity = self.capacity,
                        "Observer fell behind, disconnecting"
                    );
                    overflowed.push(participant);
                } else {
                    debug!(participant_id = %participant, "Observer stream closed");
                }
            }
        }
        overflowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pong(t: u64) -> Outbound {
        Outbound {
            audience: Audience::All,
            msg: ServerMsg::Pong { t },
        }
    }

    #[test]
    fn owner_messages_reach_only_their_owner() {
        let registry = ObserverRegistry::new(8);
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        let mut rx_a = registry.register(a);
        let mut rx_b = registry.register(b);

        registry.deliver(vec![
            Outbound {
                audience: Audience::Owner(a),
                msg: ServerMsg::HostAssigned,
            },
            pong(1),
        ]);

        assert_eq!(rx_a.try_recv().unwrap(), ServerMsg::HostAssigned);
        assert_eq!(rx_a.try_recv().unwrap(), ServerMsg::Pong { t: 1 });
        assert_eq!(rx_b.try_recv().unwrap(), ServerMsg::Pong { t: 1 });
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn full_observer_is_disconnected_after_its_queued_messages() {
        let registry = ObserverRegistry::new(2);
        let slow = ParticipantId::new();
        let fast = ParticipantId::new();
        let mut slow_rx = registry.register(slow);
        let mut fast_rx = registry.register(fast);

        let mut overflowed = registry.deliver(vec![pong(1), pong(2)]);
        assert!(overflowed.is_empty());
        for t in 1..=2 {
            assert_eq!(fast_rx.try_recv().unwrap(), ServerMsg::Pong { t });
        }

        overflowed = registry.deliver(vec![pong(3), pong(4)]);
        assert_eq!(overflowed, vec![slow]);
        assert!(!registry.is_registered(slow));
        assert!(registry.is_registered(fast));

        // no gap: the slow observer sees a prefix, then the stream ends
        assert_eq!(slow_rx.try_recv().unwrap(), ServerMsg::Pong { t: 1 });
        assert_eq!(slow_rx.try_recv().unwrap(), ServerMsg::Pong { t: 2 });
        assert_eq!(
            slow_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        );

        assert_eq!(fast_rx.try_recv().unwrap(), ServerMsg::Pong { t: 3 });
        assert_eq!(fast_rx.try_recv().unwrap(), ServerMsg::Pong { t: 4 });
    }

    #[test]
    fn closed_receiver_is_pruned_quietly() {
        let registry = ObserverRegistry::new(4);
        let gone = ParticipantId::new();
        drop(registry.register(gone));

        assert!(registry.deliver(vec![pong(1)]).is_empty());
        assert!(!registry.is_registered(gone));
    }
}
