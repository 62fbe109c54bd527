//! Replicated state tracking and outbound message routing

use crate::ws::protocol::{FieldChange, ServerMsg};

use super::ParticipantId;

/// Value whose changes are pushed from the authority to observers.
///
/// A fresh value starts dirty so the first diff announces it.
#[derive(Debug, Clone)]
pub struct Replicated<T> {
    value: T,
    dirty: bool,
}

impl<T: PartialEq> Replicated<T> {
    pub fn new(value: T) -> Self {
        Self { value, dirty: true }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Marks dirty only when the value actually changes
    pub fn set(&mut self, value: T) {
        if self.value != value {
            self.value = value;
            self.dirty = true;
        }
    }

    #[cfg(test)]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The value if it changed since the last call
    pub fn take_dirty(&mut self) -> Option<&T> {
        if std::mem::take(&mut self.dirty) {
            Some(&self.value)
        } else {
            None
        }
    }
}

/// Who receives a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Owner(ParticipantId),
}

impl Audience {
    pub fn includes(self, participant: ParticipantId) -> bool {
        match self {
            Audience::All => true,
            Audience::Owner(owner) => owner == participant,
        }
    }
}

/// A field change plus who may see it
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicatedChange {
    pub audience: Audience,
    pub change: FieldChange,
}

impl ReplicatedChange {
    pub fn all(change: FieldChange) -> Self {
        Self {
            audience: Audience::All,
            change,
        }
    }

    pub fn owner(owner: ParticipantId, change: FieldChange) -> Self {
        Self {
            audience: Audience::Owner(owner),
            change,
        }
    }
}

/// Exposes replicated fields as diffs
pub trait Replicable {
    /// Drain fields that changed since the last call
    fn collect_changes(&mut self, out: &mut Vec<ReplicatedChange>);

    /// Every replicated field, for observers that just arrived
    fn full_state(&self, out: &mut Vec<ReplicatedChange>);
}

/// Message addressed to an audience
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub audience: Audience,
    pub msg: ServerMsg,
}

/// Messages produced by one tick of authoritative work.
///
/// Reliable messages must reach their audience in order; unreliable ones
/// are cosmetic and may be dropped under load.
#[derive(Debug, Default)]
pub struct Outbox {
    reliable: Vec<Outbound>,
    unreliable: Vec<Outbound>,
}

impl Outbox {
    pub fn send(&mut self, audience: Audience, msg: ServerMsg) {
        self.reliable.push(Outbound { audience, msg });
    }

    pub fn multicast_unreliable(&mut self, msg: ServerMsg) {
        self.unreliable.push(Outbound {
            audience: Audience::All,
            msg,
        });
    }

    /// Take (reliable, unreliable) messages queued so far
    pub fn drain(&mut self) -> (Vec<Outbound>, Vec<Outbound>) {
        (
            std::mem::take(&mut self.reliable),
            std::mem::take(&mut self.unreliable),
        )
    }

    #[cfg(test)]
    pub fn reliable(&self) -> &[Outbound] {
        &self.reliable
    }

    #[cfg(test)]
    pub fn unreliable(&self) -> &[Outbound] {
        &self.unreliable
    }
}

/// Packs a tick's changes into one message per audience
pub struct ReplicationBuilder;

impl ReplicationBuilder {
    pub fn build(tick: u64, changes: Vec<ReplicatedChange>) -> Vec<Outbound> {
        let mut shared = Vec::new();
        let mut per_owner: Vec<(ParticipantId, Vec<FieldChange>)> = Vec::new();

        for ReplicatedChange { audience, change } in changes {
            match audience {
                Audience::All => shared.push(change),
                Audience::Owner(owner) => match per_owner.iter_mut().find(|(p, _)| *p == owner) {
                    Some((_, owned)) => owned.push(change),
                    None => per_owner.push((owner, vec![change])),
                },
            }
        }

        let mut messages = Vec::with_capacity(per_owner.len() + 1);
        if !shared.is_empty() {
            messages.push(Outbound {
                audience: Audience::All,
                msg: ServerMsg::Replicate {
                    tick,
                    changes: shared,
                },
            });
        }
        for (owner, changes) in per_owner {
            messages.push(Outbound {
                audience: Audience::Owner(owner),
                msg: ServerMsg::Replicate { tick, changes },
            });
        }
        messages
    }

    /// State visible to one participant, for its join confirmation
    pub fn visible_to(participant: ParticipantId, state: Vec<ReplicatedChange>) -> Vec<FieldChange> {
        state
            .into_iter()
            .filter(|c| c.audience.includes(participant))
            .map(|c| c.change)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_marks_dirty_only_on_change() {
        let mut flag = Replicated::new(true);
        assert_eq!(flag.take_dirty(), Some(&true));
        assert_eq!(flag.take_dirty(), None);

        flag.set(true);
        assert!(!flag.is_dirty());

        flag.set(false);
        assert_eq!(flag.take_dirty(), Some(&false));
    }

    #[test]
    fn owner_changes_are_split_out() {
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        let changes = vec![
            ReplicatedChange::all(FieldChange::InLobby { value: false }),
            ReplicatedChange::owner(a, FieldChange::Health { participant_id: a, health: 90.0 }),
            ReplicatedChange::owner(b, FieldChange::Health { participant_id: b, health: 40.0 }),
        ];

        let out = ReplicationBuilder::build(7, changes);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].audience, Audience::All);
        assert_eq!(out[1].audience, Audience::Owner(a));
        assert!(!out[1].audience.includes(b));
    }

    #[test]
    fn nothing_to_send_without_changes() {
        assert!(ReplicationBuilder::build(1, Vec::new()).is_empty());
    }
}
