//! Authoritative session simulation

pub mod combat;
pub mod level;
pub mod r#match;
pub mod match_state;
pub mod observers;
pub mod participant;
pub mod replication;
pub mod session;
pub mod spawn;
pub mod team;
pub mod timer;
pub mod world;

pub use r#match::{GameSession, SessionHandle};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

use crate::ws::protocol::ClientMsg;

/// Session-scoped identity of a participant; outlives its pawns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of one transient pawn instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PawnId(pub u64);

/// Message received from an observer connection
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub participant_id: ParticipantId,
    pub msg: ClientMsg,
    pub received_at: u64,
}

/// Per-frame work invoked by an external scheduler
pub trait Tickable {
    fn tick(&mut self, now: Instant);
}

/// Whether this process may mutate canonical state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Authority,
    Observer,
}

impl Role {
    pub fn is_authority(self) -> bool {
        self == Role::Authority
    }
}
