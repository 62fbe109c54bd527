//! WebSocket protocol message definitions
//! These are the wire types for observer-authority communication

use serde::{Deserialize, Serialize};

use crate::game::team::Team;
use crate::game::world::Vec3;
use crate::game::ParticipantId;

/// Messages sent from an observer to the authority
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter the session; the authority picks the team
    Join {
        display_name: String,
    },

    /// Observer-reported pawn position
    Move {
        position: Vec3,
    },

    /// Fire request, validated by the authority before acceptance
    Fire {
        /// Trace start
        origin: Vec3,
        /// Aim direction; need not be normalized
        direction: Vec3,
    },

    /// Leave the lobby and start play (host only)
    StartMatch,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave the session
    Leave,
}

/// Messages sent from the authority to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        participant_id: ParticipantId,
        server_time: u64,
        tick_rate: u32,
    },

    /// Confirmation of a join, sent to the joiner only
    Joined {
        participant_id: ParticipantId,
        team: Team,
        /// Whether this participant may start the match
        host: bool,
        /// Current replicated state visible to the joiner
        state: Vec<FieldChange>,
    },

    /// This participant is now the host
    HostAssigned,

    /// Someone joined the session
    ParticipantJoined {
        participant: ParticipantInfo,
    },

    /// Someone left the session
    ParticipantLeft {
        participant_id: ParticipantId,
        reason: String,
    },

    /// Replicated fields that changed during a tick
    Replicate {
        tick: u64,
        changes: Vec<FieldChange>,
    },

    /// Lobby is over
    MatchStarted {
        tick: u64,
    },

    /// Shot effects for everyone (unreliable)
    ShotEffects {
        participant_id: ParticipantId,
        origin: Vec3,
        direction: Vec3,
    },

    /// Death effect for everyone (unreliable)
    Ragdoll {
        participant_id: ParticipantId,
    },

    /// Pain feedback for the damaged participant
    Pain {
        health: f32,
    },

    /// Hit feedback for the shooter
    HitConfirmed {
        target_id: ParticipantId,
        /// Impact point of the trace
        location: Vec3,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Participant info for roster listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub team: Team,
}

/// One replicated field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum FieldChange {
    /// Session-wide lobby flag
    InLobby {
        value: bool,
    },

    Team {
        participant_id: ParticipantId,
        team: Team,
    },

    Score {
        participant_id: ParticipantId,
        score: f32,
    },

    Deaths {
        participant_id: ParticipantId,
        deaths: u32,
    },

    /// Only ever sent to the owning participant
    Health {
        participant_id: ParticipantId,
        health: f32,
    },

    /// Pawn position; absent until the pawn is placed
    Position {
        participant_id: ParticipantId,
        position: Vec3,
    },

    Alive {
        participant_id: ParticipantId,
        alive: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"fire","origin":{"x":0.0,"y":0.0,"z":0.0},"direction":{"x":1.0,"y":0.0,"z":0.0}}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMsg::Fire { .. }));

        let msg: ClientMsg = serde_json::from_str(r#"{"type":"start_match"}"#).unwrap();
        assert!(matches!(msg, ClientMsg::StartMatch));
    }

    #[test]
    fn field_changes_are_tagged_by_field() {
        let json = serde_json::to_value(FieldChange::InLobby { value: false }).unwrap();
        assert_eq!(json["field"], "in_lobby");
        assert_eq!(json["value"], false);
    }
}
