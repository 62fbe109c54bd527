//! Persistent per-session records and transient pawns

use crate::util::time::unix_millis;
use crate::ws::protocol::{FieldChange, ParticipantInfo};

use super::combat::{CombatState, MAX_HEALTH};
use super::replication::{Replicable, Replicated, ReplicatedChange};
use super::team::Team;
use super::timer::TimerHandle;
use super::world::Vec3;
use super::{ParticipantId, PawnId};

/// Everything about a participant that survives death and respawn
#[derive(Debug)]
pub struct ParticipantRecord {
    pub id: ParticipantId,
    pub display_name: String,
    pub joined_at: u64,
    pub team: Replicated<Team>,
    pub health: Replicated<f32>,
    pub score: Replicated<f32>,
    pub deaths: Replicated<u32>,
    /// Current pawn, if one exists
    pub pawn: Option<PawnId>,
    /// Outstanding respawn, cancelled on leave
    pub respawn_timer: Option<TimerHandle>,
}

impl ParticipantRecord {
    pub fn new(id: ParticipantId, display_name: String, team: Team) -> Self {
        Self {
            id,
            display_name,
            joined_at: unix_millis(),
            team: Replicated::new(team),
            health: Replicated::new(MAX_HEALTH),
            score: Replicated::new(0.0),
            deaths: Replicated::new(0),
            pawn: None,
            respawn_timer: None,
        }
    }

    pub fn team(&self) -> Team {
        *self.team.get()
    }

    pub fn health(&self) -> f32 {
        *self.health.get()
    }

    pub fn score(&self) -> f32 {
        *self.score.get()
    }

    pub fn deaths(&self) -> u32 {
        *self.deaths.get()
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            participant_id: self.id,
            display_name: self.display_name.clone(),
            team: self.team(),
        }
    }
}

impl Replicable for ParticipantRecord {
    fn collect_changes(&mut self, out: &mut Vec<ReplicatedChange>) {
        let participant_id = self.id;
        if let Some(team) = self.team.take_dirty() {
            out.push(ReplicatedChange::all(FieldChange::Team {
                participant_id,
                team: *team,
            }));
        }
        if let Some(score) = self.score.take_dirty() {
            out.push(ReplicatedChange::all(FieldChange::Score {
                participant_id,
                score: *score,
            }));
        }
        if let Some(deaths) = self.deaths.take_dirty() {
            out.push(ReplicatedChange::all(FieldChange::Deaths {
                participant_id,
                deaths: *deaths,
            }));
        }
        if let Some(health) = self.health.take_dirty() {
            out.push(ReplicatedChange::owner(
                participant_id,
                FieldChange::Health {
                    participant_id,
                    health: health.max(0.0),
                },
            ));
        }
    }

    fn full_state(&self, out: &mut Vec<ReplicatedChange>) {
        let participant_id = self.id;
        out.push(ReplicatedChange::all(FieldChange::Team {
            participant_id,
            team: self.team(),
        }));
        out.push(ReplicatedChange::all(FieldChange::Score {
            participant_id,
            score: self.score(),
        }));
        out.push(ReplicatedChange::all(FieldChange::Deaths {
            participant_id,
            deaths: self.deaths(),
        }));
        out.push(ReplicatedChange::owner(
            participant_id,
            FieldChange::Health {
                participant_id,
                health: self.health().max(0.0),
            },
        ));
    }
}

/// One physical incarnation of a participant.
///
/// Holds only the participant's key; the record is looked up on demand.
#[derive(Debug)]
pub struct Pawn {
    pub id: PawnId,
    pub participant: ParticipantId,
    pub state: Replicated<CombatState>,
    /// None until the spawn scheduler places it
    pub position: Replicated<Option<Vec3>>,
}

impl Pawn {
    pub fn new(id: PawnId, participant: ParticipantId) -> Self {
        Self {
            id,
            participant,
            state: Replicated::new(CombatState::Alive),
            position: Replicated::new(None),
        }
    }

    pub fn is_alive(&self) -> bool {
        *self.state.get() == CombatState::Alive
    }

    pub fn is_placed(&self) -> bool {
        self.position.get().is_some()
    }
}

impl Replicable for Pawn {
    fn collect_changes(&mut self, out: &mut Vec<ReplicatedChange>) {
        let participant_id = self.participant;
        if let Some(state) = self.state.take_dirty() {
            out.push(ReplicatedChange::all(FieldChange::Alive {
                participant_id,
                alive: *state == CombatState::Alive,
            }));
        }
        if let Some(Some(position)) = self.position.take_dirty() {
            out.push(ReplicatedChange::all(FieldChange::Position {
                participant_id,
                position: *position,
            }));
        }
    }

    fn full_state(&self, out: &mut Vec<ReplicatedChange>) {
        let participant_id = self.participant;
        out.push(ReplicatedChange::all(FieldChange::Alive {
            participant_id,
            alive: self.is_alive(),
        }));
        if let Some(position) = self.position.get() {
            out.push(ReplicatedChange::all(FieldChange::Position {
                participant_id,
                position: *position,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::replication::Audience;

    #[test]
    fn health_is_only_replicated_to_the_owner() {
        let id = ParticipantId::new();
        let mut record = ParticipantRecord::new(id, "ana".to_string(), Team::Red);
        let mut out = Vec::new();
        record.collect_changes(&mut out);
        out.clear();

        record.health.set(70.0);
        record.collect_changes(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].audience, Audience::Owner(id));
    }

    #[test]
    fn unplaced_pawn_has_no_position_change() {
        let mut pawn = Pawn::new(PawnId(1), ParticipantId::new());
        let mut out = Vec::new();
        pawn.collect_changes(&mut out);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].change, FieldChange::Alive { alive: true, .. }));
    }
}
