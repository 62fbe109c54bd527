//! Combat system - hit resolution, damage and death

use super::participant::{ParticipantRecord, Pawn};
use super::team::Team;
use super::world::{CollisionCategory, CollisionQuery, TraceHit, Vec3, TRACE_RANGE};
use super::{ParticipantId, PawnId};

/// Health a pawn spawns with
pub const MAX_HEALTH: f32 = 100.0;
/// Damage per registered hit; no falloff, no location multiplier
pub const HIT_DAMAGE: f32 = 10.0;
/// Score awarded for a killing blow
pub const KILL_SCORE: f32 = 1.0;

/// Pawn lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatState {
    Alive,
    /// Dead, waiting for the respawn timer
    PendingRespawn,
}

/// Why a damage request did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageRejection {
    NotAuthority,
    SelfDamage,
    AlreadyDead,
    UnknownVictim,
}

/// Result of applying damage to a participant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    Rejected(DamageRejection),
    Damaged { health: f32 },
    /// The hit that took health to zero
    Killed { killer: Option<ParticipantId> },
}

/// Outcome of a weapon trace
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitResolution {
    Miss,
    Friendly { pawn: PawnId },
    Enemy { pawn: PawnId, location: Vec3 },
}

/// Combat system for resolving shots and damage
pub struct CombatSystem;

impl CombatSystem {
    /// Fire request validation: both vectors finite and non-zero
    pub fn validate_fire(origin: Vec3, direction: Vec3) -> bool {
        origin.is_finite() && direction.is_finite() && !origin.is_zero() && !direction.is_zero()
    }

    /// Single nearest-hit trace on the damageable channel, skipping the shooter
    pub fn trace_shot(
        world: &impl CollisionQuery,
        shooter: PawnId,
        origin: Vec3,
        direction: Vec3,
    ) -> Option<TraceHit> {
        let dir = direction.normalized()?;
        let end = origin + dir * TRACE_RANGE;
        world.line_trace(origin, end, CollisionCategory::Damageable, Some(shooter))
    }

    /// Classify a shot against the teams of shooter and target
    pub fn resolve_hit<F>(
        world: &impl CollisionQuery,
        shooter: PawnId,
        shooter_team: Team,
        origin: Vec3,
        direction: Vec3,
        team_of: F,
    ) -> HitResolution
    where
        F: Fn(PawnId) -> Option<Team>,
    {
        let Some(hit) = Self::trace_shot(world, shooter, origin, direction) else {
            return HitResolution::Miss;
        };

        match team_of(hit.pawn) {
            Some(team) if team != shooter_team => HitResolution::Enemy {
                pawn: hit.pawn,
                location: hit.location,
            },
            Some(_) => HitResolution::Friendly { pawn: hit.pawn },
            None => HitResolution::Miss,
        }
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
        let new_health = (current_health - damage).max(0.0);
        (new_health, new_health <= 0.0)
    }

    /// Damage state transition for one victim.
    ///
    /// Self-damage and damage to an already-dead victim are no-ops. On the
    /// killing blow the victim's death count rises and its pawn moves to
    /// `PendingRespawn`; crediting the killer is left to the caller.
    pub fn take_damage(
        victim: &mut ParticipantRecord,
        pawn: &mut Pawn,
        instigator: Option<ParticipantId>,
        amount: f32,
    ) -> DamageOutcome {
        if instigator == Some(victim.id) {
            return DamageOutcome::Rejected(DamageRejection::SelfDamage);
        }
        if victim.health() <= 0.0 || !pawn.is_alive() {
            return DamageOutcome::Rejected(DamageRejection::AlreadyDead);
        }

        let (health, killed) = Self::apply_damage(victim.health(), amount);
        victim.health.set(health);

        if killed {
            victim.deaths.set(victim.deaths() + 1);
            pawn.state.set(CombatState::PendingRespawn);
            DamageOutcome::Killed { killer: instigator }
        } else {
            DamageOutcome::Damaged { health }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::world::ArenaWorld;

    fn victim() -> (ParticipantRecord, Pawn) {
        let id = ParticipantId::new();
        let record = ParticipantRecord::new(id, "victim".to_string(), Team::Blue);
        let pawn = Pawn::new(PawnId(1), id);
        (record, pawn)
    }

    #[test]
    fn three_hits_leave_seventy() {
        let (mut record, mut pawn) = victim();
        let attacker = ParticipantId::new();
        for _ in 0..3 {
            CombatSystem::take_damage(&mut record, &mut pawn, Some(attacker), HIT_DAMAGE);
        }
        assert_eq!(record.health(), 70.0);
        assert_eq!(record.deaths(), 0);
        assert!(pawn.is_alive());
    }

    #[test]
    fn tenth_hit_kills_exactly_once() {
        let (mut record, mut pawn) = victim();
        let attacker = ParticipantId::new();
        let outcomes: Vec<_> = (0..12)
            .map(|_| CombatSystem::take_damage(&mut record, &mut pawn, Some(attacker), HIT_DAMAGE))
            .collect();

        assert_eq!(outcomes[8], DamageOutcome::Damaged { health: 10.0 });
        assert_eq!(outcomes[9], DamageOutcome::Killed { killer: Some(attacker) });
        assert_eq!(outcomes[10], DamageOutcome::Rejected(DamageRejection::AlreadyDead));
        assert_eq!(record.health(), 0.0);
        assert_eq!(record.deaths(), 1);
        assert_eq!(*pawn.state.get(), CombatState::PendingRespawn);
    }

    #[test]
    fn self_damage_is_ignored() {
        let (mut record, mut pawn) = victim();
        let own = record.id;
        let outcome = CombatSystem::take_damage(&mut record, &mut pawn, Some(own), 50.0);
        assert_eq!(outcome, DamageOutcome::Rejected(DamageRejection::SelfDamage));
        assert_eq!(record.health(), MAX_HEALTH);
    }

    #[test]
    fn overkill_clamps_at_zero() {
        assert_eq!(CombatSystem::apply_damage(5.0, 10.0), (0.0, true));
        assert_eq!(CombatSystem::apply_damage(20.0, 10.0), (10.0, false));
    }

    #[test]
    fn fire_validation_rejects_zero_vectors() {
        let v = Vec3::new(1.0, 0.0, 0.0);
        assert!(CombatSystem::validate_fire(v, v));
        assert!(!CombatSystem::validate_fire(Vec3::ZERO, v));
        assert!(!CombatSystem::validate_fire(v, Vec3::ZERO));
        assert!(!CombatSystem::validate_fire(v, Vec3::new(f32::NAN, 0.0, 0.0)));
    }

    #[test]
    fn same_team_hit_is_friendly() {
        let mut world = ArenaWorld::new();
        world.place(PawnId(1), Vec3::new(0.0, 0.0, 0.0));
        world.place(PawnId(2), Vec3::new(400.0, 0.0, 0.0));
        let origin = Vec3::new(1.0, 0.0, 0.0);
        let dir = Vec3::new(1.0, 0.0, 0.0);

        let friendly = CombatSystem::resolve_hit(&world, PawnId(1), Team::Blue, origin, dir, |_| {
            Some(Team::Blue)
        });
        assert_eq!(friendly, HitResolution::Friendly { pawn: PawnId(2) });

        let enemy = CombatSystem::resolve_hit(&world, PawnId(1), Team::Blue, origin, dir, |_| {
            Some(Team::Red)
        });
        assert!(matches!(enemy, HitResolution::Enemy { pawn: PawnId(2), .. }));

        let miss = CombatSystem::resolve_hit(&world, PawnId(1), Team::Blue, origin, dir * -1.0, |_| {
            Some(Team::Red)
        });
        assert_eq!(miss, HitResolution::Miss);
    }
}
