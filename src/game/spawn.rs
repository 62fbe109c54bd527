//! Spawn points, pending-spawn queue and per-tick placement

use std::collections::VecDeque;
use tracing::{debug, info};

use super::level::LevelLayout;
use super::team::Team;
use super::world::{Aabb, ArenaWorld, CollisionQuery, Vec3};
use super::{ParticipantId, PawnId};

/// Spawn trigger volume radius
pub const SPAWN_VOLUME_RADIUS: f32 = 60.0;
/// Spawn trigger volume half height
pub const SPAWN_VOLUME_HALF_HEIGHT: f32 = 100.0;

/// Index of a spawn point in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpawnPointId(pub usize);

/// A static placement location owned by one team
#[derive(Debug, Clone)]
pub struct SpawnPoint {
    pub id: SpawnPointId,
    pub name: String,
    pub team: Team,
    pub location: Vec3,
}

impl SpawnPoint {
    /// Trigger volume checked for occupancy
    pub fn volume(&self) -> Aabb {
        Aabb::capsule(self.location, SPAWN_VOLUME_RADIUS, SPAWN_VOLUME_HALF_HEIGHT)
    }
}

/// All spawn points discovered at level load. Positions never change.
#[derive(Debug, Default)]
pub struct SpawnRegistry {
    points: Vec<SpawnPoint>,
}

impl SpawnRegistry {
    pub fn from_layout(layout: &LevelLayout) -> Self {
        let points = layout
            .spawn_points
            .iter()
            .enumerate()
            .map(|(idx, def)| SpawnPoint {
                id: SpawnPointId(idx),
                name: def.name.clone(),
                team: def.team,
                location: def.location,
            })
            .collect();

        Self { points }
    }

    /// Occupancy is recomputed from live overlaps on every call
    pub fn is_blocked(&self, point: &SpawnPoint, world: &impl CollisionQuery) -> bool {
        let overlapping = world.overlapping(&point.volume());
        debug!(
            spawn_point = %point.name,
            blocked = !overlapping.is_empty(),
            overlap_count = overlapping.len(),
            "Spawn point occupancy"
        );
        !overlapping.is_empty()
    }

    /// The team's points in registration order
    pub fn points_for(&self, team: Team) -> impl Iterator<Item = &SpawnPoint> {
        self.points.iter().filter(move |p| p.team == team)
    }

    /// The team's currently unblocked points in registration order
    pub fn free_points_for<'a, W: CollisionQuery>(
        &'a self,
        team: Team,
        world: &'a W,
    ) -> impl Iterator<Item = &'a SpawnPoint> + 'a {
        self.points_for(team).filter(move |p| !self.is_blocked(p, world))
    }

    pub fn get(&self, id: SpawnPointId) -> Option<&SpawnPoint> {
        self.points.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// Ordered set of participants waiting for a spawn point
#[derive(Debug, Default)]
pub struct PendingSpawnQueue {
    queue: VecDeque<ParticipantId>,
}

impl PendingSpawnQueue {
    /// Returns false if the participant was already queued
    pub fn enqueue(&mut self, participant: ParticipantId) -> bool {
        if self.contains(participant) {
            return false;
        }
        self.queue.push_back(participant);
        true
    }

    pub fn remove(&mut self, participant: ParticipantId) -> bool {
        match self.queue.iter().position(|p| *p == participant) {
            Some(pos) => {
                self.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, participant: ParticipantId) -> bool {
        self.queue.contains(&participant)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticipantId> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// A successful placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub participant: ParticipantId,
    pub pawn: PawnId,
    pub point: SpawnPointId,
    pub location: Vec3,
}

/// Places queued participants at free points of their team.
///
/// Unplaced participants stay queued and are retried every tick with no
/// bound; a team whose points stay occupied starves its queue.
#[derive(Debug, Default)]
pub struct SpawnScheduler {
    pending: PendingSpawnQueue,
}

impl SpawnScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent
    pub fn enqueue(&mut self, participant: ParticipantId) -> bool {
        self.pending.enqueue(participant)
    }

    pub fn cancel(&mut self, participant: ParticipantId) -> bool {
        self.pending.remove(participant)
    }

    #[cfg(test)]
    pub fn is_pending(&self, participant: ParticipantId) -> bool {
        self.pending.contains(participant)
    }

    pub fn pending(&self) -> &PendingSpawnQueue {
        &self.pending
    }

    /// Single placement attempt for a queued participant.
    ///
    /// On success the pawn's body is put in the world and the participant
    /// leaves the queue in the same step, so later attempts in the same
    /// tick see the point as blocked.
    pub fn try_place(
        &mut self,
        registry: &SpawnRegistry,
        world: &mut ArenaWorld,
        participant: ParticipantId,
        pawn: PawnId,
        team: Team,
    ) -> Option<Placement> {
        if !self.pending.contains(participant) {
            return None;
        }

        let point_id = registry.free_points_for(team, &*world).next()?.id;
        let point = registry.get(point_id)?;
        let placement = Placement {
            participant,
            pawn,
            point: point.id,
            location: point.location,
        };

        world.place(pawn, placement.location);
        self.pending.remove(participant);

        info!(
            participant_id = %participant,
            pawn = pawn.0,
            spawn_point = %point.name,
            "Participant placed"
        );

        Some(placement)
    }

    /// One pass over the queue. `lookup` resolves a participant's current
    /// pawn and team; participants it cannot resolve are dropped.
    pub fn tick<F>(
        &mut self,
        registry: &SpawnRegistry,
        world: &mut ArenaWorld,
        lookup: F,
    ) -> Vec<Placement>
    where
        F: Fn(ParticipantId) -> Option<(PawnId, Team)>,
    {
        let queued: Vec<ParticipantId> = self.pending.iter().copied().collect();
        let mut placements = Vec::new();

        for participant in queued {
            let Some((pawn, team)) = lookup(participant) else {
                debug!(participant_id = %participant, "Dropping stale spawn request");
                self.pending.remove(participant);
                continue;
            };

            if let Some(placement) = self.try_place(registry, world, participant, pawn, team) {
                placements.push(placement);
            }
        }

        placements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::level::SpawnPointDef;

    fn layout() -> LevelLayout {
        let def = |name: &str, team, x| SpawnPointDef {
            name: name.to_string(),
            team,
            location: Vec3::new(x, 0.0, 0.0),
        };
        LevelLayout {
            name: "test".to_string(),
            spawn_points: vec![
                def("b0", Team::Blue, 0.0),
                def("r0", Team::Red, 5000.0),
                def("b1", Team::Blue, 1000.0),
            ],
        }
    }

    #[test]
    fn enqueue_is_idempotent() {
        let mut scheduler = SpawnScheduler::new();
        let p = ParticipantId::new();
        assert!(scheduler.enqueue(p));
        assert!(!scheduler.enqueue(p));
        assert_eq!(scheduler.pending().len(), 1);
    }

    #[test]
    fn free_points_follow_registration_order() {
        let registry = SpawnRegistry::from_layout(&layout());
        let world = ArenaWorld::new();
        let names: Vec<_> = registry
            .free_points_for(Team::Blue, &world)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, ["b0", "b1"]);
    }

    #[test]
    fn blocked_point_is_skipped() {
        let registry = SpawnRegistry::from_layout(&layout());
        let mut world = ArenaWorld::new();
        world.place(PawnId(99), Vec3::new(20.0, 0.0, 0.0));

        let first = registry.free_points_for(Team::Blue, &world).next().unwrap();
        assert_eq!(first.name, "b1");
        assert!(registry.is_blocked(registry.get(SpawnPointId(0)).unwrap(), &world));
    }

    #[test]
    fn two_participants_in_one_tick_get_distinct_points() {
        let registry = SpawnRegistry::from_layout(&layout());
        let mut world = ArenaWorld::new();
        let mut scheduler = SpawnScheduler::new();
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        scheduler.enqueue(a);
        scheduler.enqueue(b);

        let placements = scheduler.tick(&registry, &mut world, |p| {
            Some((if p == a { PawnId(1) } else { PawnId(2) }, Team::Blue))
        });

        assert_eq!(placements.len(), 2);
        assert_eq!(placements[0].point, SpawnPointId(0));
        assert_eq!(placements[1].point, SpawnPointId(2));
        assert!(scheduler.pending().is_empty());
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn starved_participant_waits_until_a_point_frees() {
        let registry = SpawnRegistry::from_layout(&layout());
        let mut world = ArenaWorld::new();
        world.place(PawnId(10), Vec3::new(0.0, 0.0, 0.0));
        world.place(PawnId(11), Vec3::new(1000.0, 0.0, 0.0));

        let mut scheduler = SpawnScheduler::new();
        let p = ParticipantId::new();
        scheduler.enqueue(p);
        let lookup = |_| Some((PawnId(1), Team::Blue));

        for _ in 0..5 {
            assert!(scheduler.tick(&registry, &mut world, lookup).is_empty());
            assert!(scheduler.is_pending(p));
        }

        world.move_body(PawnId(11), Vec3::new(1000.0, 800.0, 0.0));
        let placements = scheduler.tick(&registry, &mut world, lookup);
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].point, SpawnPointId(2));
        assert!(!scheduler.is_pending(p));
        assert_eq!(world.body(PawnId(1)).unwrap().position, Vec3::new(1000.0, 0.0, 0.0));
    }

    #[test]
    fn unresolvable_participants_are_dropped() {
        let registry = SpawnRegistry::from_layout(&layout());
        let mut world = ArenaWorld::new();
        let mut scheduler = SpawnScheduler::new();
        scheduler.enqueue(ParticipantId::new());

        assert!(scheduler.tick(&registry, &mut world, |_| None).is_empty());
        assert!(scheduler.pending().is_empty());
    }
}
