//! Canonical session state and the authoritative gameplay operations

use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::combat::{CombatSystem, DamageOutcome, DamageRejection, HitResolution, HIT_DAMAGE, KILL_SCORE, MAX_HEALTH};
use super::level::LevelLayout;
use super::match_state::MatchState;
use super::participant::{ParticipantRecord, Pawn};
use super::replication::{Audience, Outbox, Replicable, ReplicatedChange, ReplicationBuilder};
use super::spawn::{Placement, SpawnRegistry, SpawnScheduler};
use super::team::{Team, TeamRoster};
use super::timer::TimerQueue;
use super::world::{ArenaWorld, CollisionCategory, Vec3};
use super::{ParticipantId, PawnId, PlayerInput, Role, Tickable};

/// Longest display name kept from a join request
const MAX_DISPLAY_NAME_CHARS: usize = 24;

/// Gameplay knobs taken from configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub respawn_delay: Duration,
    pub max_participants: usize,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            respawn_delay: config.respawn_delay,
            max_participants: config.max_participants,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Deferred respawn. Carries the dead pawn so a stale timer can be detected.
#[derive(Debug, Clone, Copy)]
struct RespawnTask {
    participant: ParticipantId,
    pawn: PawnId,
}

/// One scoreboard row
#[derive(Debug, Clone, Serialize)]
pub struct ScoreLine {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub score: f32,
    pub deaths: u32,
    pub alive: bool,
}

/// Both teams in join order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Scoreboard {
    pub blue: Vec<ScoreLine>,
    pub red: Vec<ScoreLine>,
}

/// All canonical state of one session (owned by the session task)
pub struct SessionState {
    role: Role,
    settings: SessionSettings,
    tick: u64,
    match_state: MatchState,
    roster: TeamRoster,
    spawns: SpawnRegistry,
    scheduler: SpawnScheduler,
    world: ArenaWorld,
    records: HashMap<ParticipantId, ParticipantRecord>,
    pawns: HashMap<PawnId, Pawn>,
    next_pawn_id: u64,
    host: Option<ParticipantId>,
    respawns: TimerQueue<RespawnTask>,
    outbox: Outbox,
}

impl SessionState {
    pub fn new(role: Role, settings: SessionSettings, layout: &LevelLayout) -> Self {
        let spawns = SpawnRegistry::from_layout(layout);
        info!(level = %layout.name, spawn_points = spawns.len(), "Session initialised");

        Self {
            role,
            settings,
            tick: 0,
            match_state: MatchState::new(),
            roster: TeamRoster::new(),
            spawns,
            scheduler: SpawnScheduler::new(),
            world: ArenaWorld::new(),
            records: HashMap::new(),
            pawns: HashMap::new(),
            next_pawn_id: 0,
            host: None,
            respawns: TimerQueue::new(),
            outbox: Outbox::default(),
        }
    }

    /// Dispatch one observer message
    pub fn handle_input(&mut self, input: PlayerInput, now: Instant) {
        let participant = input.participant_id;
        match input.msg {
            ClientMsg::Join { display_name } => {
                self.join(participant, &display_name);
            }
            ClientMsg::Move { position } => self.move_pawn(participant, position),
            ClientMsg::Fire { origin, direction } => {
                if !self.fire(participant, origin, direction, now) {
                    debug!(
                        participant_id = %participant,
                        queued_ms = unix_millis().saturating_sub(input.received_at),
                        "Dropping fire request"
                    );
                }
            }
            ClientMsg::StartMatch => self.start_match(participant),
            ClientMsg::Ping { t } => self.outbox.send(Audience::Owner(participant), ServerMsg::Pong { t }),
            ClientMsg::Leave => self.leave(participant, "disconnected"),
        }
    }

    /// Create the participant's record, assign a team and request a spawn
    pub fn join(&mut self, participant: ParticipantId, display_name: &str) -> Option<Team> {
        if !self.role.is_authority() {
            return None;
        }

        if self.records.contains_key(&participant) {
            warn!(participant_id = %participant, "Participant already in session");
            return None;
        }

        if self.records.len() >= self.settings.max_participants {
            self.outbox.send(
                Audience::Owner(participant),
                ServerMsg::Error {
                    code: "session_full".to_string(),
                    message: "Session is full".to_string(),
                },
            );
            return None;
        }

        let display_name = clean_display_name(display_name, participant);
        let team = self.roster.assign(participant);
        let record = ParticipantRecord::new(participant, display_name, team);
        let info = record.info();
        self.records.insert(participant, record);

        let host = *self.host.get_or_insert(participant) == participant;

        self.spawn_pawn(participant);
        self.request_spawn(participant);

        self.outbox
            .send(Audience::All, ServerMsg::ParticipantJoined { participant: info });

        let mut state = Vec::new();
        self.full_state(&mut state);
        self.outbox.send(
            Audience::Owner(participant),
            ServerMsg::Joined {
                participant_id: participant,
                team,
                host,
                state: ReplicationBuilder::visible_to(participant, state),
            },
        );

        info!(
            participant_id = %participant,
            team = ?team,
            host,
            participant_count = self.records.len(),
            "Participant joined session"
        );

        Some(team)
    }

    /// Remove a participant and everything it owns
    pub fn leave(&mut self, participant: ParticipantId, reason: &str) {
        if !self.role.is_authority() {
            return;
        }

        let Some(record) = self.records.remove(&participant) else {
            return;
        };

        if let Some(handle) = record.respawn_timer {
            self.respawns.cancel(handle);
        }
        if let Some(pawn) = record.pawn {
            self.pawns.remove(&pawn);
            self.world.remove(pawn);
        }
        self.scheduler.cancel(participant);
        self.roster.remove(participant);

        if self.host == Some(participant) {
            self.host = self
                .records
                .values()
                .min_by_key(|r| (r.joined_at, r.id))
                .map(|r| r.id);
            if let Some(new_host) = self.host {
                self.outbox
                    .send(Audience::Owner(new_host), ServerMsg::HostAssigned);
            }
        }

        self.outbox.send(
            Audience::All,
            ServerMsg::ParticipantLeft {
                participant_id: participant,
                reason: reason.to_string(),
            },
        );

        // An empty session forms a fresh lobby
        if self.records.is_empty() && self.match_state.reset() {
            info!(tick = self.tick, "Last participant left, back to lobby");
        }

        info!(
            participant_id = %participant,
            reason,
            participant_count = self.records.len(),
            "Participant left session"
        );
    }

    /// Observer-reported movement of a live, placed pawn
    pub fn move_pawn(&mut self, participant: ParticipantId, position: Vec3) {
        if !self.role.is_authority() || !position.is_finite() {
            return;
        }

        let Some(pawn_id) = self.records.get(&participant).and_then(|r| r.pawn) else {
            return;
        };
        let Some(pawn) = self.pawns.get_mut(&pawn_id) else {
            return;
        };
        if !pawn.is_alive() || !pawn.is_placed() {
            return;
        }

        if self.world.move_body(pawn_id, position) {
            pawn.position.set(Some(position));
        }
    }

    /// Fire request. Returns false when the request was invalid or the
    /// shooter has no live, placed pawn; nothing is sent back in that case.
    pub fn fire(&mut self, shooter: ParticipantId, origin: Vec3, direction: Vec3, now: Instant) -> bool {
        if !self.role.is_authority() || !CombatSystem::validate_fire(origin, direction) {
            return false;
        }

        let Some(record) = self.records.get(&shooter) else {
            return false;
        };
        let shooter_team = record.team();
        let Some(pawn_id) = record.pawn else {
            return false;
        };
        let ready = self
            .pawns
            .get(&pawn_id)
            .map(|p| p.is_alive() && p.is_placed())
            .unwrap_or(false);
        if !ready {
            return false;
        }

        let resolution = CombatSystem::resolve_hit(
            &self.world,
            pawn_id,
            shooter_team,
            origin,
            direction,
            |pawn| team_of_pawn(&self.records, &self.pawns, pawn),
        );

        self.outbox.multicast_unreliable(ServerMsg::ShotEffects {
            participant_id: shooter,
            origin,
            direction,
        });

        match resolution {
            HitResolution::Enemy { pawn, location } => {
                if let Some(victim) = self.pawns.get(&pawn).map(|p| p.participant) {
                    self.take_damage(victim, Some(shooter), HIT_DAMAGE, now);
                    self.outbox.send(
                        Audience::Owner(shooter),
                        ServerMsg::HitConfirmed {
                            target_id: victim,
                            location,
                        },
                    );
                }
            }
            HitResolution::Friendly { pawn } => {
                debug!(participant_id = %shooter, pawn = pawn.0, "Friendly hit ignored");
            }
            HitResolution::Miss => {}
        }
        true
    }

    /// Apply damage to a participant's current pawn
    pub fn take_damage(
        &mut self,
        victim: ParticipantId,
        instigator: Option<ParticipantId>,
        amount: f32,
        now: Instant,
    ) -> DamageOutcome {
        if !self.role.is_authority() {
            return DamageOutcome::Rejected(DamageRejection::NotAuthority);
        }

        let Some(record) = self.records.get_mut(&victim) else {
            return DamageOutcome::Rejected(DamageRejection::UnknownVictim);
        };
        let Some(pawn_id) = record.pawn else {
            return DamageOutcome::Rejected(DamageRejection::UnknownVictim);
        };
        let Some(pawn) = self.pawns.get_mut(&pawn_id) else {
            return DamageOutcome::Rejected(DamageRejection::UnknownVictim);
        };

        let outcome = CombatSystem::take_damage(record, pawn, instigator, amount);
        match outcome {
            DamageOutcome::Damaged { health } => {
                self.outbox
                    .send(Audience::Owner(victim), ServerMsg::Pain { health });
            }
            DamageOutcome::Killed { killer } => {
                self.outbox
                    .send(Audience::Owner(victim), ServerMsg::Pain { health: 0.0 });
                self.on_killed(victim, pawn_id, killer, now);
            }
            DamageOutcome::Rejected(reason) => {
                debug!(participant_id = %victim, ?reason, "Damage rejected");
            }
        }
        outcome
    }

    fn on_killed(
        &mut self,
        victim: ParticipantId,
        pawn: PawnId,
        killer: Option<ParticipantId>,
        now: Instant,
    ) {
        self.world.set_category(pawn, CollisionCategory::Ragdoll);
        self.outbox
            .multicast_unreliable(ServerMsg::Ragdoll { participant_id: victim });

        if let Some(killer) = killer.filter(|k| *k != victim) {
            if let Some(record) = self.records.get_mut(&killer) {
                record.score.set(record.score() + KILL_SCORE);
            }
        }

        let handle = self.respawns.schedule(
            now + self.settings.respawn_delay,
            RespawnTask {
                participant: victim,
                pawn,
            },
        );
        if let Some(record) = self.records.get_mut(&victim) {
            record.respawn_timer = Some(handle);
        }

        info!(
            participant_id = %victim,
            killer = ?killer.map(|k| k.to_string()),
            respawn_in_ms = self.settings.respawn_delay.as_millis() as u64,
            "Participant killed"
        );
    }

    /// Replace a dead pawn with a fresh one and queue it for placement
    fn respawn(&mut self, task: RespawnTask) {
        let Some(record) = self.records.get_mut(&task.participant) else {
            debug!(participant_id = %task.participant, "Respawn for departed participant skipped");
            return;
        };
        if record.pawn != Some(task.pawn) {
            debug!(participant_id = %task.participant, "Stale respawn skipped");
            return;
        }

        record.respawn_timer = None;
        record.health.set(MAX_HEALTH);

        self.pawns.remove(&task.pawn);
        self.world.remove(task.pawn);

        let pawn = self.spawn_pawn(task.participant);
        self.request_spawn(task.participant);

        info!(participant_id = %task.participant, pawn = pawn.0, "Participant respawned");
    }

    /// Lobby -> active, host only
    pub fn start_match(&mut self, participant: ParticipantId) {
        if !self.role.is_authority() {
            return;
        }
        if self.host != Some(participant) {
            debug!(participant_id = %participant, "Start request from non-host ignored");
            return;
        }

        if self.match_state.start() {
            self.outbox
                .send(Audience::All, ServerMsg::MatchStarted { tick: self.tick });
            info!(tick = self.tick, "Match started");
        }
    }

    fn spawn_pawn(&mut self, participant: ParticipantId) -> PawnId {
        let id = PawnId(self.next_pawn_id);
        self.next_pawn_id += 1;
        self.pawns.insert(id, Pawn::new(id, participant));
        if let Some(record) = self.records.get_mut(&participant) {
            record.pawn = Some(id);
        }
        id
    }

    /// Queue the participant and try to place it right away
    fn request_spawn(&mut self, participant: ParticipantId) {
        self.scheduler.enqueue(participant);

        let Some((pawn, team)) = spawn_target(&self.records, &self.pawns, participant) else {
            return;
        };
        if let Some(placement) =
            self.scheduler
                .try_place(&self.spawns, &mut self.world, participant, pawn, team)
        {
            self.apply_placement(placement);
        }
    }

    fn apply_placement(&mut self, placement: Placement) {
        if let Some(pawn) = self.pawns.get_mut(&placement.pawn) {
            pawn.position.set(Some(placement.location));
        }
    }

    /// Push every dirty replicated field into the outbox
    fn replicate(&mut self) {
        let mut changes = Vec::new();
        self.match_state.collect_changes(&mut changes);
        for record in self.records.values_mut() {
            record.collect_changes(&mut changes);
        }
        for pawn in self.pawns.values_mut() {
            pawn.collect_changes(&mut changes);
        }

        for outbound in ReplicationBuilder::build(self.tick, changes) {
            self.outbox.send(outbound.audience, outbound.msg);
        }
    }

    fn full_state(&self, out: &mut Vec<ReplicatedChange>) {
        self.match_state.full_state(out);
        for record in self.records.values() {
            record.full_state(out);
        }
        for pawn in self.pawns.values() {
            pawn.full_state(out);
        }
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn in_lobby(&self) -> bool {
        self.match_state.in_lobby()
    }

    #[cfg(test)]
    pub fn host(&self) -> Option<ParticipantId> {
        self.host
    }

    pub fn participant_count(&self) -> usize {
        self.records.len()
    }

    pub fn pending_spawns(&self) -> usize {
        self.scheduler.pending().len()
    }

    #[cfg(test)]
    pub fn is_pending_spawn(&self, participant: ParticipantId) -> bool {
        self.scheduler.is_pending(participant)
    }

    #[cfg(test)]
    pub fn record(&self, participant: ParticipantId) -> Option<&ParticipantRecord> {
        self.records.get(&participant)
    }

    #[cfg(test)]
    pub fn pawn_of(&self, participant: ParticipantId) -> Option<&Pawn> {
        self.records
            .get(&participant)
            .and_then(|r| r.pawn)
            .and_then(|id| self.pawns.get(&id))
    }

    pub fn scoreboard(&self) -> Scoreboard {
        let lines = |team: Team| -> Vec<ScoreLine> {
            self.roster
                .members(team)
                .iter()
                .filter_map(|id| self.records.get(id))
                .map(|r| ScoreLine {
                    participant_id: r.id,
                    display_name: r.display_name.clone(),
                    score: r.score(),
                    deaths: r.deaths(),
                    alive: r
                        .pawn
                        .and_then(|p| self.pawns.get(&p))
                        .map(|p| p.is_alive())
                        .unwrap_or(false),
                })
                .collect()
        };

        Scoreboard {
            blue: lines(Team::Blue),
            red: lines(Team::Red),
        }
    }
}

impl Tickable for SessionState {
    /// Fire due respawns, retry pending spawns, then publish this tick's diffs
    fn tick(&mut self, now: Instant) {
        if !self.role.is_authority() {
            return;
        }

        self.tick += 1;

        for task in self.respawns.drain_due(now) {
            self.respawn(task);
        }

        let placements = {
            let records = &self.records;
            let pawns = &self.pawns;
            self.scheduler.tick(&self.spawns, &mut self.world, |participant| {
                spawn_target(records, pawns, participant)
            })
        };
        for placement in placements {
            self.apply_placement(placement);
        }

        self.replicate();
    }
}

fn spawn_target(
    records: &HashMap<ParticipantId, ParticipantRecord>,
    pawns: &HashMap<PawnId, Pawn>,
    participant: ParticipantId,
) -> Option<(PawnId, Team)> {
    let record = records.get(&participant)?;
    let pawn = pawns.get(&record.pawn?)?;
    pawn.is_alive().then_some((pawn.id, record.team()))
}

fn team_of_pawn(
    records: &HashMap<ParticipantId, ParticipantRecord>,
    pawns: &HashMap<PawnId, Pawn>,
    pawn: PawnId,
) -> Option<Team> {
    let owner = pawns.get(&pawn)?.participant;
    records.get(&owner).map(|r| r.team())
}

fn clean_display_name(raw: &str, participant: ParticipantId) -> String {
    let name: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_DISPLAY_NAME_CHARS)
        .collect();
    if name.is_empty() {
        format!("Player_{}", &participant.to_string()[..8])
    } else {
        name
    }
}
