//! Session task and authoritative tick loop

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info};

use crate::config::Config;
use crate::ws::protocol::ServerMsg;

use super::level::LevelLayout;
use super::observers::{ObserverRegistry, OBSERVER_BUFFER};
use super::replication::Outbound;
use super::session::{Scoreboard, SessionSettings, SessionState};
use super::{ParticipantId, PlayerInput, Role, Tickable};

/// Read-only view of the session published after every tick
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStatus {
    pub tick: u64,
    pub in_lobby: bool,
    pub participant_count: usize,
    pub pending_spawns: usize,
    pub scoreboard: Scoreboard,
}

impl SessionStatus {
    fn capture(state: &SessionState) -> Self {
        Self {
            tick: state.tick_count(),
            in_lobby: state.in_lobby(),
            participant_count: state.participant_count(),
            pending_spawns: state.pending_spawns(),
            scoreboard: state.scoreboard(),
        }
    }
}

/// Handle to the running session
#[derive(Clone)]
pub struct SessionHandle {
    pub input_tx: mpsc::Sender<PlayerInput>,
    observers: ObserverRegistry,
    /// Cosmetic multicast; small buffer, lagging receivers lose effects first
    effects_tx: broadcast::Sender<Outbound>,
    status: Arc<RwLock<SessionStatus>>,
}

impl SessionHandle {
    /// Receivers for a new observer's (reliable, unreliable) traffic
    pub fn connect(
        &self,
        participant: ParticipantId,
    ) -> (mpsc::Receiver<ServerMsg>, broadcast::Receiver<Outbound>) {
        (self.observers.register(participant), self.effects_tx.subscribe())
    }

    pub fn disconnect(&self, participant: ParticipantId) {
        self.observers.unregister(participant);
    }

    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }
}

/// The authoritative session
pub struct GameSession {
    state: SessionState,
    input_rx: mpsc::Receiver<PlayerInput>,
    observers: ObserverRegistry,
    effects_tx: broadcast::Sender<Outbound>,
    status: Arc<RwLock<SessionStatus>>,
    tick_duration: Duration,
}

impl GameSession {
    /// Create a new session in the lobby
    pub fn new(config: &Config, layout: &LevelLayout) -> (Self, SessionHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let observers = ObserverRegistry::new(OBSERVER_BUFFER);
        let (effects_tx, _) = broadcast::channel(32);
        let status = Arc::new(RwLock::new(SessionStatus {
            in_lobby: true,
            ..SessionStatus::default()
        }));

        let handle = SessionHandle {
            input_tx,
            observers: observers.clone(),
            effects_tx: effects_tx.clone(),
            status: status.clone(),
        };

        let session = Self {
            state: SessionState::new(Role::Authority, SessionSettings::from(config), layout),
            input_rx,
            observers,
            effects_tx,
            status,
            tick_duration: config.tick_duration(),
        };

        (session, handle)
    }

    /// Run the authoritative tick loop until every input sender is gone
    pub async fn run(mut self) {
        info!(tick_ms = self.tick_duration.as_millis() as u64, "Session loop started");

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;
            let now = Instant::now();

            // Drain input queue
            let open = self.process_inputs(now);

            // Run simulation tick
            self.state.tick(now);

            self.flush();
            *self.status.write() = SessionStatus::capture(&self.state);

            if !open {
                info!("Input channel closed, ending session");
                break;
            }
        }
    }

    /// Returns false once the input channel is closed
    fn process_inputs(&mut self, now: Instant) -> bool {
        loop {
            match self.input_rx.try_recv() {
                Ok(input) => self.state.handle_input(input, now),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Deliver everything the tick produced
    fn flush(&mut self) {
        let (reliable, unreliable) = self.state.outbox_mut().drain();
        let dropped = self.observers.deliver(reliable);
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "Slow observers dropped");
        }
        for msg in unreliable {
            if self.effects_tx.send(msg).is_err() {
                debug!("No effect subscribers");
            }
        }
    }
}
