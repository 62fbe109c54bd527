//! Session-wide lobby/active flag

use crate::ws::protocol::FieldChange;

use super::replication::{Replicable, Replicated, ReplicatedChange};

/// Lobby vs active play. Created in the lobby when a session starts and
/// flipped once by the authority. It returns to the lobby only when every
/// participant has left.
#[derive(Debug)]
pub struct MatchState {
    in_lobby: Replicated<bool>,
}

impl MatchState {
    pub fn new() -> Self {
        Self {
            in_lobby: Replicated::new(true),
        }
    }

    pub fn in_lobby(&self) -> bool {
        *self.in_lobby.get()
    }

    /// Returns true if this call ended the lobby
    pub fn start(&mut self) -> bool {
        if !self.in_lobby() {
            return false;
        }
        self.in_lobby.set(false);
        true
    }

    /// Back to the lobby once the session empties. Returns true if a match
    /// was in progress.
    pub fn reset(&mut self) -> bool {
        if self.in_lobby() {
            return false;
        }
        self.in_lobby.set(true);
        true
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl Replicable for MatchState {
    fn collect_changes(&mut self, out: &mut Vec<ReplicatedChange>) {
        if let Some(value) = self.in_lobby.take_dirty() {
            out.push(ReplicatedChange::all(FieldChange::InLobby { value: *value }));
        }
    }

    fn full_state(&self, out: &mut Vec<ReplicatedChange>) {
        out.push(ReplicatedChange::all(FieldChange::InLobby {
            value: self.in_lobby(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_lobby_and_stays_active_once_started() {
        let mut state = MatchState::new();
        assert!(state.in_lobby());

        assert!(state.start());
        assert!(!state.in_lobby());

        assert!(!state.start());
        assert!(!state.in_lobby());
    }

    #[test]
    fn reset_reopens_the_lobby() {
        let mut state = MatchState::new();
        assert!(!state.reset());

        state.start();
        assert!(state.reset());
        assert!(state.in_lobby());
        assert!(state.start());
    }

    #[test]
    fn start_is_replicated_once() {
        let mut state = MatchState::new();
        let mut out = Vec::new();
        state.collect_changes(&mut out);
        assert_eq!(out.len(), 1);

        out.clear();
        state.start();
        state.start();
        state.collect_changes(&mut out);
        assert_eq!(out, vec![ReplicatedChange::all(FieldChange::InLobby { value: false })]);
    }
}
