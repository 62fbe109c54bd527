//! Team roster and balancing

use serde::{Deserialize, Serialize};

use super::ParticipantId;

/// The two sides of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Blue,
    Red,
}

impl Default for Team {
    fn default() -> Self {
        Self::Blue
    }
}

/// Membership of both teams in join order
#[derive(Debug, Default)]
pub struct TeamRoster {
    blue: Vec<ParticipantId>,
    red: Vec<ParticipantId>,
}

impl TeamRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a participant on the smaller team, Blue on a tie.
    ///
    /// A participant that is already rostered keeps its team; teams are
    /// never switched mid-match.
    pub fn assign(&mut self, participant: ParticipantId) -> Team {
        if let Some(team) = self.team_of(participant) {
            return team;
        }

        let team = if self.red.len() < self.blue.len() {
            Team::Red
        } else {
            Team::Blue
        };
        self.members_mut(team).push(participant);
        team
    }

    /// Drop a participant on disconnect
    pub fn remove(&mut self, participant: ParticipantId) -> Option<Team> {
        for team in [Team::Blue, Team::Red] {
            let members = self.members_mut(team);
            if let Some(pos) = members.iter().position(|p| *p == participant) {
                members.remove(pos);
                return Some(team);
            }
        }
        None
    }

    pub fn team_of(&self, participant: ParticipantId) -> Option<Team> {
        if self.blue.contains(&participant) {
            Some(Team::Blue)
        } else if self.red.contains(&participant) {
            Some(Team::Red)
        } else {
            None
        }
    }

    pub fn members(&self, team: Team) -> &[ParticipantId] {
        match team {
            Team::Blue => &self.blue,
            Team::Red => &self.red,
        }
    }

    #[cfg(test)]
    pub fn count(&self, team: Team) -> usize {
        self.members(team).len()
    }

    fn members_mut(&mut self, team: Team) -> &mut Vec<ParticipantId> {
        match team {
            Team::Blue => &mut self.blue,
            Team::Red => &mut self.red,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tie_goes_to_blue() {
        let mut roster = TeamRoster::new();
        assert_eq!(roster.assign(ParticipantId::new()), Team::Blue);
        assert_eq!(roster.assign(ParticipantId::new()), Team::Red);
        assert_eq!(roster.assign(ParticipantId::new()), Team::Blue);
    }

    #[test]
    fn counts_never_differ_by_more_than_one() {
        let mut roster = TeamRoster::new();
        for _ in 0..25 {
            roster.assign(ParticipantId::new());
            let blue = roster.count(Team::Blue) as i64;
            let red = roster.count(Team::Red) as i64;
            assert!((blue - red).abs() <= 1);
            assert!(blue >= red);
        }
    }

    #[test]
    fn refills_the_short_side_after_a_leave() {
        let mut roster = TeamRoster::new();
        let first = ParticipantId::new();
        roster.assign(first);
        roster.assign(ParticipantId::new());
        roster.assign(ParticipantId::new());

        assert_eq!(roster.remove(first), Some(Team::Blue));
        // 1 blue, 1 red: tie resolves to blue
        assert_eq!(roster.assign(ParticipantId::new()), Team::Blue);
    }

    #[test]
    fn reassigning_keeps_the_original_team() {
        let mut roster = TeamRoster::new();
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        roster.assign(a);
        assert_eq!(roster.assign(b), Team::Red);
        assert_eq!(roster.assign(b), Team::Red);
        assert_eq!(roster.count(Team::Red), 1);
    }
}
