pub mod client;
pub mod wire;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Domain types: independent of the tournament service wire format
// ---------------------------------------------------------------------------

/// Everything the tournament service returns from one snapshot poll.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub teams: Vec<Team>,
    pub matches: Vec<Match>,
}

impl Snapshot {
    pub fn find_match(&self, match_id: &str) -> Option<&Match> {
        self.matches.iter().find(|m| same_id(&m.id, match_id))
    }

    pub fn team(&self, team_id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| same_id(&t.id, team_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub players: Vec<Player>,
}

impl Team {
    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| same_id(&p.id, player_id))
    }

    /// Look a player up by id, falling back to the shirt number.
    pub fn player(&self, key: &str) -> Option<&Player> {
        if let Some(player) = self.players.iter().find(|p| same_id(&p.id, key)) {
            return Some(player);
        }
        let number = key.trim().trim_start_matches('#').parse::<u8>().ok()?;
        self.players.iter().find(|p| p.number == Some(number))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub number: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchStatus {
    #[default]
    Upcoming,
    Live,
    /// Client-only refinement of `Live`; never persisted as such.
    HalfTime,
    Completed,
}

impl MatchStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, MatchStatus::Live | MatchStatus::HalfTime)
    }

    /// The status string the service persists. Half-time collapses to "live".
    pub fn wire_name(&self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Live | MatchStatus::HalfTime => "live",
            MatchStatus::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "Upcoming",
            MatchStatus::Live => "Live",
            MatchStatus::HalfTime => "Half-time",
            MatchStatus::Completed => "Full-time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Match {
    pub id: String,
    pub home_team_id: String,
    pub away_team_id: String,
    /// Local wall-clock date and time the match is meant to begin.
    pub scheduled_start: Option<NaiveDateTime>,
    pub status: MatchStatus,
    pub home_score: u16,
    pub away_score: u16,
    /// Insertion order as stored by the service.
    pub events: Vec<MatchEvent>,
    pub current_minute: u16,
}

impl Match {
    /// The scheduled start as an instant, resolved through the local time zone.
    pub fn kickoff(&self) -> Option<DateTime<Utc>> {
        let naive = self.scheduled_start?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn side_of(&self, team_id: &str) -> Option<Side> {
        if same_id(&self.home_team_id, team_id) {
            Some(Side::Home)
        } else if same_id(&self.away_team_id, team_id) {
            Some(Side::Away)
        } else {
            None
        }
    }

    pub fn team_id(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home_team_id,
            Side::Away => &self.away_team_id,
        }
    }

    pub fn score(&self, side: Side) -> u16 {
        match side {
            Side::Home => self.home_score,
            Side::Away => self.away_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Goal,
    YellowCard,
    RedCard,
    Substitution,
}

impl EventKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            EventKind::Goal => "goal",
            EventKind::YellowCard => "yellow_card",
            EventKind::RedCard => "red_card",
            EventKind::Substitution => "substitution",
        }
    }

    pub fn is_card(&self) -> bool {
        matches!(self, EventKind::YellowCard | EventKind::RedCard)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchEvent {
    pub id: String,
    pub kind: Option<EventKind>,
    pub player_id: String,
    pub player_name: String,
    /// Team id the event belongs to. `None` only for legacy rows.
    pub team: Option<String>,
    pub minute: u16,
    pub description: String,
    /// Player leaving the pitch; substitutions only.
    pub out_player_id: Option<String>,
}

impl MatchEvent {
    pub fn is_goal(&self) -> bool {
        self.kind == Some(EventKind::Goal)
    }

    pub fn default_description(
        kind: EventKind,
        player_name: &str,
        out_name: Option<&str>,
    ) -> String {
        match kind {
            EventKind::Goal => format!("Goal by {player_name}"),
            EventKind::YellowCard => format!("Yellow card for {player_name}"),
            EventKind::RedCard => format!("Red card for {player_name}"),
            EventKind::Substitution => match out_name {
                Some(out) => format!("{player_name} replaces {out}"),
                None => format!("{player_name} comes on"),
            },
        }
    }
}

/// Partial match write. `None` fields are left untouched by the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchUpdate {
    pub home_score: Option<u16>,
    pub away_score: Option<u16>,
    pub events: Option<Vec<MatchEvent>>,
    pub status: Option<MatchStatus>,
    pub minute: Option<u16>,
}

/// Aggregate statistics for the separate stats channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStats {
    pub possession_home: u8,
    pub possession_away: u8,
    pub shots_home: u16,
    pub shots_away: u16,
    pub shots_on_target_home: u16,
    pub shots_on_target_away: u16,
    pub corners_home: u16,
    pub corners_away: u16,
    pub fouls_home: u16,
    pub fouls_away: u16,
}

impl MatchStats {
    pub fn validate(&self) -> Result<(), String> {
        let possession = u16::from(self.possession_home) + u16::from(self.possession_away);
        if possession != 100 {
            return Err(format!("possession must add up to 100, got {possession}"));
        }
        if self.shots_on_target_home > self.shots_home {
            return Err("home shots on target exceed home shots".into());
        }
        if self.shots_on_target_away > self.shots_away {
            return Err("away shots on target exceed away shots".into());
        }
        Ok(())
    }
}

/// Ids are compared on their trimmed string form once past the wire adapter.
pub fn same_id(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Team {
        Team {
            id: "t1".into(),
            name: "Rovers".into(),
            players: vec![
                Player { id: "p1".into(), name: "Ada".into(), number: Some(9) },
                Player { id: "p2".into(), name: "Ben".into(), number: None },
            ],
        }
    }

    #[test]
    fn player_lookup_falls_back_to_shirt_number() {
        let team = roster();
        assert_eq!(team.player("p2").map(|p| p.name.as_str()), Some("Ben"));
        assert_eq!(team.player("#9").map(|p| p.name.as_str()), Some("Ada"));
        assert_eq!(team.player("9").map(|p| p.name.as_str()), Some("Ada"));
        assert!(team.player("10").is_none());
    }

    #[test]
    fn half_time_is_persisted_as_live() {
        assert_eq!(MatchStatus::HalfTime.wire_name(), "live");
        assert!(MatchStatus::HalfTime.is_live());
        assert!(!MatchStatus::Completed.is_live());
    }

    #[test]
    fn side_lookup_ignores_surrounding_whitespace() {
        let m = Match { home_team_id: "h".into(), away_team_id: "a".into(), ..Default::default() };
        assert_eq!(m.side_of(" h "), Some(Side::Home));
        assert_eq!(m.side_of("a"), Some(Side::Away));
        assert_eq!(m.side_of(""), None);
    }

    #[test]
    fn stats_validation_checks_possession_and_shots() {
        let mut stats = MatchStats {
            possession_home: 55,
            possession_away: 45,
            shots_home: 8,
            shots_on_target_home: 3,
            ..Default::default()
        };
        assert!(stats.validate().is_ok());
        stats.possession_away = 50;
        assert!(stats.validate().is_err());
        stats.possession_away = 45;
        stats.shots_on_target_away = 1;
        assert!(stats.validate().is_err());
    }
}
