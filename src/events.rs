use chrono::{DateTime, Utc};
use log::warn;
use matchday_api::{EventKind, Match, MatchEvent, Team, same_id};
use std::collections::HashSet;

const FIRST_HALF_LAST_MINUTE: u16 = 45;
const REGULATION_LAST_MINUTE: u16 = 90;

/// Id for an event created on this client, replaced once the service's copy
/// is recognised by `merge_events`.
pub fn local_event_id(now: DateTime<Utc>) -> String {
    format!("event{}", now.timestamp_millis())
}

pub fn is_local_id(id: &str) -> bool {
    id.strip_prefix("event")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Team an event counts for. Legacy rows without a `team` fall back to the
/// roster that contains the player.
pub fn attribute<'a>(event: &'a MatchEvent, teams: &'a [Team]) -> Option<&'a str> {
    if let Some(team) = event.team.as_deref()
        && !team.trim().is_empty()
    {
        return Some(team);
    }
    teams
        .iter()
        .find(|t| t.has_player(&event.player_id))
        .map(|t| t.id.as_str())
}

pub fn derived_score(events: &[MatchEvent], team_id: &str, teams: &[Team]) -> u16 {
    events
        .iter()
        .filter(|e| e.is_goal())
        .filter(|e| attribute(e, teams).is_some_and(|t| same_id(t, team_id)))
        .count() as u16
}

/// Stored score fields next to the score the event list implies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreCheck {
    pub stored_home: u16,
    pub stored_away: u16,
    pub derived_home: u16,
    pub derived_away: u16,
}

impl ScoreCheck {
    pub fn is_consistent(&self) -> bool {
        self.stored_home == self.derived_home && self.stored_away == self.derived_away
    }
}

pub fn check_score(m: &Match, teams: &[Team]) -> ScoreCheck {
    let check = ScoreCheck {
        stored_home: m.home_score,
        stored_away: m.away_score,
        derived_home: derived_score(&m.events, &m.home_team_id, teams),
        derived_away: derived_score(&m.events, &m.away_team_id, teams),
    };
    if !check.is_consistent() {
        warn!(
            "match {}: stored score {}-{} disagrees with goal events {}-{}",
            m.id, check.stored_home, check.stored_away, check.derived_home, check.derived_away
        );
    }
    check
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamStats {
    pub goals: u16,
    pub yellow_cards: u16,
    pub red_cards: u16,
    pub substitutions: u16,
}

pub fn team_stats(events: &[MatchEvent], team_id: &str, teams: &[Team]) -> TeamStats {
    let mut stats = TeamStats::default();
    for event in events {
        if !attribute(event, teams).is_some_and(|t| same_id(t, team_id)) {
            continue;
        }
        match event.kind {
            Some(EventKind::Goal) => stats.goals += 1,
            Some(EventKind::YellowCard) => stats.yellow_cards += 1,
            Some(EventKind::RedCard) => stats.red_cards += 1,
            Some(EventKind::Substitution) => stats.substitutions += 1,
            None => {}
        }
    }
    stats
}

/// Events newest-first, split into First Half (≤45), Second Half (46–90)
/// and Extra Time (>90). Boundaries are found once on the sorted list.
#[derive(Debug)]
pub struct EventGroups<'a> {
    sorted: Vec<&'a MatchEvent>,
    extra_end: usize,
    second_end: usize,
}

impl<'a> EventGroups<'a> {
    pub fn new(events: &'a [MatchEvent]) -> Self {
        let mut sorted: Vec<&MatchEvent> = events.iter().rev().collect();
        sorted.sort_by(|a, b| b.minute.cmp(&a.minute));
        let extra_end = sorted.partition_point(|e| e.minute > REGULATION_LAST_MINUTE);
        let second_end = sorted.partition_point(|e| e.minute > FIRST_HALF_LAST_MINUTE);
        Self { sorted, extra_end, second_end }
    }

    pub fn extra_time(&self) -> &[&'a MatchEvent] {
        &self.sorted[..self.extra_end]
    }

    pub fn second_half(&self) -> &[&'a MatchEvent] {
        &self.sorted[self.extra_end..self.second_end]
    }

    pub fn first_half(&self) -> &[&'a MatchEvent] {
        &self.sorted[self.second_end..]
    }

    /// Non-empty buckets with their labels, latest period first.
    pub fn labeled(&self) -> Vec<(&'static str, &[&'a MatchEvent])> {
        [
            ("Extra Time", self.extra_time()),
            ("Second Half", self.second_half()),
            ("First Half", self.first_half()),
        ]
        .into_iter()
        .filter(|(_, events)| !events.is_empty())
        .collect()
    }
}

/// Merge a locally held event list with the service's copy.
///
/// The service's order comes first. Local events it does not know are kept
/// after it; a locally created event whose content matches a service event
/// is taken to be that event under its server id. Nothing is dropped.
pub fn merge_events(local: &[MatchEvent], server: &[MatchEvent]) -> Vec<MatchEvent> {
    let local_ids: HashSet<&str> = local.iter().map(|e| e.id.as_str()).collect();
    let server_ids: HashSet<&str> = server.iter().map(|e| e.id.as_str()).collect();
    let mut claimed: Vec<bool> = server
        .iter()
        .map(|e| local_ids.contains(e.id.as_str()))
        .collect();

    let mut merged = server.to_vec();
    for event in local {
        if server_ids.contains(event.id.as_str()) {
            continue;
        }
        if is_local_id(&event.id) {
            let confirmed = server
                .iter()
                .enumerate()
                .position(|(i, s)| !claimed[i] && !is_local_id(&s.id) && same_content(s, event));
            if let Some(index) = confirmed {
                claimed[index] = true;
                continue;
            }
        }
        merged.push(event.clone());
    }
    merged
}

fn same_content(a: &MatchEvent, b: &MatchEvent) -> bool {
    a.kind == b.kind
        && a.minute == b.minute
        && same_id(&a.player_id, &b.player_id)
        && match (a.team.as_deref(), b.team.as_deref()) {
            (Some(x), Some(y)) => same_id(x, y),
            (None, None) => true,
            _ => false,
        }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchday_api::Player;

    fn goal(id: &str, team: Option<&str>, player: &str, minute: u16) -> MatchEvent {
        MatchEvent {
            id: id.into(),
            kind: Some(EventKind::Goal),
            player_id: player.into(),
            player_name: player.to_uppercase(),
            team: team.map(Into::into),
            minute,
            description: String::new(),
            out_player_id: None,
        }
    }

    fn card(id: &str, team: &str, minute: u16) -> MatchEvent {
        MatchEvent {
            kind: Some(EventKind::YellowCard),
            ..goal(id, Some(team), "p3", minute)
        }
    }

    fn teams() -> Vec<Team> {
        let player = |id: &str| Player { id: id.into(), name: id.into(), number: None };
        vec![
            Team {
                id: "home".into(),
                name: "Rovers".into(),
                players: vec![player("p1"), player("p2")],
            },
            Team { id: "away".into(), name: "United".into(), players: vec![player("p3")] },
        ]
    }

    #[test]
    fn derived_score_counts_goals_per_team() {
        let events = vec![
            goal("e1", Some("home"), "p1", 10),
            goal("e2", Some("home"), "p2", 30),
            card("e3", "away", 31),
        ];
        assert_eq!(derived_score(&events, "home", &teams()), 2);
        assert_eq!(derived_score(&events, "away", &teams()), 0);
    }

    #[test]
    fn missing_team_falls_back_to_roster() {
        let mut events =
            vec![goal("e1", Some("home"), "p1", 10), goal("e2", Some("home"), "p2", 30)];
        events[1].team = None;
        assert_eq!(derived_score(&events, "home", &teams()), 2);

        events[1].player_id = "stranger".into();
        assert_eq!(derived_score(&events, "home", &teams()), 1);
    }

    #[test]
    fn score_check_flags_divergence_but_keeps_stored_score() {
        let m = Match {
            id: "m1".into(),
            home_team_id: "home".into(),
            away_team_id: "away".into(),
            home_score: 2,
            away_score: 0,
            events: vec![goal("e1", Some("home"), "p1", 10)],
            ..Default::default()
        };
        let check = check_score(&m, &teams());
        assert!(!check.is_consistent());
        assert_eq!((check.stored_home, check.stored_away), (2, 0));
        assert_eq!(check.derived_home, 1);
    }

    #[test]
    fn team_stats_tally_each_kind() {
        let events = vec![
            goal("e1", Some("away"), "p3", 5),
            card("e2", "away", 6),
            MatchEvent { kind: Some(EventKind::RedCard), ..card("e3", "away", 70) },
            MatchEvent { kind: Some(EventKind::Substitution), ..card("e4", "home", 71) },
        ];
        let stats = team_stats(&events, "away", &teams());
        assert_eq!(
            stats,
            TeamStats { goals: 1, yellow_cards: 1, red_cards: 1, substitutions: 0 }
        );
    }

    #[test]
    fn groups_split_on_period_boundaries() {
        let events = vec![
            goal("a", Some("home"), "p1", 45),
            goal("b", Some("home"), "p1", 46),
            goal("c", Some("home"), "p1", 90),
            goal("d", Some("home"), "p1", 91),
            goal("e", Some("home"), "p1", 3),
        ];
        let groups = EventGroups::new(&events);
        let ids = |slice: &[&MatchEvent]| slice.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(groups.extra_time()), vec!["d"]);
        assert_eq!(ids(groups.second_half()), vec!["c", "b"]);
        assert_eq!(ids(groups.first_half()), vec!["a", "e"]);
        assert_eq!(groups.labeled().len(), 3);
    }

    #[test]
    fn groups_keep_newest_first_within_a_minute() {
        let events =
            vec![goal("first", Some("home"), "p1", 20), goal("second", Some("home"), "p2", 20)];
        let groups = EventGroups::new(&events);
        assert_eq!(groups.first_half()[0].id, "second");
        assert!(groups.extra_time().is_empty());
        assert_eq!(groups.labeled().len(), 1);
    }

    #[test]
    fn local_ids_are_recognised() {
        assert!(is_local_id("event1714575600000"));
        assert!(!is_local_id("event"));
        assert!(!is_local_id("66304f1c9a"));
        let now = DateTime::from_timestamp_millis(1_714_575_600_000).unwrap();
        assert_eq!(local_event_id(now), "event1714575600000");
    }

    #[test]
    fn merge_adopts_server_id_for_confirmed_local_event() {
        let local = vec![
            goal("srv-1", Some("home"), "p1", 10),
            goal("event1714575600000", Some("home"), "p2", 30),
        ];
        let server =
            vec![goal("srv-1", Some("home"), "p1", 10), goal("srv-2", Some("home"), "p2", 30)];
        let merged = merge_events(&local, &server);
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["srv-1", "srv-2"]);
    }

    #[test]
    fn merge_keeps_unconfirmed_local_events_after_server_ones() {
        let local = vec![goal("event1", Some("home"), "p2", 30), card("legacy", "away", 12)];
        let server = vec![goal("srv-1", Some("away"), "p3", 5)];
        let merged = merge_events(&local, &server);
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["srv-1", "event1", "legacy"]);
    }

    #[test]
    fn merge_never_claims_one_server_event_twice() {
        let local =
            vec![goal("event1", Some("home"), "p1", 30), goal("event2", Some("home"), "p1", 30)];
        let server = vec![goal("srv-1", Some("home"), "p1", 30)];
        let merged = merge_events(&local, &server);
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["srv-1", "event2"]);
    }
}
