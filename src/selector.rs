use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use matchday_api::{Match, MatchStatus, same_id};

/// How long after its scheduled kickoff an unstarted match stays selectable.
pub const DEFAULT_KICKOFF_WINDOW_HOURS: i64 = 4;

/// Picks the match this client should be running.
///
/// A selection is sticky: it survives refreshes for as long as the match is
/// still a candidate, even when another match goes live.
#[derive(Debug, Clone)]
pub struct MatchSelector {
    window: TimeDelta,
    selected: Option<String>,
}

impl Default for MatchSelector {
    fn default() -> Self {
        Self::new(TimeDelta::hours(DEFAULT_KICKOFF_WINDOW_HOURS))
    }
}

impl MatchSelector {
    pub fn new(window: TimeDelta) -> Self {
        Self { window, selected: None }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Live, half-time, or kicked off within the window and not yet completed.
    pub fn is_candidate(&self, m: &Match, now: DateTime<Utc>) -> bool {
        match m.status {
            MatchStatus::Live | MatchStatus::HalfTime => true,
            MatchStatus::Completed => false,
            MatchStatus::Upcoming => m.kickoff().is_some_and(|kickoff| {
                let since = now - kickoff;
                since >= TimeDelta::zero() && since < self.window
            }),
        }
    }

    pub fn candidates<'a>(&self, matches: &'a [Match], now: DateTime<Utc>) -> Vec<&'a Match> {
        matches.iter().filter(|m| self.is_candidate(m, now)).collect()
    }

    /// Re-run the selection against a fresh collection and return the
    /// selected id. Keeps the current pick while it qualifies, otherwise
    /// falls back to the first live candidate, then the first candidate.
    pub fn recompute(&mut self, matches: &[Match], now: DateTime<Utc>) -> Option<&str> {
        let candidates = self.candidates(matches, now);
        let keep = self
            .selected
            .as_deref()
            .is_some_and(|id| candidates.iter().any(|m| same_id(&m.id, id)));

        if !keep {
            let next = candidates
                .iter()
                .find(|m| m.status.is_live())
                .or(candidates.first())
                .map(|m| m.id.clone());
            if next != self.selected {
                debug!("selection moved from {:?} to {:?}", self.selected, next);
            }
            self.selected = next;
        }
        self.selected.as_deref()
    }

    /// Explicit pick. Refused unless the match is a candidate right now.
    pub fn select(&mut self, matches: &[Match], match_id: &str, now: DateTime<Utc>) -> bool {
        let Some(m) = matches
            .iter()
            .find(|m| same_id(&m.id, match_id) && self.is_candidate(m, now))
        else {
            return false;
        };
        self.selected = Some(m.id.clone());
        true
    }

    /// Step to the next candidate, wrapping around.
    pub fn cycle(&mut self, matches: &[Match], now: DateTime<Utc>) -> Option<&str> {
        let candidates = self.candidates(matches, now);
        if candidates.is_empty() {
            self.selected = None;
            return None;
        }
        let next = self
            .selected
            .as_deref()
            .and_then(|id| candidates.iter().position(|m| same_id(&m.id, id)))
            .map_or(0, |i| (i + 1) % candidates.len());
        self.selected = Some(candidates[next].id.clone());
        self.selected.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, h, m, 0).unwrap()
    }

    fn fixture(id: &str, status: MatchStatus, kickoff: DateTime<Utc>) -> Match {
        Match {
            id: id.into(),
            home_team_id: format!("{id}-home"),
            away_team_id: format!("{id}-away"),
            scheduled_start: Some(kickoff.with_timezone(&Local).naive_local()),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_a_live_match_over_a_recent_kickoff() {
        let matches = vec![
            fixture("a", MatchStatus::Upcoming, at(14, 0)),
            fixture("b", MatchStatus::Live, at(15, 0)),
        ];
        let mut selector = MatchSelector::default();
        assert_eq!(selector.recompute(&matches, at(15, 10)), Some("b"));
    }

    #[test]
    fn falls_back_to_the_first_candidate() {
        let matches = vec![
            fixture("done", MatchStatus::Completed, at(14, 0)),
            fixture("a", MatchStatus::Upcoming, at(14, 30)),
            fixture("b", MatchStatus::Upcoming, at(15, 0)),
        ];
        let mut selector = MatchSelector::default();
        assert_eq!(selector.recompute(&matches, at(15, 5)), Some("a"));
    }

    #[test]
    fn selection_is_stable_while_it_qualifies() {
        let mut matches = vec![
            fixture("a", MatchStatus::Live, at(15, 0)),
            fixture("b", MatchStatus::Upcoming, at(15, 0)),
        ];
        let mut selector = MatchSelector::default();
        assert!(selector.select(&matches, "b", at(15, 5)));

        matches.push(fixture("c", MatchStatus::Live, at(15, 0)));
        for minute in [10, 20, 30] {
            assert_eq!(selector.recompute(&matches, at(15, minute)), Some("b"));
        }
    }

    #[test]
    fn completed_selection_moves_on_or_clears() {
        let mut matches = vec![
            fixture("a", MatchStatus::Live, at(15, 0)),
            fixture("b", MatchStatus::Live, at(15, 0)),
        ];
        let mut selector = MatchSelector::default();
        assert_eq!(selector.recompute(&matches, at(15, 10)), Some("a"));

        matches[0].status = MatchStatus::Completed;
        assert_eq!(selector.recompute(&matches, at(16, 50)), Some("b"));

        matches[1].status = MatchStatus::Completed;
        assert_eq!(selector.recompute(&matches, at(16, 55)), None);
        assert_eq!(selector.selected(), None);
    }

    #[test]
    fn kickoff_window_is_four_hours() {
        let m = fixture("a", MatchStatus::Upcoming, at(12, 0));
        let selector = MatchSelector::default();
        assert!(!selector.is_candidate(&m, at(11, 59)));
        assert!(selector.is_candidate(&m, at(12, 0)));
        assert!(selector.is_candidate(&m, at(15, 59)));
        assert!(!selector.is_candidate(&m, at(16, 0)));

        let unscheduled = Match { scheduled_start: None, ..m };
        assert!(!selector.is_candidate(&unscheduled, at(12, 30)));
    }

    #[test]
    fn explicit_select_refuses_non_candidates() {
        let matches = vec![
            fixture("a", MatchStatus::Live, at(15, 0)),
            fixture("done", MatchStatus::Completed, at(13, 0)),
        ];
        let mut selector = MatchSelector::default();
        assert!(!selector.select(&matches, "done", at(15, 10)));
        assert!(!selector.select(&matches, "missing", at(15, 10)));
        assert!(selector.select(&matches, " a ", at(15, 10)));
        assert_eq!(selector.selected(), Some("a"));
    }

    #[test]
    fn cycle_wraps_through_candidates() {
        let matches = vec![
            fixture("a", MatchStatus::Live, at(15, 0)),
            fixture("b", MatchStatus::HalfTime, at(15, 0)),
            fixture("done", MatchStatus::Completed, at(15, 0)),
        ];
        let mut selector = MatchSelector::default();
        assert_eq!(selector.cycle(&matches, at(15, 10)), Some("a"));
        assert_eq!(selector.cycle(&matches, at(15, 10)), Some("b"));
        assert_eq!(selector.cycle(&matches, at(15, 10)), Some("a"));
        assert_eq!(selector.cycle(&[], at(15, 10)), None);
    }
}
