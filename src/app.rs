use crate::clock::Period;
use crate::report;
use crate::session::{PendingWrite, RefreshOutcome, SessionContext, SessionError, SessionResult};
use crate::state::app_settings::AppSettings;
use crate::state::app_state::AppState;
use crate::state::messages::NetworkRequest;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, error};
use matchday_api::{EventKind, Match, MatchStats, MatchStatus, Side, Snapshot};

pub struct App {
    pub settings: AppSettings,
    pub state: AppState,
}

impl App {
    pub fn new(settings: AppSettings) -> Self {
        let context = SessionContext { actor: settings.actor.clone(), role: settings.role };
        let write_timeout =
            TimeDelta::from_std(settings.write_timeout).unwrap_or_else(|_| TimeDelta::seconds(12));
        Self { state: AppState::new(context, write_timeout), settings }
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.state.notices)
    }

    // -----------------------------------------------------------------------
    // Network response handlers, called from main_loop
    // -----------------------------------------------------------------------

    pub fn on_snapshot_loaded(&mut self, snapshot: Snapshot, now: DateTime<Utc>) {
        self.state.loading = false;
        self.state.notify(format!(
            "Loaded {} teams and {} matches from {}.",
            snapshot.teams.len(),
            snapshot.matches.len(),
            self.settings.api_url
        ));
        self.on_snapshot(snapshot, now);
        if self.state.session.current().is_none() {
            self.state.notify("No live match right now; `matches` lists what can be selected.");
        }
    }

    pub fn on_load_failed(&mut self, message: String) {
        self.state.loading = false;
        self.on_error(format!("could not load the tournament: {message}"));
    }

    /// Nothing left to wait for before exiting: the startup load has
    /// answered and no write is pending.
    pub fn is_idle(&self) -> bool {
        !self.state.loading && !self.state.session.is_busy()
    }

    pub fn on_snapshot_refreshed(&mut self, snapshot: Snapshot, now: DateTime<Utc>) {
        self.on_snapshot(snapshot, now);
    }

    pub fn on_write_settled(
        &mut self,
        token: u64,
        result: Result<Match, String>,
        now: DateTime<Utc>,
    ) {
        match self.state.session.resolve(token, result, now) {
            Ok(()) => {
                if let Some(m) = self.state.session.current() {
                    let line = report::headline(&self.state.session, m, now);
                    self.state.notify(line);
                }
            }
            Err(e) => self.on_error(e.to_string()),
        }
    }

    pub fn on_stats_saved(&mut self, match_id: String) {
        self.state.notify(format!("Statistics saved for match {match_id}."));
    }

    pub fn on_error(&mut self, message: String) {
        self.state.notify(format!("error: {message}"));
        self.state.last_error = Some(message);
    }

    /// Advance the clock, expire a stuck write, announce period changes.
    pub fn on_clock_tick(&mut self, now: DateTime<Utc>) {
        if let Some(e) = self.state.session.expire_in_flight(now) {
            self.on_error(e.to_string());
        }
        let Some(status) = self.state.session.current().map(|m| m.status) else {
            return;
        };
        let reading = self.state.session.tick(now);
        if reading.period == self.state.last_period {
            return;
        }
        self.state.last_period = reading.period;
        match reading.period {
            Period::HalfTime => self.state.notify(format!("Half-time at {}.", reading.display())),
            Period::SecondHalf => self.state.notify("Second half under way."),
            Period::StoppageTime => self.state.notify("Stoppage time."),
            Period::Completed if status != MatchStatus::Completed => self.state.notify(
                "The clock has run out. Run `complete` to record the final result.",
            ),
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    pub fn start_match(&mut self, now: DateTime<Utc>) -> Option<NetworkRequest> {
        let result = self.state.session.start_match(now);
        self.submit(result, now)
    }

    pub fn record_goal(
        &mut self,
        side: Side,
        player: &str,
        now: DateTime<Utc>,
    ) -> Option<NetworkRequest> {
        let team_id = self.team_id(side)?;
        let result = self.state.session.record_goal(&team_id, player, now);
        self.submit(result, now)
    }

    pub fn record_card(
        &mut self,
        kind: EventKind,
        side: Side,
        player: &str,
        now: DateTime<Utc>,
    ) -> Option<NetworkRequest> {
        let team_id = self.team_id(side)?;
        let result = self.state.session.record_card(kind, &team_id, player, now);
        self.submit(result, now)
    }

    pub fn record_substitution(
        &mut self,
        side: Side,
        out_player: &str,
        in_player: &str,
        now: DateTime<Utc>,
    ) -> Option<NetworkRequest> {
        let team_id = self.team_id(side)?;
        let result = self
            .state
            .session
            .record_substitution(&team_id, out_player, in_player, now);
        self.submit(result, now)
    }

    pub fn toggle_half_time(&mut self, now: DateTime<Utc>) -> Option<NetworkRequest> {
        let result = self.state.session.toggle_half_time(now);
        self.submit(result, now)
    }

    pub fn complete_match(&mut self, now: DateTime<Utc>) -> Option<NetworkRequest> {
        let result = self.state.session.complete_match(now);
        self.submit(result, now)
    }

    pub fn adjust_clock(&mut self, minutes: i32, seconds: i32, now: DateTime<Utc>) {
        match self.state.session.adjust_clock(minutes, seconds, now) {
            Ok(reading) => {
                self.state.last_period = reading.period;
                self.state.notify(format!("Clock set to {}.", reading.display()));
            }
            Err(e) => self.on_error(e.to_string()),
        }
    }

    pub fn select_match(&mut self, match_id: &str, now: DateTime<Utc>) {
        let selector = &mut self.state.tournament.selector;
        let Some(matches) = self.state.tournament.snapshot.as_ref().map(|s| s.matches.as_slice())
        else {
            self.on_error("the tournament has not loaded yet".into());
            return;
        };
        if !selector.select(matches, match_id, now) {
            self.on_error(format!("match {match_id} is not live or about to start"));
            return;
        }
        if self.state.session.is_busy() {
            self.state.notify(format!(
                "Switching to {} once the pending write settles.",
                match_id.trim()
            ));
        }
        self.follow_selection(Some(match_id.trim().to_string()), now);
    }

    /// Step to the next candidate when several matches run at once.
    pub fn next_match(&mut self, now: DateTime<Utc>) {
        let selector = &mut self.state.tournament.selector;
        let matches = self
            .state
            .tournament
            .snapshot
            .as_ref()
            .map(|s| s.matches.as_slice())
            .unwrap_or_default();
        let next = selector.cycle(matches, now).map(str::to_owned);
        self.follow_selection(next, now);
    }

    pub fn save_stats(&mut self, stats: MatchStats) -> Option<NetworkRequest> {
        if !self.state.session.context().role.can_record() {
            let error = SessionError::Permission("viewers may not save statistics".into());
            self.on_error(error.to_string());
            return None;
        }
        let Some(match_id) = self.state.session.current_id().map(str::to_owned) else {
            self.on_error("no match selected".into());
            return None;
        };
        Some(NetworkRequest::UpdateStats { match_id, stats })
    }

    fn team_id(&mut self, side: Side) -> Option<String> {
        match self.state.session.current() {
            Some(m) => Some(m.team_id(side).to_owned()),
            None => {
                self.on_error(SessionError::StaleSelection("no match selected".into()).to_string());
                None
            }
        }
    }

    fn submit(
        &mut self,
        result: SessionResult<PendingWrite>,
        now: DateTime<Utc>,
    ) -> Option<NetworkRequest> {
        match result {
            Ok(PendingWrite { token, match_id, write }) => {
                if let Some(m) = self.state.session.current() {
                    let line = report::headline(&self.state.session, m, now);
                    self.state.notify(line);
                }
                self.state.last_period = self.state.session.reading(now).period;
                Some(NetworkRequest::WriteMatch { token, match_id, write })
            }
            Err(e) => {
                self.on_error(e.to_string());
                None
            }
        }
    }

    /// Merge first, then follow the selector: a match that stopped qualifying
    /// still shows its final state but takes no more actions.
    fn on_snapshot(&mut self, snapshot: Snapshot, now: DateTime<Utc>) {
        self.state.last_error = None;
        let selected = self.state.tournament.store(snapshot, now);
        let was_stale = self.state.session.is_stale();
        if let Some(snapshot) = self.state.tournament.snapshot.as_ref() {
            match self.state.session.apply_refresh(snapshot, now) {
                RefreshOutcome::Stale if !was_stale => {
                    self.state.notify("The selected match is no longer in the tournament.")
                }
                RefreshOutcome::Stale => {}
                RefreshOutcome::Deferred => {
                    debug!("refresh deferred until the pending write settles")
                }
                RefreshOutcome::Applied | RefreshOutcome::NoSelection => {}
            }
        }
        self.follow_selection(selected, now);
    }

    fn follow_selection(&mut self, selected: Option<String>, now: DateTime<Utc>) {
        let Some(match_id) = selected else {
            if self.state.session.current().is_some() && !self.state.session.is_stale() {
                self.state.session.invalidate();
                self.state.notify("No live match left to run.");
            }
            return;
        };
        let Some(snapshot) = self.state.tournament.snapshot.as_ref() else {
            return;
        };
        match self.state.session.select_match(snapshot, &match_id, now) {
            Ok(true) => {
                self.state.last_period = self.state.session.reading(now).period;
                let board = report::scoreboard(&self.state, now);
                self.state.notify(format!("Now running match {match_id}.\n{board}"));
            }
            Ok(false) => {}
            Err(SessionError::Busy) => debug!("switch to {match_id} waits for the pending write"),
            Err(e) => {
                error!("could not select match {match_id}: {e}");
                self.on_error(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MatchWrite, Role};
    use chrono::{Local, TimeZone};
    use matchday_api::{Player, Team};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, h, m, 0).unwrap()
    }

    fn fixture(id: &str, status: MatchStatus) -> Match {
        Match {
            id: id.into(),
            home_team_id: "home".into(),
            away_team_id: "away".into(),
            scheduled_start: Some(at(15, 0).with_timezone(&Local).naive_local()),
            status,
            ..Default::default()
        }
    }

    fn snapshot(matches: Vec<Match>) -> Snapshot {
        Snapshot {
            teams: vec![
                Team {
                    id: "home".into(),
                    name: "Rovers".into(),
                    players: vec![Player { id: "h1".into(), name: "Ada".into(), number: Some(9) }],
                },
                Team {
                    id: "away".into(),
                    name: "United".into(),
                    players: vec![Player { id: "a1".into(), name: "Dee".into(), number: Some(7) }],
                },
            ],
            matches,
        }
    }

    fn app(role: Role) -> App {
        App::new(AppSettings { role, ..AppSettings::default() })
    }

    #[test]
    fn initial_load_selects_the_live_match() {
        let mut app = app(Role::Scorer);
        app.on_snapshot_loaded(snapshot(vec![fixture("m1", MatchStatus::Live)]), at(15, 10));
        assert_eq!(app.state.session.current_id(), Some("m1"));
        let notices = app.take_notices();
        assert!(notices.iter().any(|n| n.contains("Now running match m1")), "{notices:?}");
        assert!(app.take_notices().is_empty());
    }

    #[test]
    fn initial_load_reports_once_in_order() {
        let mut app = app(Role::Scorer);
        app.on_snapshot_loaded(snapshot(vec![fixture("m1", MatchStatus::Live)]), at(15, 10));
        let notices = app.take_notices();
        assert_eq!(notices.len(), 2, "{notices:?}");
        assert!(notices[0].starts_with("Loaded 2 teams and 1 matches"), "{notices:?}");
        assert!(
            notices[1].starts_with("Now running match m1.\nRovers 0 - 0 United"),
            "{notices:?}"
        );
    }

    #[test]
    fn failed_poll_keeps_the_picked_match() {
        let mut app = app(Role::Scorer);
        let matches = vec![fixture("m1", MatchStatus::Live), fixture("m2", MatchStatus::Live)];
        app.on_snapshot_loaded(snapshot(matches.clone()), at(15, 10));
        app.select_match("m2", at(15, 11));
        assert_eq!(app.state.session.current_id(), Some("m2"));

        app.on_error("API error for /tournament: 429 Too Many Requests".into());
        assert_eq!(app.state.session.current_id(), Some("m2"));
        assert!(!app.state.session.is_stale());
        assert_eq!(app.state.session.teams().len(), 2);

        app.on_snapshot_refreshed(snapshot(matches), at(15, 12));
        assert_eq!(app.state.tournament.selector.selected(), Some("m2"));
        assert_eq!(app.state.session.current_id(), Some("m2"));
    }

    #[test]
    fn idle_only_after_the_startup_load_answers() {
        let mut failed = app(Role::Scorer);
        assert!(!failed.is_idle());
        failed.on_load_failed("Network error".into());
        assert!(failed.is_idle());
        assert!(failed.state.last_error.as_deref().is_some_and(|e| e.contains("could not load")));

        let mut loaded = app(Role::Scorer);
        loaded.on_snapshot_loaded(snapshot(vec![fixture("m1", MatchStatus::Live)]), at(15, 10));
        assert!(loaded.is_idle());
        let Some(NetworkRequest::WriteMatch { token, .. }) =
            loaded.record_goal(Side::Home, "9", at(15, 12))
        else {
            panic!("expected a write");
        };
        assert!(!loaded.is_idle());
        loaded.on_write_settled(token, Err("HTTP 502".into()), at(15, 12));
        assert!(loaded.is_idle());
    }

    #[test]
    fn goal_command_produces_a_write_and_settles() {
        let mut app = app(Role::Scorer);
        app.on_snapshot_loaded(snapshot(vec![fixture("m1", MatchStatus::Live)]), at(15, 10));

        let Some(NetworkRequest::WriteMatch { token, match_id, write }) =
            app.record_goal(Side::Away, "7", at(15, 12))
        else {
            panic!("expected a write");
        };
        assert_eq!(match_id, "m1");
        assert!(matches!(write, MatchWrite::Update(_)));

        app.on_write_settled(token, Err("HTTP 502".into()), at(15, 12));
        assert_eq!(app.state.session.current().unwrap().away_score, 0);
        assert!(app.state.last_error.as_deref().is_some_and(|e| e.contains("reverted")));
    }

    #[test]
    fn viewer_commands_are_refused() {
        let mut app = app(Role::Viewer);
        app.on_snapshot_loaded(snapshot(vec![fixture("m1", MatchStatus::Live)]), at(15, 10));
        assert!(app.record_goal(Side::Home, "9", at(15, 12)).is_none());
        assert!(app.save_stats(MatchStats::default()).is_none());
        assert!(app.state.last_error.as_deref().is_some_and(|e| e.starts_with("Not allowed")));
    }

    #[test]
    fn losing_every_candidate_invalidates_the_session() {
        let mut app = app(Role::Management);
        app.on_snapshot_loaded(snapshot(vec![fixture("m1", MatchStatus::Live)]), at(15, 10));
        let completed = snapshot(vec![fixture("m1", MatchStatus::Completed)]);
        app.on_snapshot_refreshed(completed, at(15, 40));

        assert!(app.state.session.is_stale());
        assert_eq!(app.state.session.current().unwrap().status, MatchStatus::Completed);
        assert!(app.start_match(at(15, 41)).is_none());
    }

    #[test]
    fn next_cycles_between_live_matches() {
        let mut app = app(Role::Scorer);
        let matches = vec![fixture("m1", MatchStatus::Live), fixture("m2", MatchStatus::Live)];
        app.on_snapshot_loaded(snapshot(matches), at(15, 10));
        assert_eq!(app.state.session.current_id(), Some("m1"));

        app.next_match(at(15, 11));
        assert_eq!(app.state.session.current_id(), Some("m2"));

        app.select_match("m1", at(15, 12));
        assert_eq!(app.state.session.current_id(), Some("m1"));
    }

    #[test]
    fn clock_tick_announces_half_time_once() {
        let mut app = app(Role::Scorer);
        app.on_snapshot_loaded(snapshot(vec![fixture("m1", MatchStatus::Live)]), at(15, 40));
        app.take_notices();

        app.on_clock_tick(at(15, 46));
        app.on_clock_tick(at(15, 47));
        let notices = app.take_notices();
        assert_eq!(notices, vec!["Half-time at 45:00.".to_string()]);
    }
}
