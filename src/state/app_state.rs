use crate::clock::{ClockConfig, Period};
use crate::selector::MatchSelector;
use crate::session::{MatchSession, SessionContext};
use chrono::{DateTime, TimeDelta, Utc};
use matchday_api::{Match, Snapshot};

// ---------------------------------------------------------------------------
// Tournament state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct TournamentState {
    pub snapshot: Option<Snapshot>,
    pub selector: MatchSelector,
}

impl TournamentState {
    /// Store a fetched snapshot and re-run the selection against it.
    pub fn store(&mut self, snapshot: Snapshot, now: DateTime<Utc>) -> Option<String> {
        let selected = self.selector.recompute(&snapshot.matches, now).map(str::to_owned);
        self.snapshot = Some(snapshot);
        selected
    }

    pub fn matches(&self) -> &[Match] {
        self.snapshot
            .as_ref()
            .map(|s| s.matches.as_slice())
            .unwrap_or_default()
    }

    pub fn candidates(&self, now: DateTime<Utc>) -> Vec<&Match> {
        self.selector.candidates(self.matches(), now)
    }

    pub fn team_name<'a>(&'a self, team_id: &'a str) -> &'a str {
        self.snapshot
            .as_ref()
            .and_then(|s| s.team(team_id))
            .map_or(team_id, |t| t.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppState {
    pub tournament: TournamentState,
    pub session: MatchSession,
    /// Last clock period reported, so each transition is announced once.
    pub last_period: Period,
    pub last_error: Option<String>,
    /// Set until the startup load has answered, either way.
    pub loading: bool,
    /// Lines waiting to be printed by the runner.
    pub notices: Vec<String>,
}

impl AppState {
    pub fn new(context: SessionContext, write_timeout: TimeDelta) -> Self {
        Self {
            tournament: TournamentState::default(),
            session: MatchSession::new(context, ClockConfig::default(), write_timeout),
            last_period: Period::NotStarted,
            last_error: None,
            loading: true,
            notices: Vec::new(),
        }
    }

    pub fn notify(&mut self, line: impl Into<String>) {
        self.notices.push(line.into());
    }
}
