use crate::clock::{ClockConfig, ClockReading, HalfTimeToggle, MatchClock, Period};
use crate::events::{self, ScoreCheck};
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use matchday_api::{
    EventKind, Match, MatchEvent, MatchStatus, MatchUpdate, Player, Side, Snapshot, Team, same_id,
};
use std::fmt;

// ---------------------------------------------------------------------------
// Actor context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    #[default]
    Viewer,
    /// May start matches, toggle half-time and record events.
    Scorer,
    /// Everything a scorer may do, plus completing matches and clock corrections.
    Management,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viewer" => Some(Role::Viewer),
            "scorer" => Some(Role::Scorer),
            "management" | "manager" | "admin" => Some(Role::Management),
            _ => None,
        }
    }

    pub fn can_record(&self) -> bool {
        matches!(self, Role::Scorer | Role::Management)
    }

    pub fn can_manage(&self) -> bool {
        *self == Role::Management
    }
}

/// Who is operating the session. Passed in explicitly; there is no global user.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub actor: String,
    pub role: Role,
}

// ---------------------------------------------------------------------------
// Errors and writes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Rejected before anything was touched.
    Validation(String),
    /// The service refused or never answered; local changes were reverted.
    Conflict(String),
    StaleSelection(String),
    Permission(String),
    /// Another write for this match is still in flight.
    Busy,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Validation(msg) => write!(f, "{msg}"),
            SessionError::Conflict(msg) => write!(f, "{msg} (changes reverted)"),
            SessionError::StaleSelection(msg) => write!(f, "{msg}; please reselect a match"),
            SessionError::Permission(msg) => write!(f, "Not allowed: {msg}"),
            SessionError::Busy => write!(f, "Still saving the previous change, try again"),
        }
    }
}

impl std::error::Error for SessionError {}

pub type SessionResult<T> = Result<T, SessionError>;

/// The call the runner must make to persist an optimistic change.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchWrite {
    Update(MatchUpdate),
    Status {
        status: MatchStatus,
        minute: u16,
        event: Option<MatchEvent>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub token: u64,
    pub match_id: String,
    pub write: MatchWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Start,
    Goal,
    Card,
    Substitution,
    HalfTime,
    Complete,
}

impl MutationKind {
    fn label(&self) -> &'static str {
        match self {
            MutationKind::Start => "Starting the match",
            MutationKind::Goal => "Saving the goal",
            MutationKind::Card => "Saving the card",
            MutationKind::Substitution => "Saving the substitution",
            MutationKind::HalfTime => "Saving half-time",
            MutationKind::Complete => "Completing the match",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    /// A write is in flight; the snapshot waits for its outcome.
    Deferred,
    /// The selected match is gone from the snapshot.
    Stale,
    NoSelection,
}

/// Everything an optimistic mutation may touch, kept for rollback.
#[derive(Debug, Clone)]
struct Checkpoint {
    current: Match,
    clock: MatchClock,
}

#[derive(Debug)]
struct InFlight {
    token: u64,
    kind: MutationKind,
    started_at: DateTime<Utc>,
    checkpoint: Checkpoint,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Controller for the one match being run on this client.
///
/// Every mutation is applied locally first and handed back as a
/// [`PendingWrite`]; the runner performs the call and reports the outcome
/// through [`MatchSession::resolve`]. Only one write may be in flight.
#[derive(Debug)]
pub struct MatchSession {
    context: SessionContext,
    write_timeout: TimeDelta,
    current: Option<Match>,
    teams: Vec<Team>,
    clock: MatchClock,
    stale: bool,
    in_flight: Option<InFlight>,
    deferred: Option<Snapshot>,
    next_token: u64,
}

impl MatchSession {
    pub fn new(
        context: SessionContext,
        clock_config: ClockConfig,
        write_timeout: TimeDelta,
    ) -> Self {
        Self {
            context,
            write_timeout,
            current: None,
            teams: Vec::new(),
            clock: MatchClock::new(clock_config),
            stale: false,
            in_flight: None,
            deferred: None,
            next_token: 1,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn current(&self) -> Option<&Match> {
        self.current.as_ref()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_ref().map(|m| m.id.as_str())
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn team(&self, team_id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| same_id(&t.id, team_id))
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn clock(&self) -> &MatchClock {
        &self.clock
    }

    pub fn reading(&self, now: DateTime<Utc>) -> ClockReading {
        self.clock.reading(now)
    }

    pub fn score_check(&self) -> Option<ScoreCheck> {
        self.current.as_ref().map(|m| events::check_score(m, &self.teams))
    }

    /// Load `match_id` from an already fetched snapshot. Selecting the match
    /// that is already loaded does nothing and returns `Ok(false)`.
    pub fn select_match(
        &mut self,
        snapshot: &Snapshot,
        match_id: &str,
        now: DateTime<Utc>,
    ) -> SessionResult<bool> {
        if self.current_id().is_some_and(|id| same_id(id, match_id)) && !self.stale {
            return Ok(false);
        }
        if self.in_flight.is_some() {
            return Err(SessionError::Busy);
        }
        let Some(m) = snapshot.find_match(match_id) else {
            return Err(SessionError::StaleSelection(format!("match {match_id} not found")));
        };

        info!("selected match {} ({:?})", m.id, m.status);
        self.current = Some(m.clone());
        self.teams = snapshot.teams.clone();
        self.clock.reset();
        self.stale = false;
        self.deferred = None;
        self.derive_clock(now);
        Ok(true)
    }

    /// Keep showing the match but refuse further actions on it.
    pub fn invalidate(&mut self) {
        if self.current.is_some() {
            self.stale = true;
        }
    }

    /// Advance the clock. The half-time overlay on `live` follows the clock.
    pub fn tick(&mut self, now: DateTime<Utc>) -> ClockReading {
        let reading = self.clock.tick(now);
        if let Some(m) = self.current.as_mut()
            && m.status.is_live()
        {
            m.status = if reading.period == Period::HalfTime {
                MatchStatus::HalfTime
            } else {
                MatchStatus::Live
            };
        }
        reading
    }

    pub fn start_match(&mut self, now: DateTime<Utc>) -> SessionResult<PendingWrite> {
        self.require(Role::can_record, "starting a match")?;
        let m = self.editable()?;
        if m.status.is_live() || self.clock.is_started() {
            return Err(SessionError::Validation(format!("match {} has already started", m.id)));
        }

        let checkpoint = self.checkpoint();
        self.clock.start(now);
        let m = self.loaded_mut()?;
        m.status = MatchStatus::Live;
        m.current_minute = 0;
        let write = MatchWrite::Status { status: MatchStatus::Live, minute: 0, event: None };
        self.begin(MutationKind::Start, checkpoint, now, write)
    }

    pub fn record_goal(
        &mut self,
        team_id: &str,
        player: &str,
        now: DateTime<Utc>,
    ) -> SessionResult<PendingWrite> {
        let (side, scorer) = self.prepare_event(team_id, player)?;
        let event = self.build_event(EventKind::Goal, side, &scorer, None, now);

        let checkpoint = self.checkpoint();
        let m = self.loaded_mut()?;
        m.current_minute = event.minute;
        m.events.push(event);
        match side {
            Side::Home => m.home_score += 1,
            Side::Away => m.away_score += 1,
        }
        let write = MatchWrite::Update(MatchUpdate {
            home_score: Some(m.home_score),
            away_score: Some(m.away_score),
            events: Some(m.events.clone()),
            status: None,
            minute: Some(m.current_minute),
        });
        self.begin(MutationKind::Goal, checkpoint, now, write)
    }

    pub fn record_card(
        &mut self,
        kind: EventKind,
        team_id: &str,
        player: &str,
        now: DateTime<Utc>,
    ) -> SessionResult<PendingWrite> {
        if !kind.is_card() {
            return Err(SessionError::Validation(format!("{} is not a card", kind.wire_name())));
        }
        let (side, booked) = self.prepare_event(team_id, player)?;
        let event = self.build_event(kind, side, &booked, None, now);
        self.push_status_event(MutationKind::Card, event, now)
    }

    pub fn record_substitution(
        &mut self,
        team_id: &str,
        out_player: &str,
        in_player: &str,
        now: DateTime<Utc>,
    ) -> SessionResult<PendingWrite> {
        let (side, coming_on) = self.prepare_event(team_id, in_player)?;
        let going_off = self.roster_player(team_id, out_player)?;
        if same_id(&going_off.id, &coming_on.id) {
            return Err(SessionError::Validation(
                "a player cannot replace themselves".into(),
            ));
        }
        let event =
            self.build_event(EventKind::Substitution, side, &coming_on, Some(&going_off), now);
        self.push_status_event(MutationKind::Substitution, event, now)
    }

    pub fn toggle_half_time(&mut self, now: DateTime<Utc>) -> SessionResult<PendingWrite> {
        self.require(Role::can_record, "toggling half-time")?;
        let m = self.editable()?;
        if !m.status.is_live() {
            return Err(SessionError::Validation(format!("match {} is not running", m.id)));
        }

        let checkpoint = self.checkpoint();
        let Some(toggle) = self.clock.toggle_half_time(now) else {
            self.clock = checkpoint.clock;
            return Err(SessionError::Validation("the match clock is not running".into()));
        };
        let minute = self.clock.reading(now).event_minute();
        let m = self.loaded_mut()?;
        m.status = match toggle {
            HalfTimeToggle::Paused => MatchStatus::HalfTime,
            HalfTimeToggle::Resumed => MatchStatus::Live,
        };
        m.current_minute = minute;
        let write = MatchWrite::Status { status: MatchStatus::Live, minute, event: None };
        self.begin(MutationKind::HalfTime, checkpoint, now, write)
    }

    /// Irreversible from this client. Management only.
    pub fn complete_match(&mut self, now: DateTime<Utc>) -> SessionResult<PendingWrite> {
        self.require(Role::can_manage, "completing a match")?;
        self.editable()?;

        let checkpoint = self.checkpoint();
        self.clock.complete(now);
        let minute = self.clock.reading(now).event_minute();
        let m = self.loaded_mut()?;
        m.status = MatchStatus::Completed;
        m.current_minute = minute;
        let write = MatchWrite::Status { status: MatchStatus::Completed, minute, event: None };
        self.begin(MutationKind::Complete, checkpoint, now, write)
    }

    /// Manual clock correction. Local only; never persisted.
    pub fn adjust_clock(
        &mut self,
        minutes: i32,
        seconds: i32,
        now: DateTime<Utc>,
    ) -> SessionResult<ClockReading> {
        self.require(Role::can_manage, "adjusting the clock")?;
        self.editable()?;
        let adjusted =
            self.clock.adjust_minutes(now, minutes) & self.clock.adjust_seconds(now, seconds);
        if !adjusted {
            return Err(SessionError::Validation("the match clock is not running".into()));
        }
        Ok(self.tick(now))
    }

    /// Settle the in-flight write. Answers for anything but the current
    /// write (e.g. after a timeout rollback) are ignored.
    pub fn resolve(
        &mut self,
        token: u64,
        result: Result<Match, String>,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        if self.in_flight.as_ref().map(|f| f.token) != Some(token) {
            debug!("ignoring outcome of superseded write {token}");
            return Ok(());
        }
        let Some(flight) = self.in_flight.take() else {
            return Ok(());
        };

        match result {
            Ok(_) => {
                debug!("write {token} confirmed");
                // May predate the write; the next poll reconciles instead.
                self.deferred = None;
                self.score_check();
                Ok(())
            }
            Err(message) => Err(self.roll_back(flight, &message, now)),
        }
    }

    /// Roll back a write that has been in flight longer than the timeout.
    pub fn expire_in_flight(&mut self, now: DateTime<Utc>) -> Option<SessionError> {
        let expired = self
            .in_flight
            .as_ref()
            .is_some_and(|f| now - f.started_at >= self.write_timeout);
        if !expired {
            return None;
        }
        let flight = self.in_flight.take()?;
        Some(self.roll_back(flight, "no answer from the tournament service", now))
    }

    /// Merge a polled snapshot. Never overwrites state while a write is in flight.
    pub fn apply_refresh(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> RefreshOutcome {
        if self.current.is_none() {
            return RefreshOutcome::NoSelection;
        }
        if self.in_flight.is_some() {
            debug!("deferring refresh while a write is in flight");
            self.deferred = Some(snapshot.clone());
            return RefreshOutcome::Deferred;
        }
        self.merge_snapshot(snapshot, now)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require(&self, allowed: fn(&Role) -> bool, action: &str) -> SessionResult<()> {
        if allowed(&self.context.role) {
            Ok(())
        } else {
            Err(SessionError::Permission(format!(
                "{} ({:?}) may not do {action}",
                self.context.actor, self.context.role
            )))
        }
    }

    /// The loaded match, provided it may still be changed from here.
    fn editable(&self) -> SessionResult<&Match> {
        let Some(m) = self.current.as_ref() else {
            return Err(SessionError::StaleSelection("no match selected".into()));
        };
        if self.stale {
            return Err(SessionError::StaleSelection(format!(
                "match {} is no longer available",
                m.id
            )));
        }
        if self.in_flight.is_some() {
            return Err(SessionError::Busy);
        }
        if m.status == MatchStatus::Completed {
            return Err(SessionError::Validation(format!("match {} is already completed", m.id)));
        }
        Ok(m)
    }

    fn loaded_mut(&mut self) -> SessionResult<&mut Match> {
        self.current
            .as_mut()
            .ok_or_else(|| SessionError::StaleSelection("no match selected".into()))
    }

    fn prepare_event(&self, team_id: &str, player: &str) -> SessionResult<(Side, Player)> {
        self.require(Role::can_record, "recording events")?;
        let m = self.editable()?;
        if !m.status.is_live() {
            return Err(SessionError::Validation(format!("match {} has not kicked off", m.id)));
        }
        let side = m.side_of(team_id).ok_or_else(|| {
            SessionError::Validation(format!(
                "team {} is not playing in match {}",
                team_id.trim(),
                m.id
            ))
        })?;
        let player = self.roster_player(team_id, player)?;
        Ok((side, player))
    }

    fn roster_player(&self, team_id: &str, key: &str) -> SessionResult<Player> {
        let team = self
            .team(team_id)
            .ok_or_else(|| SessionError::Validation(format!("unknown team {}", team_id.trim())))?;
        team.player(key).cloned().ok_or_else(|| {
            SessionError::Validation(format!("{} is not on the {} roster", key.trim(), team.name))
        })
    }

    fn build_event(
        &mut self,
        kind: EventKind,
        side: Side,
        player: &Player,
        out: Option<&Player>,
        now: DateTime<Utc>,
    ) -> MatchEvent {
        let minute = self.tick(now).event_minute();
        let (id, team) = match self.current.as_ref() {
            Some(m) => (unique_event_id(&m.events, now), Some(m.team_id(side).to_owned())),
            None => (events::local_event_id(now), None),
        };
        MatchEvent {
            id,
            kind: Some(kind),
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            team,
            minute,
            description: MatchEvent::default_description(
                kind,
                &player.name,
                out.map(|p| p.name.as_str()),
            ),
            out_player_id: out.map(|p| p.id.clone()),
        }
    }

    fn push_status_event(
        &mut self,
        kind: MutationKind,
        event: MatchEvent,
        now: DateTime<Utc>,
    ) -> SessionResult<PendingWrite> {
        let checkpoint = self.checkpoint();
        let m = self.loaded_mut()?;
        let minute = event.minute;
        m.current_minute = minute;
        m.events.push(event.clone());
        let write = MatchWrite::Status { status: MatchStatus::Live, minute, event: Some(event) };
        self.begin(kind, checkpoint, now, write)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            current: self.current.clone().unwrap_or_default(),
            clock: self.clock,
        }
    }

    fn begin(
        &mut self,
        kind: MutationKind,
        checkpoint: Checkpoint,
        now: DateTime<Utc>,
        write: MatchWrite,
    ) -> SessionResult<PendingWrite> {
        let token = self.next_token;
        self.next_token += 1;
        let match_id = checkpoint.current.id.clone();
        debug!("write {token} ({kind:?}) for match {match_id}");
        self.in_flight = Some(InFlight { token, kind, started_at: now, checkpoint });
        self.score_check();
        Ok(PendingWrite { token, match_id, write })
    }

    fn roll_back(&mut self, flight: InFlight, reason: &str, now: DateTime<Utc>) -> SessionError {
        warn!("write {} ({:?}) failed, reverting: {reason}", flight.token, flight.kind);
        self.current = Some(flight.checkpoint.current);
        self.clock = flight.checkpoint.clock;
        if let Some(snapshot) = self.deferred.take() {
            self.merge_snapshot(&snapshot, now);
        }
        SessionError::Conflict(format!("{} failed: {reason}", flight.kind.label()))
    }

    fn merge_snapshot(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> RefreshOutcome {
        self.teams = snapshot.teams.clone();
        let Some(local) = self.current.as_mut() else {
            return RefreshOutcome::NoSelection;
        };
        let Some(server) = snapshot.find_match(&local.id) else {
            warn!("match {} disappeared from the tournament snapshot", local.id);
            self.stale = true;
            return RefreshOutcome::Stale;
        };

        local.events = events::merge_events(&local.events, &server.events);
        local.home_score = server.home_score;
        local.away_score = server.away_score;
        local.scheduled_start = server.scheduled_start;
        self.stale = false;

        match (server.status, local.status) {
            (MatchStatus::Completed, status) if status != MatchStatus::Completed => {
                info!("match {} was completed elsewhere", local.id);
                local.status = MatchStatus::Completed;
                local.current_minute = local.current_minute.max(server.current_minute);
                if self.clock.is_started() {
                    self.clock.complete(now);
                } else {
                    self.clock.complete_at_minute(local.current_minute);
                }
            }
            (MatchStatus::Live, MatchStatus::Upcoming) => {
                info!("match {} was started elsewhere", local.id);
                local.status = MatchStatus::Live;
                self.derive_clock(now);
            }
            _ => {}
        }
        self.score_check();
        RefreshOutcome::Applied
    }

    /// Initial clock phase from the match status and its scheduled start.
    fn derive_clock(&mut self, now: DateTime<Utc>) {
        let Some(m) = self.current.as_ref() else {
            return;
        };
        match m.status {
            MatchStatus::Completed => self.clock.complete_at_minute(m.current_minute),
            MatchStatus::Live | MatchStatus::HalfTime => {
                let fallback = now - TimeDelta::minutes(i64::from(m.current_minute));
                let kickoff = m.kickoff().unwrap_or(fallback).min(now);
                self.clock.start(kickoff);
                self.tick(now);
            }
            MatchStatus::Upcoming => {}
        }
    }
}

/// A local event id, bumped a millisecond at a time until it is unique.
fn unique_event_id(existing: &[MatchEvent], now: DateTime<Utc>) -> String {
    let mut at = now;
    loop {
        let id = events::local_event_id(at);
        if !existing.iter().any(|e| e.id == id) {
            return id;
        }
        at += TimeDelta::milliseconds(1);
    }
}
