use crate::wire::{
    RawEvent, RawMatch, RawPlayer, RawTeam, SnapshotResponse, UpdateMatchBody, UpdateStatusBody,
    WireEvent, pick_id,
};
use crate::{
    EventKind, Match, MatchEvent, MatchStats, MatchStatus, MatchUpdate, Player, Snapshot, Team,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub type ApiResult<T> = Result<T, ApiError>;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000/api";

/// Client for the tournament service's REST endpoints.
#[derive(Debug, Clone)]
pub struct TournamentApi {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl Default for TournamentApi {
    fn default() -> Self {
        Self {
            client: Client::builder()
                .user_agent("matchday/0.1 (live match client)")
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            token: None,
            timeout: Duration::from_secs(12),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Network(reqwest::Error, String),
    Api(reqwest::Error, String),
    Parsing(reqwest::Error, String),
    NotFound(String),
    Other(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(e, url) => write!(f, "Network error for {url}: {e}"),
            ApiError::Api(e, url) => write!(f, "API error for {url}: {e}"),
            ApiError::Parsing(e, url) => write!(f, "Parse error for {url}: {e}"),
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl TournamentApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Applies to every request. Writes that exceed it surface as `ApiError::Network`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch all teams and matches of the tournament.
    pub async fn fetch_snapshot(&self) -> ApiResult<Snapshot> {
        let url = format!("{}/tournament", self.base_url);
        let raw: SnapshotResponse = self.get(&url).await?;
        Ok(map_snapshot(raw))
    }

    /// Generic partial write, used for goals (score + events).
    pub async fn update_match(&self, match_id: &str, update: &MatchUpdate) -> ApiResult<Match> {
        let url = format!("{}/matches/{}", self.base_url, match_id);
        let raw = self.put(&url, &update_to_wire(update)).await?;
        Ok(map_match(raw))
    }

    /// Status write with an optional embedded event (cards, substitutions,
    /// start, half-time, completion).
    pub async fn update_match_status(
        &self,
        match_id: &str,
        status: MatchStatus,
        minute: u16,
        event: Option<&MatchEvent>,
    ) -> ApiResult<Match> {
        let url = format!("{}/matches/{}/status", self.base_url, match_id);
        let body = UpdateStatusBody {
            status: status.wire_name().to_owned(),
            minute,
            event: event.map(event_to_wire),
        };
        let raw = self.put(&url, &body).await?;
        Ok(map_match(raw))
    }

    pub async fn update_match_stats(&self, match_id: &str, stats: &MatchStats) -> ApiResult<Match> {
        stats
            .validate()
            .map_err(|e| ApiError::Other(format!("invalid stats for match {match_id}: {e}")))?;
        let url = format!("{}/matches/{}/stats", self.base_url, match_id);
        let raw = self.put(&url, stats).await?;
        Ok(map_match(raw))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Any 4xx/5xx is an error; a read never falls back to an empty value.
    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let response = self
            .authorize(self.client.get(url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ApiError::Network(e, url.to_owned()))?;

        match response.error_for_status() {
            Ok(res) => res
                .json::<T>()
                .await
                .map_err(|e| ApiError::Parsing(e, url.to_owned())),
            Err(e) => {
                if e.status().map(|s| s.as_u16()) == Some(404) {
                    Err(ApiError::NotFound(url.to_owned()))
                } else {
                    Err(ApiError::Api(e, url.to_owned()))
                }
            }
        }
    }

    async fn put<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> ApiResult<RawMatch> {
        let response = self
            .authorize(self.client.put(url))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e, url.to_owned()))?;

        match response.error_for_status() {
            Ok(res) => res
                .json::<RawMatch>()
                .await
                .map_err(|e| ApiError::Parsing(e, url.to_owned())),
            Err(e) => {
                if e.status().map(|s| s.as_u16()) == Some(404) {
                    Err(ApiError::NotFound(url.to_owned()))
                } else {
                    Err(ApiError::Api(e, url.to_owned()))
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mapping: wire types → clean domain types
// ---------------------------------------------------------------------------

fn map_snapshot(raw: SnapshotResponse) -> Snapshot {
    Snapshot {
        teams: raw.teams.unwrap_or_default().into_iter().map(map_team).collect(),
        matches: raw
            .matches
            .unwrap_or_default()
            .into_iter()
            .map(map_match)
            .filter(|m| !m.id.is_empty())
            .collect(),
    }
}

fn map_team(raw: RawTeam) -> Team {
    Team {
        id: pick_id(&raw.id, &raw.object_id),
        name: raw.name.unwrap_or_default(),
        players: raw.players.unwrap_or_default().into_iter().map(map_player).collect(),
    }
}

fn map_player(raw: RawPlayer) -> Player {
    Player {
        id: pick_id(&raw.id, &raw.object_id),
        name: raw.name.unwrap_or_default(),
        number: raw.number,
    }
}

fn map_match(raw: RawMatch) -> Match {
    Match {
        id: pick_id(&raw.id, &raw.object_id),
        home_team_id: raw.home_team_id.and_then(|r| r.canonical()).unwrap_or_default(),
        away_team_id: raw.away_team_id.and_then(|r| r.canonical()).unwrap_or_default(),
        scheduled_start: parse_schedule(raw.date.as_deref(), raw.time.as_deref()),
        status: raw.status.as_deref().map(parse_status).unwrap_or_default(),
        home_score: raw.home_score.unwrap_or_default(),
        away_score: raw.away_score.unwrap_or_default(),
        events: raw.events.unwrap_or_default().into_iter().map(map_event).collect(),
        current_minute: raw.current_minute.unwrap_or_default(),
    }
}

fn map_event(raw: RawEvent) -> MatchEvent {
    let kind = raw.kind.as_deref().and_then(parse_event_kind);
    let player_name = raw.player_name.unwrap_or_default();
    let description = match (raw.description, kind) {
        (Some(d), _) if !d.trim().is_empty() => d,
        (_, Some(kind)) => MatchEvent::default_description(kind, &player_name, None),
        _ => String::new(),
    };
    MatchEvent {
        id: pick_id(&raw.id, &raw.object_id),
        kind,
        player_id: raw.player_id.and_then(|r| r.canonical()).unwrap_or_default(),
        player_name,
        team: raw.team.and_then(|r| r.canonical()),
        minute: raw.minute.unwrap_or_default(),
        description,
        out_player_id: raw.out_player_id.and_then(|r| r.canonical()),
    }
}

fn parse_status(s: &str) -> MatchStatus {
    match s.trim().to_ascii_lowercase().as_str() {
        "live" | "in_progress" | "half_time" | "halftime" => MatchStatus::Live,
        "completed" | "finished" | "final" => MatchStatus::Completed,
        _ => MatchStatus::Upcoming,
    }
}

fn parse_event_kind(s: &str) -> Option<EventKind> {
    match s.trim().to_ascii_lowercase().as_str() {
        "goal" => Some(EventKind::Goal),
        "yellow_card" | "yellowcard" | "yellow" => Some(EventKind::YellowCard),
        "red_card" | "redcard" | "red" => Some(EventKind::RedCard),
        "substitution" | "sub" => Some(EventKind::Substitution),
        _ => None,
    }
}

/// `date` may be a bare `YYYY-MM-DD` or a full timestamp whose date part is
/// used; `time` is the local kickoff time. A missing time means midnight.
fn parse_schedule(date: Option<&str>, time: Option<&str>) -> Option<NaiveDateTime> {
    let date = date?.trim();
    let day = NaiveDate::parse_from_str(date.get(..10)?, "%Y-%m-%d").ok()?;
    let clock = time
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .and_then(|t| {
            NaiveTime::parse_from_str(t, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
                .ok()
        })
        .unwrap_or(NaiveTime::MIN);
    Some(day.and_time(clock))
}

fn event_to_wire(event: &MatchEvent) -> WireEvent {
    WireEvent {
        id: event.id.clone(),
        kind: event.kind.map(|k| k.wire_name()).unwrap_or("unknown").to_owned(),
        player_id: event.player_id.clone(),
        player_name: event.player_name.clone(),
        team: event.team.clone(),
        minute: event.minute,
        description: event.description.clone(),
        out_player_id: event.out_player_id.clone(),
    }
}

fn update_to_wire(update: &MatchUpdate) -> UpdateMatchBody {
    UpdateMatchBody {
        home_score: update.home_score,
        away_score: update.away_score,
        events: update
            .events
            .as_ref()
            .map(|events| events.iter().map(event_to_wire).collect()),
        status: update.status.map(|s| s.wire_name().to_owned()),
        current_minute: update.minute,
    }
}
