/// Tournament service raw wire types: serde shapes for the JSON it sends and
/// accepts. These map to the clean domain types in client.rs.
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// The service emits ids as strings or numbers depending on the collection.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    pub fn as_string(&self) -> String {
        match self {
            RawId::Text(s) => s.trim().to_owned(),
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// A foreign key: either a bare id or the populated document.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawRef {
    Id(RawId),
    Object(RawRefObject),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RawRefObject {
    pub id: Option<RawId>,
    #[serde(rename = "_id")]
    pub object_id: Option<RawId>,
    pub name: Option<String>,
}

impl RawRef {
    pub fn canonical(&self) -> Option<String> {
        let id = match self {
            RawRef::Id(id) => id.as_string(),
            RawRef::Object(obj) => pick_id(&obj.id, &obj.object_id),
        };
        if id.is_empty() { None } else { Some(id) }
    }
}

/// `id` wins over `_id` when both are present.
pub fn pick_id(id: &Option<RawId>, object_id: &Option<RawId>) -> String {
    id.as_ref()
        .or(object_id.as_ref())
        .map(RawId::as_string)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Snapshot  (GET /tournament)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default, Clone)]
pub struct SnapshotResponse {
    pub teams: Option<Vec<RawTeam>>,
    pub matches: Option<Vec<RawMatch>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawTeam {
    pub id: Option<RawId>,
    #[serde(rename = "_id")]
    pub object_id: Option<RawId>,
    pub name: Option<String>,
    pub players: Option<Vec<RawPlayer>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawPlayer {
    pub id: Option<RawId>,
    #[serde(rename = "_id")]
    pub object_id: Option<RawId>,
    pub name: Option<String>,
    #[serde(alias = "jerseyNumber")]
    pub number: Option<u8>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RawMatch {
    pub id: Option<RawId>,
    #[serde(rename = "_id")]
    pub object_id: Option<RawId>,
    #[serde(rename = "homeTeamId")]
    pub home_team_id: Option<RawRef>,
    #[serde(rename = "awayTeamId")]
    pub away_team_id: Option<RawRef>,
    pub date: Option<String>, // "2025-05-01" or a full ISO 8601 timestamp
    pub time: Option<String>, // "15:00" or "15:00:00", local wall clock
    pub status: Option<String>,
    #[serde(rename = "homeScore")]
    pub home_score: Option<u16>,
    #[serde(rename = "awayScore")]
    pub away_score: Option<u16>,
    pub events: Option<Vec<RawEvent>>,
    #[serde(rename = "currentMinute")]
    pub current_minute: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawEvent {
    pub id: Option<RawId>,
    #[serde(rename = "_id")]
    pub object_id: Option<RawId>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "playerId")]
    pub player_id: Option<RawRef>,
    #[serde(rename = "playerName")]
    pub player_name: Option<String>,
    pub team: Option<RawRef>,
    pub minute: Option<u16>,
    pub description: Option<String>,
    #[serde(rename = "outPlayerId")]
    pub out_player_id: Option<RawRef>,
}

// ---------------------------------------------------------------------------
// Write bodies  (PUT /matches/{id}, PUT /matches/{id}/status)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub player_id: String,
    pub player_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub minute: u16,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_player_id: Option<String>,
}

#[derive(Debug, Serialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMatchBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_score: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_score: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<WireEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_minute: Option<u16>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UpdateStatusBody {
    pub status: String,
    pub minute: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<WireEvent>,
}
