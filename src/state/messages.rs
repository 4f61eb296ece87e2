use crate::commands::Command;
use crate::session::MatchWrite;
use matchday_api::{Match, MatchStats, Snapshot};

#[derive(Debug, Clone)]
pub enum NetworkRequest {
    LoadSnapshot,
    RefreshSnapshot,
    WriteMatch { token: u64, match_id: String, write: MatchWrite },
    UpdateStats { match_id: String, stats: MatchStats },
}

#[derive(Debug)]
pub enum NetworkResponse {
    SnapshotLoaded { snapshot: Snapshot },
    /// The startup load failed; commands held back for it can run now.
    LoadFailed { message: String },
    /// Background poll result; merged, never replacing in-flight local state.
    SnapshotRefreshed { snapshot: Snapshot },
    WriteSettled { token: u64, result: Result<Match, String> },
    StatsSaved { match_id: String },
    Error { message: String },
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    AppStarted,
    Command(Command),
    InputClosed,
    ClockTick,
}
