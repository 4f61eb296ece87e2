use crate::events::{self, EventGroups};
use crate::session::MatchSession;
use crate::state::app_state::AppState;
use chrono::{DateTime, Local, Utc};
use matchday_api::{Match, MatchEvent, Side};

pub fn help_text() -> &'static str {
    "Commands:
  start                         kick off the selected match
  goal <home|away> <player>     player by id or shirt number
  yellow|red <home|away> <player>
  sub <home|away> <out> <in>
  ht                            enter or leave half-time
  complete                      full time (management)
  adjust <+N|-N><m|s>           correct the clock (management)
  stats <poss_home> <shots_home> <shots_away> <on_target_home> <on_target_away>
        [corners_home corners_away fouls_home fouls_away]
  matches                       list selectable matches
  select <match-id> | next      change the selected match
  refresh                       poll the tournament service now
  show                          print the scoreboard
  quit"
}

/// One line per selectable match, `*` marking the selection.
pub fn match_list(state: &AppState, now: DateTime<Utc>) -> String {
    let candidates = state.tournament.candidates(now);
    if candidates.is_empty() {
        return "No live or recently started matches.".into();
    }
    let selected = state.tournament.selector.selected();
    candidates
        .iter()
        .map(|m| {
            let marker = if selected == Some(m.id.as_str()) { '*' } else { ' ' };
            let kickoff = m
                .kickoff()
                .map(|k| k.with_timezone(&Local).format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".into());
            format!(
                "{marker} {:<12} {kickoff}  {} {} - {} {}  [{}]",
                m.id,
                state.tournament.team_name(&m.home_team_id),
                m.home_score,
                m.away_score,
                state.tournament.team_name(&m.away_team_id),
                m.status.label(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Score line, clock, event log by period and per-team tallies.
pub fn scoreboard(state: &AppState, now: DateTime<Utc>) -> String {
    let session = &state.session;
    let Some(m) = session.current() else {
        return "No match selected. `matches` lists the candidates.".into();
    };

    let mut lines = vec![headline(session, m, now)];
    if let Some(kickoff) = session.clock().kickoff() {
        let paused = session.clock().paused_total().num_minutes();
        lines.push(format!(
            "  kick-off {}, {paused} min paused",
            kickoff.with_timezone(&Local).format("%H:%M")
        ));
    }
    if let Some(error) = &state.last_error {
        lines.push(format!("  last error: {error}"));
    }
    if let Some(check) = session.score_check()
        && !check.is_consistent()
    {
        lines.push(format!(
            "  (goal events add up to {}-{})",
            check.derived_home, check.derived_away
        ));
    }

    for (label, period_events) in EventGroups::new(&m.events).labeled() {
        lines.push(label.to_string());
        lines.extend(period_events.iter().map(|e| event_line(session, e)));
    }

    for side in [Side::Home, Side::Away] {
        let team_id = m.team_id(side);
        let tally = events::team_stats(&m.events, team_id, session.teams());
        lines.push(format!(
            "{}: {} goals, {} yellow, {} red, {} subs",
            team_name(session, team_id),
            tally.goals,
            tally.yellow_cards,
            tally.red_cards,
            tally.substitutions,
        ));
    }
    lines.join("\n")
}

pub fn headline(session: &MatchSession, m: &Match, now: DateTime<Utc>) -> String {
    let clock = session.clock();
    let reading = clock.reading(now);
    let mut line = format!(
        "{} {} - {} {}   {}  {}  [{}]",
        team_name(session, &m.home_team_id),
        m.score(Side::Home),
        m.score(Side::Away),
        team_name(session, &m.away_team_id),
        reading.display(),
        reading.period.label(),
        m.status.label(),
    );
    if reading.is_extra_time(clock.config()) && !clock.is_completed() {
        line.push_str("  extra time");
    }
    if session.is_busy() {
        line.push_str("  saving");
    }
    if session.is_stale() {
        line.push_str("  (no longer live)");
    }
    line
}

fn event_line(session: &MatchSession, event: &MatchEvent) -> String {
    let team = events::attribute(event, session.teams())
        .map(|id| team_name(session, id))
        .unwrap_or("?");
    format!("  {:>3}' {} ({team})", event.minute, event.description)
}

fn team_name<'a>(session: &'a MatchSession, team_id: &'a str) -> &'a str {
    session.team(team_id).map_or(team_id, |t| t.name.as_str())
}
