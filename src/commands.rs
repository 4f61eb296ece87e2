use crate::app::App;
use crate::report;
use crate::state::messages::NetworkRequest;
use chrono::Utc;
use matchday_api::{EventKind, MatchStats, Side};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Goal { side: Side, player: String },
    Card { kind: EventKind, side: Side, player: String },
    Substitution { side: Side, out_player: String, in_player: String },
    HalfTime,
    Complete,
    Adjust { minutes: i32, seconds: i32 },
    Select { match_id: String },
    Next,
    Matches,
    Refresh,
    Stats(MatchStats),
    Show,
    Help,
    Quit,
}

/// Parse one input line. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("start" | "kickoff", []) => Command::Start,
        ("goal", [side, player]) => Command::Goal {
            side: side_arg(side)?,
            player: player.to_string(),
        },
        ("yellow" | "red", [side, player]) => Command::Card {
            kind: if verb.eq_ignore_ascii_case("red") {
                EventKind::RedCard
            } else {
                EventKind::YellowCard
            },
            side: side_arg(side)?,
            player: player.to_string(),
        },
        ("sub", [side, out_player, in_player]) => Command::Substitution {
            side: side_arg(side)?,
            out_player: out_player.to_string(),
            in_player: in_player.to_string(),
        },
        ("ht" | "halftime", []) => Command::HalfTime,
        ("complete" | "ft", []) => Command::Complete,
        ("adjust", [amount]) => adjust_arg(amount)?,
        ("select", [match_id]) => Command::Select { match_id: match_id.to_string() },
        ("next", []) => Command::Next,
        ("matches" | "ls", []) => Command::Matches,
        ("refresh", []) => Command::Refresh,
        ("stats", rest) => Command::Stats(stats_args(rest)?),
        ("show", []) => Command::Show,
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit" | "q", []) => Command::Quit,
        (verb, _) => {
            return Err(format!(
                "can't parse `{line}` (unknown command or wrong arguments to {verb}); try `help`"
            ));
        }
    };
    Ok(Some(command))
}

fn side_arg(word: &str) -> Result<Side, String> {
    match word.to_ascii_lowercase().as_str() {
        "home" | "h" => Ok(Side::Home),
        "away" | "a" => Ok(Side::Away),
        _ => Err(format!("expected home or away, got `{word}`")),
    }
}

/// `+2m`, `-30s`, `5m` (unit required).
fn adjust_arg(word: &str) -> Result<Command, String> {
    let invalid = || format!("expected an adjustment like +2m or -30s, got `{word}`");
    let (amount, in_minutes) = match (word.strip_suffix('m'), word.strip_suffix('s')) {
        (Some(amount), _) => (amount, true),
        (_, Some(amount)) => (amount, false),
        _ => return Err(invalid()),
    };
    let amount: i32 = amount.trim_start_matches('+').parse().map_err(|_| invalid())?;
    Ok(if in_minutes {
        Command::Adjust { minutes: amount, seconds: 0 }
    } else {
        Command::Adjust { minutes: 0, seconds: amount }
    })
}

/// `<poss_home> <shots_home> <shots_away> <on_target_home> <on_target_away>
/// [corners_home corners_away fouls_home fouls_away]`
fn stats_args(args: &[&str]) -> Result<MatchStats, String> {
    if args.len() != 5 && args.len() != 9 {
        return Err("stats takes 5 or 9 numbers; see `help`".into());
    }
    let numbers = args
        .iter()
        .map(|a| a.parse::<u16>().map_err(|_| format!("`{a}` is not a number")))
        .collect::<Result<Vec<_>, _>>()?;
    let possession_home =
        u8::try_from(numbers[0]).ok().filter(|p| *p <= 100).ok_or("possession must be 0-100")?;
    let extra = |i: usize| numbers.get(i).copied().unwrap_or_default();

    let stats = MatchStats {
        possession_home,
        possession_away: 100 - possession_home,
        shots_home: numbers[1],
        shots_away: numbers[2],
        shots_on_target_home: numbers[3],
        shots_on_target_away: numbers[4],
        corners_home: extra(5),
        corners_away: extra(6),
        fouls_home: extra(7),
        fouls_away: extra(8),
    };
    stats.validate()?;
    Ok(stats)
}

/// Apply one command. Returns `false` when the runner should stop.
pub async fn handle_command(
    command: Command,
    app: &Arc<Mutex<App>>,
    network_requests: &mpsc::Sender<NetworkRequest>,
) -> bool {
    let now = Utc::now();
    let mut guard = app.lock().await;

    let request = match command {
        Command::Quit => return false,
        Command::Start => guard.start_match(now),
        Command::Goal { side, player } => guard.record_goal(side, &player, now),
        Command::Card { kind, side, player } => guard.record_card(kind, side, &player, now),
        Command::Substitution { side, out_player, in_player } => {
            guard.record_substitution(side, &out_player, &in_player, now)
        }
        Command::HalfTime => guard.toggle_half_time(now),
        Command::Complete => guard.complete_match(now),
        Command::Adjust { minutes, seconds } => {
            guard.adjust_clock(minutes, seconds, now);
            None
        }
        Command::Select { match_id } => {
            guard.select_match(&match_id, now);
            None
        }
        Command::Next => {
            guard.next_match(now);
            None
        }
        Command::Matches => {
            let listing = report::match_list(&guard.state, now);
            guard.state.notify(listing);
            None
        }
        Command::Refresh => Some(NetworkRequest::RefreshSnapshot),
        Command::Stats(stats) => guard.save_stats(stats),
        Command::Show => {
            let board = report::scoreboard(&guard.state, now);
            guard.state.notify(board);
            None
        }
        Command::Help => {
            guard.state.notify(report::help_text());
            None
        }
    };

    drop(guard);
    if let Some(request) = request {
        let _ = network_requests.send(request).await;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(line: &str) -> Command {
        parse(line).unwrap().unwrap()
    }

    #[test]
    fn parses_event_commands() {
        assert_eq!(parsed("goal home 9"), Command::Goal { side: Side::Home, player: "9".into() });
        assert_eq!(
            parsed("RED a p-17"),
            Command::Card { kind: EventKind::RedCard, side: Side::Away, player: "p-17".into() }
        );
        assert_eq!(
            parsed("  sub away 7 14 "),
            Command::Substitution {
                side: Side::Away,
                out_player: "7".into(),
                in_player: "14".into(),
            }
        );
        assert_eq!(parsed("ht"), Command::HalfTime);
    }

    #[test]
    fn parses_clock_adjustments() {
        assert_eq!(parsed("adjust +2m"), Command::Adjust { minutes: 2, seconds: 0 });
        assert_eq!(parsed("adjust -30s"), Command::Adjust { minutes: 0, seconds: -30 });
        assert_eq!(parsed("adjust 5m"), Command::Adjust { minutes: 5, seconds: 0 });
        assert!(parse("adjust 5").is_err());
        assert!(parse("adjust m").is_err());
    }

    #[test]
    fn parses_stats_with_optional_extras() {
        let Command::Stats(stats) = parsed("stats 55 10 8 4 3") else {
            panic!("expected stats");
        };
        assert_eq!((stats.possession_home, stats.possession_away), (55, 45));
        assert_eq!(stats.corners_home, 0);

        let Command::Stats(stats) = parsed("stats 40 6 12 2 5 3 7 11 9") else {
            panic!("expected stats");
        };
        assert_eq!((stats.corners_away, stats.fouls_home, stats.fouls_away), (7, 11, 9));
    }

    #[test]
    fn rejects_invalid_stats() {
        assert!(parse("stats 101 1 1 0 0").is_err());
        assert!(parse("stats 50 2 2 3 0").is_err());
        assert!(parse("stats 50 2 2").is_err());
        assert!(parse("stats 50 x 2 1 1").is_err());
    }

    #[test]
    fn blank_lines_and_comments_are_skipped() {
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(parse("# first half notes"), Ok(None));
    }

    #[test]
    fn unknown_or_malformed_commands_are_errors() {
        assert!(parse("penalty home 9").is_err());
        assert!(parse("goal middle 9").is_err());
        assert!(parse("goal home").is_err());
        assert!(parse("start now").is_err());
    }
}
