mod app;
mod clock;
mod commands;
mod events;
mod report;
mod selector;
mod session;
mod state;

use crate::app::App;
use crate::commands::Command;
use crate::state::app_settings::AppSettings;
use crate::state::messages::{NetworkRequest, NetworkResponse, UiEvent};
use crate::state::network::NetworkWorker;
use crate::state::refresher::PeriodicRefresher;
use chrono::Utc;
use log::{LevelFilter, error, info};
use matchday_api::client::TournamentApi;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if handle_cli_args() {
        return Ok(());
    }

    better_panic::install();

    let settings = AppSettings::load();
    init_logger(settings.log_level);
    info!(
        "matchday {} as {} ({:?}) against {}",
        env!("CARGO_PKG_VERSION"),
        settings.actor,
        settings.role,
        settings.api_url
    );

    let client = TournamentApi::new()
        .with_base_url(settings.api_url.clone())
        .with_token(settings.api_token.clone())
        .with_timeout(settings.write_timeout);
    let poll_interval = settings.poll_interval;
    let app = Arc::new(Mutex::new(App::new(settings)));

    let (ui_event_tx, ui_event_rx) = mpsc::channel::<UiEvent>(100);
    let (network_req_tx, network_req_rx) = mpsc::channel::<NetworkRequest>(100);
    let (network_resp_tx, network_resp_rx) = mpsc::channel::<NetworkResponse>(100);

    // Command reader
    let input_handler = tokio::spawn(input_handler_task(ui_event_tx.clone()));

    // Network worker
    let network_worker = NetworkWorker::new(client, network_req_rx, network_resp_tx);
    let network_task = tokio::spawn(network_worker.run());

    // Background poll of the tournament
    let periodic_updater = PeriodicRefresher::new(network_req_tx.clone(), poll_interval);
    let periodic_task = tokio::spawn(periodic_updater.run());

    // Match clock tick
    let clock_tx = ui_event_tx.clone();
    let clock_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            if clock_tx.send(UiEvent::ClockTick).await.is_err() {
                break;
            }
        }
    });

    // Load the tournament on startup
    let _ = ui_event_tx.send(UiEvent::AppStarted).await;
    drop(ui_event_tx);

    main_loop(app, ui_event_rx, network_req_tx, network_resp_rx).await;

    input_handler.abort();
    network_task.abort();
    periodic_task.abort();
    clock_task.abort();

    Ok(())
}

fn handle_cli_args() -> bool {
    let mut args = std::env::args().skip(1);
    let Some(arg) = args.next() else {
        return false;
    };

    match arg.as_str() {
        "-h" | "--help" => {
            println!("{}", usage_text());
            true
        }
        "-V" | "--version" => {
            println!("matchday {}", env!("CARGO_PKG_VERSION"));
            true
        }
        _ => {
            eprintln!("Unknown argument: {arg}\n\n{}", usage_text());
            std::process::exit(2);
        }
    }
}

fn usage_text() -> &'static str {
    "matchday - live match console for football tournaments

Usage:
  matchday              read commands from stdin (type `help`)
  matchday --help
  matchday --version

Environment:
  MATCHDAY_API_URL             Tournament service base URL (default http://127.0.0.1:5000/api)
  MATCHDAY_API_TOKEN           Bearer token sent with every request
  MATCHDAY_ROLE                viewer | scorer | management (default viewer)
  MATCHDAY_ACTOR               Name recorded in logs (default $USER)
  MATCHDAY_POLL_SECS           Background refresh interval (default 30)
  MATCHDAY_WRITE_TIMEOUT_SECS  Give up on a write after this long (default 12)
  MATCHDAY_LOG                 Log level (error, warn, info, debug, trace)

Settings may also be stored in $XDG_CONFIG_HOME/matchday/settings.json."
}

/// `RUST_LOG` wins; otherwise the configured level, defaulting to warnings.
fn init_logger(level: Option<LevelFilter>) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level.unwrap_or(LevelFilter::Warn));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.format_timestamp_secs().init();
}

async fn main_loop(
    app: Arc<Mutex<App>>,
    mut ui_events: mpsc::Receiver<UiEvent>,
    network_requests: mpsc::Sender<NetworkRequest>,
    mut network_responses: mpsc::Receiver<NetworkResponse>,
) {
    // Commands typed or piped before the tournament has loaded wait for it.
    let mut held: VecDeque<Command> = VecDeque::new();
    // End of input lets the startup load and a pending write settle before exiting.
    let mut closing = false;
    loop {
        tokio::select! {
            Some(ui_event) = ui_events.recv() => match ui_event {
                UiEvent::InputClosed => closing = true,
                UiEvent::Command(command) => {
                    let loading = app.lock().await.state.loading;
                    if loading || !held.is_empty() {
                        held.push_back(command);
                    } else if !commands::handle_command(command, &app, &network_requests).await {
                        break;
                    }
                }
                ui_event => {
                    if !handle_ui_event(ui_event, &app, &network_requests).await {
                        break;
                    }
                }
            },

            Some(response) = network_responses.recv() => {
                handle_network_response(response, &app).await;
            }

            else => break,
        }
        print_notices(&app).await;

        if !held.is_empty() && !app.lock().await.state.loading {
            while let Some(command) = held.pop_front() {
                let keep_running = commands::handle_command(command, &app, &network_requests).await;
                print_notices(&app).await;
                if !keep_running {
                    return;
                }
            }
        }
        if closing && app.lock().await.is_idle() {
            break;
        }
    }
}

async fn handle_ui_event(
    ui_event: UiEvent,
    app: &Arc<Mutex<App>>,
    network_requests: &mpsc::Sender<NetworkRequest>,
) -> bool {
    match ui_event {
        UiEvent::AppStarted => {
            let _ = network_requests.send(NetworkRequest::LoadSnapshot).await;
            true
        }
        UiEvent::Command(command) => {
            commands::handle_command(command, app, network_requests).await
        }
        UiEvent::InputClosed => false,
        UiEvent::ClockTick => {
            let mut guard = app.lock().await;
            guard.on_clock_tick(Utc::now());
            true
        }
    }
}

async fn handle_network_response(response: NetworkResponse, app: &Arc<Mutex<App>>) {
    let now = Utc::now();
    let mut guard = app.lock().await;
    match response {
        NetworkResponse::SnapshotLoaded { snapshot } => guard.on_snapshot_loaded(snapshot, now),
        NetworkResponse::LoadFailed { message } => {
            error!("Could not load the tournament: {message}");
            guard.on_load_failed(message);
        }
        NetworkResponse::SnapshotRefreshed { snapshot } => {
            guard.on_snapshot_refreshed(snapshot, now)
        }
        NetworkResponse::WriteSettled { token, result } => {
            guard.on_write_settled(token, result, now)
        }
        NetworkResponse::StatsSaved { match_id } => guard.on_stats_saved(match_id),
        NetworkResponse::Error { message } => {
            error!("Network error: {message}");
            guard.on_error(message);
        }
    }
}

async fn print_notices(app: &Arc<Mutex<App>>) {
    let notices = app.lock().await.take_notices();
    for notice in notices {
        println!("{notice}");
    }
}

async fn input_handler_task(ui_events: mpsc::Sender<UiEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let ui_event = match lines.next_line().await {
            Ok(Some(line)) => match commands::parse(&line) {
                Ok(Some(command)) => UiEvent::Command(command),
                Ok(None) => continue,
                Err(message) => {
                    eprintln!("{message}");
                    continue;
                }
            },
            Ok(None) => UiEvent::InputClosed,
            Err(e) => {
                error!("failed to read input: {e}");
                UiEvent::InputClosed
            }
        };

        let closed = matches!(ui_event, UiEvent::InputClosed);
        if ui_events.send(ui_event).await.is_err() || closed {
            break;
        }
    }
}
