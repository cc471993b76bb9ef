use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::watch;
use tokio::sync::broadcast::error::RecvError;

use tellocon_lib::commands;
use tellocon_lib::config::gamepad_config::GamepadConfig;
use tellocon_lib::config::{AppConfig, ConfigFile};
use tellocon_lib::logging;
use tellocon_lib::mapping::GamepadInputs;
use tellocon_lib::state::AppState;
use tellocon_lib::utils::app_config_dir;

const HUD_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(version, about = "Tello operator console", long_about = None)]
struct Cli {
    /// Directory holding config.json and gamepad_config.json
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Overrides the configured log level
    #[arg(long, global = true)]
    log_level: Option<log::LevelFilter>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fly: compass, drone link, gamepad control and HUD
    Run {
        #[arg(long)]
        no_drone: bool,
        #[arg(long)]
        no_heading: bool,
    },
    /// Print compass headings and link status
    Heading,
    /// Record the gamepad button mapping
    CalibrateGamepad,
    /// Change the drone's WiFi settings
    ProvisionWifi {
        #[arg(long)]
        ssid: String,
        #[arg(long)]
        password: String,
        /// Join this network instead of renaming the drone's access point
        #[arg(long)]
        station: bool,
    },
    /// Show the config files
    Config {
        #[arg(long)]
        write_default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_dir = app_config_dir(cli.config_dir.as_deref())?;
    let config = AppConfig::load_config(&config_dir).await?;

    let level = cli.log_level.unwrap_or_else(|| config.log.level_filter());
    let _log_feed = logging::init_logging(level);
    info!("Using config directory {}", config_dir.display());

    match cli.command.unwrap_or(Command::Run {
        no_drone: false,
        no_heading: false,
    }) {
        Command::Run { no_drone, no_heading } => run(config_dir, config, no_drone, no_heading).await,
        Command::Heading => heading(config_dir, config).await,
        Command::CalibrateGamepad => calibrate_gamepad(&config_dir).await,
        Command::ProvisionWifi { ssid, password, station } => {
            commands::provision_wifi(&config.drone, &ssid, &password, station).await
        }
        Command::Config { write_default } => show_config(&config_dir, &config, write_default).await,
    }
}

async fn run(config_dir: PathBuf, config: AppConfig, no_drone: bool, no_heading: bool) -> Result<()> {
    let gamepad_config = GamepadConfig::load_config(&config_dir).await?;
    let control_interval = config.drone.control_interval();
    let state = Arc::new(AppState::new(config_dir, config, gamepad_config));

    let startup = async {
        if !no_heading {
            if let Err(e) = commands::start_heading_monitor(&state).await {
                warn!("Compass disabled: {:#}", e);
            }
        }
        if !no_drone {
            match commands::connect_drone(&state).await {
                Ok(battery) => info!("Drone ready, battery {}%", battery),
                Err(e) => warn!("Drone unavailable: {:#}", e),
            }
        }
    };
    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        _ = startup => false,
    };
    if interrupted {
        info!("Interrupted during startup");
        commands::shutdown(&state).await;
        return Ok(());
    }

    let (gamepad, inputs) = open_gamepad(&state, control_interval);

    let control = tokio::spawn(commands::run_control_loop(
        state.clone(),
        inputs.clone(),
        state.cancel_token.child_token(),
    ));

    let mut hud = tokio::time::interval(HUD_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = hud.tick() => {
                let gamepad_connected = inputs.borrow().is_some();
                info!("{}", commands::telemetry_snapshot(&state, gamepad_connected).await);
            }
        }
    }

    commands::shutdown(&state).await;
    if let Err(e) = control.await {
        warn!("Control loop ended abnormally: {}", e);
    }
    close_gamepad(gamepad).await;
    Ok(())
}

#[cfg(feature = "gamepad")]
type GamepadHandle = Option<tellocon_lib::mapping::GamepadSource>;
#[cfg(not(feature = "gamepad"))]
type GamepadHandle = watch::Sender<Option<GamepadInputs>>;

#[cfg(feature = "gamepad")]
fn open_gamepad(state: &AppState, interval: Duration) -> (GamepadHandle, watch::Receiver<Option<GamepadInputs>>) {
    use tellocon_lib::mapping::GamepadSource;

    match GamepadSource::start(&state.gamepad_config, interval, state.cancel_token.child_token()) {
        Ok(source) => {
            let inputs = source.subscribe();
            (Some(source), inputs)
        }
        Err(e) => {
            warn!("Gamepad disabled: {:#}", e);
            let (_, inputs) = watch::channel(None);
            (None, inputs)
        }
    }
}

#[cfg(not(feature = "gamepad"))]
fn open_gamepad(_state: &AppState, _interval: Duration) -> (GamepadHandle, watch::Receiver<Option<GamepadInputs>>) {
    info!("Built without gamepad support");
    watch::channel(None)
}

#[cfg(feature = "gamepad")]
async fn close_gamepad(gamepad: GamepadHandle) {
    if let Some(mut source) = gamepad {
        let _ = tokio::task::spawn_blocking(move || source.join()).await;
    }
}

#[cfg(not(feature = "gamepad"))]
async fn close_gamepad(_gamepad: GamepadHandle) {}

async fn heading(config_dir: PathBuf, config: AppConfig) -> Result<()> {
    let state = AppState::new(config_dir, config, GamepadConfig::default());
    let mut headings = state.reporter.subscribe_headings();
    let mut statuses = state.reporter.subscribe_status();
    commands::start_heading_monitor(&state).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            heading = headings.recv() => match heading {
                Ok(heading) => println!("heading {}", heading.degrees()),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            status = statuses.recv() => match status {
                Ok(status) => println!(
                    "status {} {}",
                    if status.connected { "connected" } else { "disconnected" },
                    status.message
                ),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
        }
    }

    commands::shutdown(&state).await;
    Ok(())
}

#[cfg(feature = "gamepad")]
async fn calibrate_gamepad(config_dir: &Path) -> Result<()> {
    use tokio_util::sync::CancellationToken;

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_signal.cancel();
        }
    });

    let config = tellocon_lib::mapping::calibration::run_calibration(config_dir, cancel).await?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(not(feature = "gamepad"))]
async fn calibrate_gamepad(_config_dir: &Path) -> Result<()> {
    anyhow::bail!("tellocon was built without the `gamepad` feature")
}

async fn show_config(config_dir: &Path, config: &AppConfig, write_default: bool) -> Result<()> {
    if write_default {
        AppConfig::default().save_config(config_dir).await?;
        GamepadConfig::default().save_config(config_dir).await?;
    }

    let config = if write_default { AppConfig::default() } else { config.clone() };
    let gamepad_config = GamepadConfig::load_config(config_dir).await?;

    println!("# {}", AppConfig::path_in(config_dir).display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!("# {}", GamepadConfig::path_in(config_dir).display());
    println!("{}", serde_json::to_string_pretty(&gamepad_config)?);
    Ok(())
}
