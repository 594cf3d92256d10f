//! TuxEatPi main entry point.
//!
//! ```text
//! ┌───────────────────────────── tuxeatpi demo ───────────────────────────┐
//! │                                                                       │
//! │  SimBoard ──▶ WingActuator ──▶ WingsAptitude (thread)  ◀──┐           │
//! │      │                                                     │ Broker    │
//! │      └── switch IRQ ──▶ EventChannel ──▶ LogEventSink      │           │
//! │                                                            │           │
//! │  tuxeatpi aptitude being (child process, framed stdio)  ◀──┘           │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Worker processes log to stderr; stdout carries frames only.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde_json::json;

use tuxeatpi::adapters::log_sink::LogEventSink;
use tuxeatpi::aptitudes::being::BeingAptitude;
use tuxeatpi::aptitudes::subprocess::serve_stdio;
use tuxeatpi::aptitudes::wings::WingsAptitude;
use tuxeatpi::aptitudes::{Aptitude, OrderRequest, SubprocessedAptitude};
use tuxeatpi::config::SystemConfig;
use tuxeatpi::drivers::sim::SimBoard;
use tuxeatpi::events::EventChannel;
use tuxeatpi::transmission::TransmissionBroker;
use tuxeatpi::wings::WingActuator;
use tuxeatpi::Error;

#[derive(Parser)]
#[command(name = "tuxeatpi")]
#[command(version)]
#[command(about = "TuxEatPi companion robot core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulated wing with a wings and a being aptitude
    Demo {
        /// JSON configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Serve one aptitude over stdin/stdout (used by worker processes)
    Aptitude {
        #[arg(value_enum)]
        name: AptitudeKind,

        /// JSON configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AptitudeKind {
    Wings,
    Being,
}

fn load_config(path: Option<&Path>) -> Result<SystemConfig> {
    match path {
        Some(p) => SystemConfig::load(p)
            .map_err(Error::from)
            .with_context(|| format!("loading {}", p.display())),
        None => Ok(SystemConfig::default()),
    }
}

fn build_wings(config: &SystemConfig, events: Arc<EventChannel>) -> Result<WingActuator> {
    let board = Arc::new(
        SimBoard::with_wing_rig(&config.wings.pins, &config.sim).context("starting sim board")?,
    );
    let actuator = WingActuator::new(board, &config.wings, events)?;
    Ok(actuator)
}

fn serve(kind: AptitudeKind, config: &SystemConfig) -> Result<()> {
    let mut aptitude: Box<dyn Aptitude> = match kind {
        AptitudeKind::Being => Box::new(BeingAptitude::new(config)),
        AptitudeKind::Wings => {
            let events = Arc::new(EventChannel::new());
            Box::new(WingsAptitude::new(build_wings(config, events)?))
        }
    };
    serve_stdio(aptitude.as_mut(), &config.transmission)?;
    Ok(())
}

fn demo(config: &SystemConfig, config_path: Option<&Path>) -> Result<()> {
    info!("=== TuxEatPi demo: {} ===", config.name);

    let events = Arc::new(EventChannel::new());
    let broker = Arc::new(TransmissionBroker::new(&config.transmission));

    let wings = SubprocessedAptitude::spawn(
        Box::new(WingsAptitude::new(build_wings(config, events.clone())?)),
        broker.clone(),
        &config.transmission,
    )?;

    let mut child = Command::new(std::env::current_exe().context("locating own binary")?);
    child.arg("aptitude").arg("being");
    if let Some(p) = config_path {
        child.arg("--config").arg(p);
    }
    let being = match SubprocessedAptitude::spawn_process("being", child, broker.clone()) {
        Ok(apt) => apt,
        Err(e) => {
            warn!("being worker process unavailable ({}), hosting on a thread", e);
            SubprocessedAptitude::spawn(
                Box::new(BeingAptitude::new(config)),
                broker.clone(),
                &config.transmission,
            )?
        }
    };
    info!("aptitudes: {:?}", broker.routes());

    let name = being.order("aptitudes.being.get_name", json!({}), true);
    info!("being.get_name -> {:?}", name);

    let request: OrderRequest = serde_json::from_value(json!({"command": "wings.move_count",
                                                              "arguments": {"count": 3}}))?;
    info!("wings.move_count(3) -> {:?}", wings.order_request(request));

    // Bounded by the broker's answer timeout.
    let settle = config.transmission.answer_timeout().as_secs_f64() * 0.8;
    info!(
        "wings.wait_idle -> {:?}",
        wings.order("wings.wait_idle", json!({"seconds": settle}), true)
    );
    info!(
        "wings.get_position -> {:?}",
        wings.order("wings.get_position", json!({}), true)
    );

    let _ = wings.order("wings.push_wing", json!({"side": "left"}), true);
    tuxeatpi::timer::sleep(Duration::from_millis(50));

    let mut sink = LogEventSink::new();
    let drained = events.drain_into(&mut sink);
    info!("{} switch events observed", drained);

    info!(
        "being.get_uptime -> {:?}",
        being.order("being.get_uptime", json!({}), true)
    );
    info!("=== demo done ===");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo { config } => {
            let cfg = load_config(config.as_deref())?;
            demo(&cfg, config.as_deref())
        }
        Commands::Aptitude { name, config } => {
            let cfg = load_config(config.as_deref())?;
            serve(name, &cfg)
        }
    }
}
