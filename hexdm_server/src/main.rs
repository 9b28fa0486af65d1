//! # HexDM Server Binary
//!
//! Interactive control server for the segmented deformable mirror.
//!
//! # Usage
//!
//! ```bash
//! # Simulation (no hardware calls), default channel count
//! hexdm_server --simulate
//!
//! # Real mirror through a registered driver
//! hexdm_server --config /etc/hexdm/hexdm.toml --driver simulation
//!
//! # Channel files in a private directory, verbose JSON logs
//! hexdm_server -s --shm-dir /tmp/hexdm --nch 6 -v --json
//! ```

use clap::Parser;
use hexdm_common::config::ConfigLoader;
use hexdm_common::consts::DEFAULT_CONFIG_PATH;
use hexdm_common::dm::config::HexDmConfig;
use hexdm_hal::DriverRegistry;
use hexdm_server::console::{Command, HELP_TEXT, execute};
use hexdm_server::DmServer;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// HexDM Server - segmented deformable mirror control
#[derive(Parser, Debug)]
#[command(name = "hexdm_server")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Control server for a segmented deformable mirror")]
#[command(long_about = None)]
struct Args {
    /// Path to the server configuration file (hexdm.toml).
    /// Falls back to built-in defaults if the default path does not exist.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Skip every hardware call
    #[arg(short = 's', long, conflicts_with = "driver")]
    simulate: bool,

    /// Drive the mirror through this registered driver
    #[arg(short, long)]
    driver: Option<String>,

    /// Number of virtual channels allocated at startup
    #[arg(short, long)]
    nch: Option<usize>,

    /// Directory for the channel segment files
    #[arg(long, value_name = "DIR")]
    shm_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

enum ConsoleEvent {
    Line(String),
    Interrupt,
    Closed,
}

fn main() {
    if let Err(e) = run() {
        error!("HexDM server failed: {}", e);
        eprintln!("hexdm_server: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let (config, source) = load_config(&args)?;
    setup_tracing(&args, config.shared.log_level.into());

    info!(
        service = %config.shared.service_name,
        "HexDM server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );
    match source {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => warn!("No configuration file, using defaults"),
    }

    let registry = DriverRegistry::with_builtin();
    let mut server = DmServer::new(config, &registry)?;

    let (events, inbox) = mpsc::channel();

    let interrupt = events.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt.send(ConsoleEvent::Interrupt);
    })?;

    thread::Builder::new()
        .name("hexdm-console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if events.send(ConsoleEvent::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(_) => break,
                }
            }
            let _ = events.send(ConsoleEvent::Closed);
        })?;

    println!("{HELP_TEXT}");
    prompt();
    while let Ok(event) = inbox.recv() {
        match event {
            ConsoleEvent::Line(line) => {
                if let Some(command) = Command::parse(&line) {
                    let reply = execute(&mut server, command);
                    println!("{}", reply.text);
                    if reply.quit {
                        break;
                    }
                }
                prompt();
            }
            ConsoleEvent::Interrupt => {
                info!("Received shutdown signal");
                break;
            }
            ConsoleEvent::Closed => {
                info!("Console input closed");
                break;
            }
        }
    }

    server.quit()?;
    info!("HexDM server shutdown complete");
    Ok(())
}

fn prompt() {
    print!("HexDM > ");
    let _ = std::io::stdout().flush();
}

/// Load the config file and apply command line overrides.
///
/// Returns the config and the file it came from, if any.
fn load_config(args: &Args) -> Result<(HexDmConfig, Option<PathBuf>), Box<dyn std::error::Error>> {
    let source = match &args.config {
        Some(path) => Some(path.clone()),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Some(PathBuf::from(DEFAULT_CONFIG_PATH)),
        None => None,
    };
    let mut config = match &source {
        Some(path) => HexDmConfig::load(path)?,
        None => HexDmConfig::default(),
    };

    if args.simulate {
        config.dm.simulate = true;
    }
    if let Some(driver) = &args.driver {
        config.dm.driver = driver.clone();
        config.dm.simulate = false;
    }
    if let Some(nch) = args.nch {
        config.channels.default_nch = nch;
    }
    if let Some(dir) = &args.shm_dir {
        config.channels.shm_dir = dir.clone();
    }

    config.validate()?;
    Ok((config, source))
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: Level) {
    let level = if args.verbose { Level::DEBUG } else { configured };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
