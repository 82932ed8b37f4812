//! `almue` – device controller daemon.
//!
//! 1. Initialises tracing (`RUST_LOG`, `ALMUE_LOG_FORMAT`, optional OTLP).
//! 2. Loads `~/.almue/config.toml` (or `$ALMUE_CONFIG`), writing the defaults
//!    on first run.
//! 3. Opens the SQLite state store and seeds every shutter with its last
//!    recorded opening.
//! 4. Registers the configured shutters and lightings and runs their daily
//!    jobs until **Ctrl-C**, then stops every device and releases its lines.

mod config;

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use almue_controller::DeviceController;
use almue_runtime::init_tracing;
use almue_store::SqliteStateStore;
use colored::Colorize;
use tracing::{error, info, warn};

use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let _tracing = init_tracing("almue");

    print_banner();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "almue stopped");
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cfg = load_config()?;
    info!(
        simulate = cfg.simulate,
        database = %cfg.database_path,
        shutters = cfg.shutters.len(),
        lightings = cfg.lightings.len(),
        "configuration loaded"
    );

    let store = Arc::new(SqliteStateStore::open(&cfg.database_path)?);
    let mut shutters = cfg.shutters.clone();
    let seeded = store.seed_openings(&mut shutters)?;
    info!(seeded, "shutter openings restored from state store");

    let controller = DeviceController::builder(store)
        .simulate(cfg.simulate)
        .build()?;

    let registered = controller
        .register_shutters(&shutters)
        .and_then(|()| controller.register_lightings(&cfg.lightings));
    if let Err(e) = registered {
        controller.shutdown();
        return Err(e.into());
    }

    print_devices(&controller, cfg.simulate);

    tokio::signal::ctrl_c().await?;
    println!();
    println!("{}", "⚠  Ctrl-C received – stopping all devices …".yellow().bold());
    controller.shutdown();
    println!("{}", "  ✓ All lines released.".green());
    Ok(())
}

fn load_config() -> Result<Config, String> {
    let path = config::config_path();
    match config::load()? {
        Some(cfg) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            Ok(cfg)
        }
        None => {
            let cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => warn!(error = %e, "failed to write default config"),
            }
            let mut cfg = cfg;
            config::apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___   __                "#.bold().cyan());
    println!("{}", r#"  / _ | / /_ _  __ _____   "#.bold().cyan());
    println!("{}", r#" / __ |/ /  ' \/ // / -_)  "#.bold().cyan());
    println!("{}", r#"/_/ |_/_/_/_/_/\_,_/\__/   "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "almue".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Shutter and lighting controller");
    println!();
}

fn print_devices(controller: &DeviceController, simulate: bool) {
    let mode = if simulate {
        "simulated lines".yellow()
    } else {
        "GPIO header".green()
    };
    println!("  Driving {}", mode);

    for id in controller.shutter_ids() {
        if let Ok(opening) = controller.shutter_opening(id) {
            println!("    • shutter {} at {}%", id.to_string().bold(), opening);
        }
    }
    for id in controller.lighting_ids() {
        if let Ok(on) = controller.lighting_is_on(id) {
            let state = if on { "on".green() } else { "off".dimmed() };
            println!("    • lighting {} {}", id.to_string().bold(), state);
        }
    }
    println!();
    println!("  Press {} to stop.\n", "Ctrl-C".bold().cyan());
}
