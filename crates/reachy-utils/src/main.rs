//! Reachy Utils - Hardware bring-up commands
//!
//! Finds missing actuators and writes the udev rules that give the actuator
//! boards and cameras stable device names.

mod config;
mod service;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reachy_core::PartName;
use reachy_discovery::{DiscoveryReconciler, SerialBusProbe};
use reachy_udev::{RuleSynthesizer, RulesStore, Udevadm};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "reachy-utils")]
#[command(about = "Reachy hardware discovery and udev naming tools")]
#[command(version)]
struct Args {
    /// Robot configuration file (defaults to ~/.reachy.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Tool settings file
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the buses and report missing motors
    Discovery {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Do not stop the SDK server before scanning
        #[arg(long)]
        keep_service: bool,
    },

    /// Write the udev rule binding a part's usb2ax board
    UdevRule {
        /// right_arm, left_arm or head
        part: PartName,

        /// Rules file to update
        #[arg(long)]
        rules_file: Option<PathBuf>,
    },

    /// Write the udev rules for the two head cameras
    UdevRuleCameras {
        /// Rules file to update
        #[arg(long)]
        rules_file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Reachy utils v{}", env!("CARGO_PKG_VERSION"));

    let settings_path = args.settings.unwrap_or_else(config::default_settings_path);
    let settings = config::load_settings(&settings_path)?;

    match args.command {
        Command::Discovery { json, keep_service } => {
            let robot_path = args.config.unwrap_or_else(config::default_robot_config_path);
            let robot = config::load_robot_config(&robot_path)?;

            if !json {
                println!("Scanning if there are any missing motors for Reachy {}...", robot.model);
            }
            if !keep_service {
                service::release_buses(&settings.discovery.service);
            }

            let probe = SerialBusProbe::new(settings.discovery.probe.clone());
            let mut reconciler =
                DiscoveryReconciler::new(settings.discovery_config(robot.model), probe);
            let report = reconciler.reconcile();

            if json {
                println!("{}", report.to_json().context("Failed to serialize report")?);
            } else {
                println!("{report}");
            }
        }

        Command::UdevRule { part, rules_file } => {
            let store = RulesStore::new(rules_file.unwrap_or(settings.udev.rules_path));
            let synthesizer = RuleSynthesizer::new(Udevadm::new(), store);
            let rule = synthesizer
                .write_board_rule(part)
                .with_context(|| format!("Failed to write udev rule for {part}"))?;

            println!("Wrote udev rule for {part} to {}:", synthesizer.store().path().display());
            println!("{rule}");
        }

        Command::UdevRuleCameras { rules_file } => {
            let store = RulesStore::new(rules_file.unwrap_or(settings.udev.rules_path));
            let synthesizer = RuleSynthesizer::new(Udevadm::new(), store);
            let (right, left) = synthesizer
                .write_camera_rules()
                .context("Failed to write udev rules for cameras")?;

            println!("Wrote udev rules for cameras to {}:", synthesizer.store().path().display());
            println!("{right}");
            println!("{left}");
            println!("If the left and right images are swapped, exchange the two serials.");
        }
    }

    Ok(())
}
