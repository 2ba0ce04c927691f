// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-fieldbus-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point of the field bus monitor
use anyhow::Result;
use clap::Parser;
use log::{info, LevelFilter};
use std::path::PathBuf;

use rust_fieldbus_monitor::config::{self, BaudRate, Config, TransportKind};
use rust_fieldbus_monitor::daemon::Daemon;

/// Modbus field device poller with local I/O monitoring
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML), created with defaults when missing
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Validate a configuration file and exit
    #[arg(long, value_name = "FILE")]
    validate_config: Option<PathBuf>,

    /// Print the JSON schema of the configuration file and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Serial device of the RTU transport
    #[arg(long)]
    device: Option<String>,

    /// Line speed
    #[arg(long)]
    baud: Option<BaudRate>,

    /// Transport used to reach the field devices
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,

    /// Enable verbose output (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Disable logging
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.quiet {
        LevelFilter::Off
    } else if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if args.show_config_schema {
        config::output_config_schema()?;
        return Ok(());
    }

    if let Some(validate_path) = args.validate_config {
        // validation must not create a default file
        if !validate_path.exists() {
            anyhow::bail!(
                "Configuration file does not exist: {}",
                validate_path.display()
            );
        }
        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {:#}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let mut config = Config::from_file(&args.config)?;

    config.apply_args(args.device, args.baud, args.transport);
    // Command line values go through the same rules as the file
    config::validate_specific_rules(&config)?;

    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;
    info!("Monitor running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}
