// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # I/O module daemon
//!
//! ```sh
//! iomodbusd --config /etc/iomodbus/control.toml
//! RUST_LOG=debug iomodbusd --config counter.toml --slave 12
//! iomodbusd --config status.toml --check
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

use iomodbus::{config::Config, daemon::Daemon, supervisor::TerminationSignal};

/// Modbus TCP slave for the digital I/O of a board
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "/etc/iomodbus.toml")]
    config: PathBuf,

    /// Override the slave address of the configuration
    #[arg(short, long)]
    slave: Option<u8>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(slave) = args.slave {
        config.module.slave = Some(slave);
        config.validate()?;
    }
    if args.check {
        println!(
            "{}: {} module, slave {}, {}",
            args.config.display(),
            config.module.kind,
            config.slave(),
            config.socket_addr()?
        );
        return Ok(());
    }

    log::info!(
        "Starting {} module v{}",
        config.module.kind,
        env!("CARGO_PKG_VERSION")
    );
    // Register before any worker runs, a signal must not get lost.
    let signal = TerminationSignal::new().context("registering signal handlers")?;
    let running = Daemon::new(config).start()?;
    running.run_until(signal.recv()).await?;
    log::info!("Exiting");
    Ok(())
}
