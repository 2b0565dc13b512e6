// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! meshlog-sim - Data log server/client simulator
//!
//! Runs a server and a client node on a shared virtual clock over a lossy
//! in-memory link, and drives the remote configuration commands.

mod link;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use meshlog::{
    FlowControl, LogClient, LogConfig, LogServer, PropertiesStore, QueueTransport, RamStorage,
    Timer, VirtualScheduler,
};
use meshlog_persistence::SqliteStorage;

use link::{Collector, Link, NodeStorage, Sensor, SimClient, SimServer, SERVER_ADDR};

/// meshlog simulator
#[derive(Parser, Debug)]
#[command(name = "meshlog-sim")]
#[command(version)]
#[command(about = "Simulate a data log server and client over a lossy mesh link")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Flow control strategy (overrides the config file)
    #[arg(short, long, value_enum, global = true)]
    flow: Option<Flow>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database holding the server properties (in memory if absent)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Random seed for the sensor and the link
    #[arg(short, long, default_value = "1", global = true)]
    seed: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Flow {
    /// One acknowledgment per segment
    Ack,
    /// Transmission counter with timeouts
    Counter,
}

impl From<Flow> for FlowControl {
    fn from(flow: Flow) -> Self {
        match flow {
            Flow::Ack => FlowControl::AckPerSegment,
            Flow::Counter => FlowControl::CounterWithTimeout,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Sample, report and receive for a while
    Run {
        /// Virtual duration (ms)
        #[arg(short, long, default_value = "60000")]
        duration_ms: u64,

        /// Probability that a message is lost
        #[arg(short, long, default_value = "0.0")]
        loss: f64,

        /// Probability that a transmission is delivered twice
        #[arg(long, default_value = "0.0")]
        duplicate: f64,

        /// Only print the summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Send configuration commands from the client to the server
    Configure {
        /// Report period (ms)
        #[arg(long)]
        period: Option<u32>,

        /// Sample rate (ms)
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Threshold
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<i8>,
    },

    /// Delete the persisted server properties
    ResetConfig,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    match &args.mode {
        Mode::Run {
            duration_ms,
            loss,
            duplicate,
            quiet,
        } => run_simulation(args, *duration_ms, *loss, *duplicate, !*quiet),
        Mode::Configure {
            period,
            sample_rate,
            threshold,
        } => run_configure(args, *period, *sample_rate, *threshold),
        Mode::ResetConfig => run_reset_config(args),
    }
}

fn load_config(args: &Args) -> Result<LogConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str::<LogConfig>(&text)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        }
        None => LogConfig::default(),
    };

    if let Some(flow) = args.flow {
        config.flow_control = flow.into();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_storage(args: &Args) -> Result<NodeStorage> {
    Ok(match &args.db {
        Some(path) => NodeStorage::Sqlite(SqliteStorage::new(path)?),
        None => NodeStorage::Ram(RamStorage::new()),
    })
}

fn build_nodes(args: &Args, config: &LogConfig) -> Result<(SimServer, SimClient)> {
    let mut server = LogServer::new(
        config.clone(),
        QueueTransport::new(),
        VirtualScheduler::new(),
        PropertiesStore::new(open_storage(args)?),
        Sensor::new(args.seed),
    )?;
    server.init()?;

    let mut client = LogClient::new(
        config.clone(),
        QueueTransport::new(),
        VirtualScheduler::new(),
        Collector::default(),
    )?;
    client.init()?;

    Ok((server, client))
}

fn run_simulation(
    args: &Args,
    duration_ms: u64,
    loss: f64,
    duplicate: f64,
    verbose: bool,
) -> Result<()> {
    if !(0.0..=1.0).contains(&loss) || !(0.0..=1.0).contains(&duplicate) {
        bail!("--loss and --duplicate must be within 0.0..=1.0");
    }

    let config = load_config(args)?;
    let (mut server, mut client) = build_nodes(args, &config)?;
    let mut link = Link::new(args.seed.wrapping_add(1), loss, duplicate);
    client.observer_mut().verbose = verbose;

    let props = server.properties();
    println!("=== meshlog simulation: {} ms ===\n", duration_ms);
    println!("  Flow control: {:?}", config.flow_control);
    println!(
        "  Sample rate: {} ms, period: {} ms, threshold: {}",
        props.sample_rate_ms, props.period_ms, props.threshold
    );
    println!("  Link: loss {:.2}, duplicate {:.2}\n", loss, duplicate);

    server.start()?;
    simulate(&mut server, &mut client, &mut link, duration_ms)?;

    // One on-demand reading at the end
    client.request_sample(SERVER_ADDR)?;
    link.client_to_server(&mut client, &mut server);
    link.server_to_client(&mut server, &mut client);
    server.stop()?;

    let sensor = server.observer();
    let collector = client.observer();
    println!("\n=== Results ===");
    println!("  Transmissions completed: {}", sensor.completed);
    println!("  Send timeouts: {}", sensor.timeouts);
    println!("  Log full / overflow: {} / {}", sensor.full, sensor.overflow);
    println!(
        "  Logs received: {} ({} entries)",
        collector.logs, collector.entries
    );
    println!("  Samples received: {}", collector.samples);
    println!("  Receive timeouts: {}", collector.timeouts);
    println!(
        "  Link: {} delivered, {} dropped, {} replayed",
        link.stats.delivered, link.stats.dropped, link.stats.replayed
    );

    Ok(())
}

/// Run both nodes until `until` (virtual ms)
fn simulate(server: &mut SimServer, client: &mut SimClient, link: &mut Link, until: u64) -> Result<()> {
    let mut last_pushed = server.observer().current();

    loop {
        let next = [
            server.scheduler().next_deadline(),
            client.scheduler().next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min();

        let Some(now) = next.filter(|&t| t <= until) else {
            break;
        };
        server.scheduler_mut().advance_to(now);
        client.scheduler_mut().advance_to(now);
        client.observer_mut().now = now;

        while let Some(timer) = server.scheduler_mut().poll() {
            if let Err(e) = server.on_timer(timer) {
                log::warn!("server timer {:?} failed: {}", timer, e);
            }

            // Push a single sample when the reading moved past the threshold
            if timer == Timer::Sample {
                let current = server.observer().current();
                let delta = (i16::from(current.temperature) - i16::from(last_pushed.temperature)).abs();
                let threshold = i16::from(server.threshold());
                if threshold > 0 && delta >= threshold {
                    server.push_sample(current)?;
                    last_pushed = current;
                }
            }
            link.server_to_client(server, client);
        }

        while let Some(timer) = client.scheduler_mut().poll() {
            if let Err(e) = client.on_timer(timer) {
                log::warn!("client timer {:?} failed: {}", timer, e);
            }
            link.client_to_server(client, server);
            link.server_to_client(server, client);
        }
    }

    Ok(())
}

fn run_configure(
    args: &Args,
    period: Option<u32>,
    sample_rate: Option<u32>,
    threshold: Option<i8>,
) -> Result<()> {
    if period.is_none() && sample_rate.is_none() && threshold.is_none() {
        bail!("Nothing to configure (use --period, --sample-rate or --threshold)");
    }

    let config = load_config(args)?;
    let (mut server, mut client) = build_nodes(args, &config)?;
    let mut link = Link::new(args.seed, 0.0, 0.0);

    println!("=== meshlog configure ===\n");
    if let Some(ms) = period {
        client.set_period(ms)?;
    }
    if let Some(ms) = sample_rate {
        client.set_sample_rate(ms)?;
    }
    if let Some(value) = threshold {
        client.set_threshold(value)?;
    }
    link.client_to_server(&mut client, &mut server);

    let props = server.properties();
    println!(
        "\n  Sample rate: {} ms, period: {} ms, threshold: {}",
        props.sample_rate_ms, props.period_ms, props.threshold
    );
    match &args.db {
        Some(path) => println!("  Persisted to {}", path),
        None => println!("  Not persisted (no --db)"),
    }
    Ok(())
}

fn run_reset_config(args: &Args) -> Result<()> {
    let Some(path) = &args.db else {
        bail!("reset-config needs --db");
    };

    let mut store = PropertiesStore::new(SqliteStorage::new(path)?);
    store.reset()?;
    println!("Persisted properties deleted from {}", path);
    Ok(())
}
