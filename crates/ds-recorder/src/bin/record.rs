// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ds-record - Record a telemetry packet stream to destination files.
//!
//! Usage:
//!   ds-record run --filter-table filter.toml --dest-table dest.toml --input tlm.bin
//!   cat tlm.bin | ds-record run --config ds.toml --input -
//!   ds-record run --config ds.toml --input tlm.bin --commands /run/ds/cmd.fifo
//!   ds-record validate --filter-table filter.toml --dest-table dest.toml
//!   ds-record gen-tables --output-dir ./tables

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ds_recorder::{
    Command, CommandReply, DestinationDefinition, DestinationTable, Engine, EngineConfig, FilenameMode, FilterDescriptor,
    FilterTable, FsStorage, JsonFileStore, PacketEntry, PacketReader, RawPacket,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ds-record")]
#[command(about = "Filter telemetry packets into size- and age-limited files")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a CCSDS packet stream
    Run {
        /// Engine configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Filter table (overrides the config file)
        #[arg(long)]
        filter_table: Option<PathBuf>,

        /// Destination table (overrides the config file)
        #[arg(long)]
        dest_table: Option<PathBuf>,

        /// Packet stream, or "-" for stdin
        #[arg(short, long, default_value = "-")]
        input: String,

        /// JSON command lines (file or FIFO), applied between packets
        #[arg(long)]
        commands: Option<PathBuf>,
    },

    /// Validate a filter table against a destination table
    Validate {
        /// Engine configuration file (sequence limits)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        filter_table: PathBuf,

        #[arg(long)]
        dest_table: PathBuf,
    },

    /// Write sample configuration and tables
    GenTables {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.command {
        Commands::Run {
            config: Some(path), ..
        }
        | Commands::Validate {
            config: Some(path), ..
        } => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        _ => EngineConfig::default(),
    };

    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match args.command {
        Commands::Run {
            filter_table,
            dest_table,
            input,
            commands,
            ..
        } => cmd_run(config, filter_table, dest_table, &input, commands),
        Commands::Validate {
            filter_table,
            dest_table,
            ..
        } => cmd_validate(&config, &filter_table, &dest_table),
        Commands::GenTables { output_dir } => cmd_gen_tables(&output_dir),
    }
}

fn load_tables(
    config: &EngineConfig,
    filter_path: &Path,
    dest_path: &Path,
) -> anyhow::Result<(FilterTable, DestinationTable)> {
    let dests = DestinationTable::from_file(dest_path)
        .with_context(|| format!("Failed to load destination table {}", dest_path.display()))?;
    dests
        .validate(config.max_sequence_count)
        .with_context(|| format!("Invalid destination table {}", dest_path.display()))?;

    let filters = FilterTable::from_file(filter_path)
        .with_context(|| format!("Failed to load filter table {}", filter_path.display()))?;
    filters
        .validate(dests.len())
        .with_context(|| format!("Invalid filter table {}", filter_path.display()))?;

    Ok((filters, dests))
}

fn cmd_run(
    config: EngineConfig,
    filter_table: Option<PathBuf>,
    dest_table: Option<PathBuf>,
    input: &str,
    commands: Option<PathBuf>,
) -> anyhow::Result<()> {
    let Some(filter_path) = filter_table.or_else(|| config.filter_table.clone()) else {
        bail!("No filter table: pass --filter-table or set filter_table in the config");
    };
    let Some(dest_path) = dest_table.or_else(|| config.dest_table.clone()) else {
        bail!("No destination table: pass --dest-table or set dest_table in the config");
    };
    let (filters, dests) = load_tables(&config, &filter_path, &dest_path)?;

    for def in &dests.files {
        std::fs::create_dir_all(&def.path)
            .with_context(|| format!("Failed to create {}", def.path))?;
        if let Some(dir) = &def.move_directory {
            std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir))?;
        }
    }

    let hk_period = Duration::from_secs(config.secs_per_hk_cycle);
    let state_file = config.state_file.clone();
    let mut engine = Engine::new(config, FsStorage::new())?;
    if let Some(path) = state_file {
        engine = engine.with_store(JsonFileStore::new(path));
    }
    engine.load_tables(filters, dests)?;

    info!("DS Recording Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("Filter table: {}", filter_path.display());
    info!("Destination table: {}", dest_path.display());

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let source: Box<dyn Read + Send> = if input == "-" {
        Box::new(io::stdin())
    } else {
        let file = File::open(input).with_context(|| format!("Failed to open {}", input))?;
        Box::new(BufReader::new(file))
    };
    let packets = spawn_reader(source);
    let commands = commands.map(|path| {
        info!("Command source: {}", path.display());
        spawn_command_reader(path)
    });

    let mut last_hk = Instant::now();
    while running.load(Ordering::SeqCst) {
        if let Some(rx) = &commands {
            drain_commands(&mut engine, rx);
        }

        match packets.recv_timeout(Duration::from_millis(100)) {
            Ok(packet) => engine.on_packet(&packet.as_packet()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("End of input");
                break;
            }
        }

        if last_hk.elapsed() >= hk_period {
            let report = engine.housekeeping_tick();
            info!(
                "HK: passed {} filtered {} written {} write errors {} open files {}",
                report.counters.passed_packets,
                report.counters.filtered_packets,
                report.counters.file_writes,
                report.counters.file_write_errors,
                report.open_files
            );
            last_hk = Instant::now();
        }
    }

    let report = engine.shutdown();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Read packets on a separate thread so housekeeping keeps its cadence
/// while the input is idle.
fn spawn_reader(source: Box<dyn Read + Send>) -> mpsc::Receiver<RawPacket> {
    let (tx, rx) = mpsc::sync_channel(256);
    std::thread::spawn(move || {
        for packet in PacketReader::new(source) {
            match packet {
                Ok(packet) => {
                    if tx.send(packet).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Input stream error: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Parse one command per line; bad lines are logged and skipped.
///
/// The source is opened on the reader thread: opening a FIFO blocks until a
/// writer connects.
fn spawn_command_reader(path: PathBuf) -> mpsc::Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let source = match File::open(&path) {
            Ok(file) => BufReader::new(file),
            Err(e) => {
                error!("Failed to open command source {}: {}", path.display(), e);
                return;
            }
        };
        for line in source.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("Command source error: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(&line) {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Malformed command {:?}: {}", line, e),
            }
        }
    });
    rx
}

fn drain_commands(engine: &mut Engine<FsStorage>, rx: &mpsc::Receiver<Command>) {
    loop {
        match rx.try_recv() {
            Ok(command) => match engine.execute(command) {
                Ok(CommandReply::FileInfo(info)) => match serde_json::to_string(&info) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("Failed to render file info: {}", e),
                },
                // Rejections are logged and counted by the engine.
                Ok(CommandReply::Ack) | Err(_) => {}
            },
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
}

fn cmd_validate(config: &EngineConfig, filter_path: &Path, dest_path: &Path) -> anyhow::Result<()> {
    let (filters, dests) = load_tables(config, filter_path, dest_path)?;

    println!(
        "Destination table {:?}: {} slots ({} enabled)",
        dests.description,
        dests.len(),
        dests.files.iter().filter(|d| d.enabled).count()
    );
    println!(
        "Filter table {:?}: {} message ids, {} active filters",
        filters.description(),
        filters.len(),
        filters
            .entries()
            .iter()
            .map(|e| e.active_filters().count())
            .sum::<usize>()
    );
    for (slot, def) in dests.files.iter().enumerate() {
        if def.enabled
            && !filters
                .entries()
                .iter()
                .any(|e| e.active_filters().any(|(_, f)| f.dest == slot))
        {
            warn!("Destination {} is enabled but no filter targets it", slot);
        }
    }
    println!("Tables are valid");
    Ok(())
}

fn cmd_gen_tables(output_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let dests = DestinationTable::new(
        "Sample destination table",
        vec![
            DestinationDefinition::new("/tmp/ds/events", "events")
                .extension(".dat")
                .size_limit(2 * 1024 * 1024)
                .age_limit(3600)
                .move_to("/tmp/ds/downlink"),
            DestinationDefinition::new("/tmp/ds/hk", "hk")
                .extension(".dat")
                .filename_mode(FilenameMode::Time)
                .size_limit(512 * 1024)
                .age_limit(600),
        ],
    );
    let filters = FilterTable::new(
        "Sample filter table",
        vec![
            PacketEntry::new(0x0801u32).filter(FilterDescriptor::by_count(0, 1, 1, 0)),
            PacketEntry::new(0x0802u32)
                .filter(FilterDescriptor::by_count(0, 1, 1, 0))
                .filter(FilterDescriptor::by_count(1, 1, 4, 0)),
            PacketEntry::new(0x0803u32).filter(FilterDescriptor::by_time(1, 1, 16, 0)),
        ],
    )?;

    let config = EngineConfig {
        state_file: Some(output_dir.join("ds_state.json")),
        filter_table: Some(output_dir.join("filter.toml")),
        dest_table: Some(output_dir.join("dest.toml")),
        ..EngineConfig::default()
    };

    let files = [
        ("ds.toml", toml::to_string_pretty(&config)?),
        ("dest.toml", dests.to_toml_string()?),
        ("filter.toml", filters.to_toml_string()?),
    ];
    for (name, content) in files {
        let path = output_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}
