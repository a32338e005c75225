// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DS Recording Engine
//!
//! Onboard telemetry storage: selects packets with "N of every X, offset O"
//! filters and records them to size- and age-limited destination files.
//!
//! # Quick Start
//!
//! ```bash
//! # Write sample tables
//! ds-record gen-tables --output-dir /tmp/ds
//!
//! # Check tables before uplink
//! ds-record validate --filter-table /tmp/ds/filter.toml --dest-table /tmp/ds/dest.toml
//!
//! # Record a CCSDS packet stream
//! ds-record run --filter-table /tmp/ds/filter.toml --dest-table /tmp/ds/dest.toml --input tlm.bin
//! ```
//!
//! # Library
//!
//! ```no_run
//! use ds_recorder::{DestinationTable, Engine, EngineConfig, FilterTable, FsStorage};
//!
//! # fn main() -> Result<(), ds_recorder::DsError> {
//! let mut engine = Engine::new(EngineConfig::default(), FsStorage::new())?;
//! engine.load_tables(
//!     FilterTable::from_file("filter.toml")?,
//!     DestinationTable::from_file("dest.toml")?,
//! )?;
//!
//! engine.on_message(0x0801u32, &[0u8; 64]);
//! let report = engine.housekeeping_tick();
//! println!("{} packets written", report.counters.file_writes);
//! # Ok(())
//! # }
//! ```
//!
//! # Filename Modes
//!
//! | Mode | Example |
//! |------|---------|
//! | sequence | `/ram/ds/events_00000042.dat` |
//! | time | `/ram/ds/events_2026291143022.dat` |

pub mod command;
pub mod config;
pub mod dest_table;
pub mod destination;
pub mod durable;
pub mod engine;
pub mod error;
pub mod feed;
pub mod filename;
pub mod filter;
pub mod filter_table;
pub mod format;
pub mod housekeeping;
pub mod message;
pub mod storage;

pub use command::{Command, CommandReply};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use dest_table::{DestinationDefinition, DestinationTable, FilenameMode};
pub use destination::SlotState;
pub use durable::{DurableStore, JsonFileStore, MemoryStore};
pub use engine::Engine;
pub use error::{ConfigError, DsError};
pub use feed::{PacketReader, RawPacket};
pub use filter::{FilterCounter, FilterDescriptor, FilterKind};
pub use filter_table::{FilterTable, PacketEntry};
pub use format::HeaderKind;
pub use housekeeping::{Counters, FileInfo, HousekeepingReport};
pub use message::{MessageId, Packet, PacketTime};
pub use storage::{FsStorage, MemoryStorage, Storage};
