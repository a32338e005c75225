// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ground command surface.
//!
//! Every command is validated before anything changes: a rejected command
//! leaves the engine exactly as it was. Accepted and rejected commands are
//! counted in housekeeping.
//!
//! Commands deserialize from JSON, one object per command:
//!
//! ```json
//! {"command": "set_dest_size", "dest": 2, "bytes": 65536}
//! {"command": "set_filter_parms", "message_id": 2049, "filter": 0, "n": 1, "x": 4, "o": 0}
//! {"command": "load_dest_table", "path": "/cf/ds/dest.toml"}
//! ```

use crate::dest_table::{DestinationDefinition, DestinationTable, FilenameMode};
use crate::durable::APP_ENABLE_STATE_KEY;
use crate::engine::{close_logged, over_limit, Engine, EntryCounters};
use crate::error::DsError;
use crate::filter::{FilterDescriptor, FilterKind};
use crate::filter_table::{check_descriptor, FilterTable, FILTERS_PER_PACKET};
use crate::housekeeping::{bump, FileInfo};
use crate::message::MessageId;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Engine command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Noop,
    ResetCounters,
    SetAppState {
        enabled: bool,
    },
    SetFilterFile {
        message_id: MessageId,
        filter: usize,
        dest: usize,
    },
    SetFilterType {
        message_id: MessageId,
        filter: usize,
        kind: FilterKind,
    },
    SetFilterParms {
        message_id: MessageId,
        filter: usize,
        n: u32,
        x: u32,
        #[serde(default)]
        o: u32,
    },
    SetDestType {
        dest: usize,
        mode: FilenameMode,
    },
    SetDestState {
        dest: usize,
        enabled: bool,
    },
    SetDestPath {
        dest: usize,
        path: String,
    },
    SetDestBase {
        dest: usize,
        basename: String,
    },
    SetDestExt {
        dest: usize,
        extension: String,
    },
    SetDestSize {
        dest: usize,
        bytes: u64,
    },
    SetDestAge {
        dest: usize,
        seconds: u64,
    },
    SetDestCount {
        dest: usize,
        sequence: u32,
    },
    CloseFile {
        dest: usize,
    },
    CloseAll,
    GetFileInfo,
    AddMessageId {
        message_id: MessageId,
    },
    RemoveMessageId {
        message_id: MessageId,
    },
    /// Replace the filter table from a TOML file.
    LoadFilterTable {
        path: PathBuf,
    },
    /// Replace the destination table from a TOML file.
    LoadDestTable {
        path: PathBuf,
    },
}

/// Result of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandReply {
    Ack,
    FileInfo(Vec<FileInfo>),
}

/// Whether a destination change renames future files.
#[derive(Clone, Copy, PartialEq, Eq)]
enum DestChange {
    Naming,
    Limits,
}

fn invalid(msg: impl Into<String>) -> DsError {
    DsError::InvalidCommand(msg.into())
}

impl<S: Storage> Engine<S> {
    /// Execute a command, counting it as accepted or rejected.
    pub fn execute(&mut self, command: Command) -> Result<CommandReply, DsError> {
        match self.apply(command) {
            Ok(reply) => {
                bump(&mut self.hk.cmd_accepted);
                Ok(reply)
            }
            Err(e) => {
                bump(&mut self.hk.cmd_rejected);
                warn!("command rejected: {}", e);
                Err(e)
            }
        }
    }

    fn apply(&mut self, command: Command) -> Result<CommandReply, DsError> {
        match command {
            Command::Noop => {
                info!("no-op command, version {}", env!("CARGO_PKG_VERSION"));
            }
            Command::ResetCounters => self.hk.reset(),
            Command::SetAppState { enabled } => self.set_app_state(enabled),

            Command::SetFilterFile {
                message_id,
                filter,
                dest,
            } => self.update_filter(message_id, filter, |d| {
                if d.is_unused() {
                    return Err(invalid(format!("filter {} is unused", filter)));
                }
                d.dest = dest;
                Ok(())
            })?,
            Command::SetFilterType {
                message_id,
                filter,
                kind,
            } => self.update_filter(message_id, filter, |d| {
                if kind == FilterKind::Unused {
                    *d = FilterDescriptor::UNUSED;
                } else {
                    d.kind = kind;
                }
                Ok(())
            })?,
            Command::SetFilterParms {
                message_id,
                filter,
                n,
                x,
                o,
            } => self.update_filter(message_id, filter, |d| {
                if d.is_unused() {
                    return Err(invalid(format!("filter {} is unused", filter)));
                }
                d.n = n;
                d.x = x;
                d.o = o;
                Ok(())
            })?,

            Command::SetDestType { dest, mode } => {
                self.update_dest(dest, DestChange::Naming, |d| d.filename_mode = mode)?
            }
            Command::SetDestState { dest, enabled } => {
                let change = if enabled {
                    DestChange::Limits
                } else {
                    DestChange::Naming
                };
                self.update_dest(dest, change, |d| d.enabled = enabled)?
            }
            Command::SetDestPath { dest, path } => {
                self.update_dest(dest, DestChange::Naming, |d| d.path = path)?
            }
            Command::SetDestBase { dest, basename } => {
                self.update_dest(dest, DestChange::Naming, |d| d.basename = basename)?
            }
            Command::SetDestExt { dest, extension } => {
                self.update_dest(dest, DestChange::Naming, |d| d.extension = extension)?
            }
            Command::SetDestSize { dest, bytes } => {
                self.update_dest(dest, DestChange::Limits, |d| d.size_limit = bytes)?
            }
            Command::SetDestAge { dest, seconds } => {
                self.update_dest(dest, DestChange::Limits, |d| d.age_limit = seconds)?
            }
            Command::SetDestCount { dest, sequence } => {
                if sequence == 0 {
                    return Err(invalid("sequence count must be at least 1"));
                }
                self.update_dest(dest, DestChange::Limits, |d| d.sequence_count = sequence)?;
                if let Some(slot) = self.slots.get_mut(dest) {
                    slot.reset_sequence(sequence);
                }
            }

            Command::CloseFile { dest } => {
                self.close_file(dest)?;
            }
            Command::CloseAll => self.close_all(),
            Command::GetFileInfo => return Ok(CommandReply::FileInfo(self.file_info())),

            Command::AddMessageId { message_id } => {
                self.filters
                    .add(message_id)
                    .map_err(|e| invalid(e.to_string()))?;
                self.counters.push(EntryCounters::default());
                info!(message_id = %message_id, "filter table entry added");
            }
            Command::RemoveMessageId { message_id } => {
                let position = self
                    .filters
                    .remove(message_id)
                    .ok_or_else(|| invalid(format!("message id {} not in table", message_id)))?;
                if position < self.counters.len() {
                    self.counters.remove(position);
                }
                info!(message_id = %message_id, "filter table entry removed");
            }

            Command::LoadFilterTable { path } => {
                let table = FilterTable::from_file(&path)
                    .map_err(|e| self.reject_filter_table(e))?;
                self.load_filter_table(table)?;
                info!(path = %path.display(), "filter table reloaded");
            }
            Command::LoadDestTable { path } => {
                let table = DestinationTable::from_file(&path)
                    .map_err(|e| self.reject_dest_table(e))?;
                self.load_destination_table(table)?;
                info!(path = %path.display(), "destination table reloaded");
            }
        }
        Ok(CommandReply::Ack)
    }

    fn set_app_state(&mut self, enabled: bool) {
        self.app_enabled = enabled;
        info!(enabled, "packet processing state changed");

        if !self.config.persist_enable_state {
            return;
        }
        if let Some(store) = self.store.as_mut() {
            let value = if enabled { "true" } else { "false" };
            if let Err(e) = store.save(APP_ENABLE_STATE_KEY, value) {
                warn!("failed to persist processing state: {}", e);
            }
        }
    }

    /// Edit one descriptor on a copy, validate it, then store it.
    fn update_filter(
        &mut self,
        message_id: MessageId,
        filter: usize,
        edit: impl FnOnce(&mut FilterDescriptor) -> Result<(), DsError>,
    ) -> Result<(), DsError> {
        let entry = self
            .filters
            .lookup(message_id)
            .ok_or_else(|| invalid(format!("message id {} not in table", message_id)))?;
        if filter >= FILTERS_PER_PACKET {
            return Err(invalid(format!(
                "filter index {} out of range (max {})",
                filter,
                FILTERS_PER_PACKET - 1
            )));
        }

        let mut descriptor = self
            .filters
            .entries()
            .get(entry)
            .map(|e| e.filters[filter])
            .ok_or_else(|| invalid(format!("message id {} not in table", message_id)))?;
        edit(&mut descriptor)?;
        if !descriptor.is_unused() {
            check_descriptor(message_id, filter, &descriptor, self.dests.len())
                .map_err(|e| invalid(e.to_string()))?;
        }

        self.filters.set_filter(entry, filter, descriptor);
        info!(message_id = %message_id, filter, "filter updated");
        Ok(())
    }

    /// Edit one destination definition on a copy, validate it, then store it.
    ///
    /// Naming changes close the open file first so no file mixes two
    /// definitions. So does a size limit the open file already exceeds.
    fn update_dest(
        &mut self,
        dest: usize,
        change: DestChange,
        edit: impl FnOnce(&mut DestinationDefinition),
    ) -> Result<(), DsError> {
        let mut def = self
            .dests
            .files
            .get(dest)
            .cloned()
            .ok_or_else(|| {
                invalid(format!(
                    "destination {} out of range ({} slots)",
                    dest,
                    self.dests.len()
                ))
            })?;
        edit(&mut def);
        def.validate(dest, self.ctx.sequence.max)
            .map_err(|e| invalid(e.to_string()))?;

        let Self {
            ctx,
            dests,
            slots,
            storage,
            hk,
            ..
        } = self;
        if let (Some(slot), Some(old)) = (slots.get_mut(dest), dests.files.get(dest)) {
            if change == DestChange::Naming || over_limit(slot, &def) {
                close_logged(slot, dest, old, ctx, storage, hk);
            }
        }
        if let Some(slot_def) = dests.files.get_mut(dest) {
            *slot_def = def;
        }
        info!(slot = dest, "destination updated");
        Ok(())
    }
}
