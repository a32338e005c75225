// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Destination file state machine.
//!
//! ```text
//!            enable                 passing packet
//! Disabled ---------> Closed ------------------------> Open
//!    ^                  ^  <------ close / age ------   |  |
//!    |                  |                               |  | size + len > limit
//!    +---- disable -----+------- disable (close) -------+  v
//!                                                   Closed -> Open (rollover)
//! ```
//!
//! Size is checked before every write: a packet that would push the file
//! past its limit goes into a fresh file, so no file exceeds its limit and
//! no packet straddles two files.

use crate::dest_table::{DestinationDefinition, FilenameMode};
use crate::error::DsError;
use crate::filename::{allocate_sequence_name, build_path, time_discriminator, SequencePolicy};
use crate::format::{HeaderIds, HeaderKind};
use crate::housekeeping::{bump, Counters, FileInfo};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Settings shared by every slot.
#[derive(Debug, Clone, Copy)]
pub struct FileContext {
    pub header: HeaderKind,
    pub ids: HeaderIds,
    pub sequence: SequencePolicy,
    pub move_files: bool,
}

/// Observable slot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Disabled,
    Closed,
    Open,
}

/// File currently open on a slot.
#[derive(Debug)]
struct OpenFile<H> {
    handle: H,
    path: PathBuf,
    size: u64,
    opened_at: DateTime<Utc>,
    packets: u64,
}

/// Runtime state of one destination slot.
#[derive(Debug)]
pub struct Slot<H> {
    index: usize,
    open: Option<OpenFile<H>>,
    sequence: u32,
    exhausted: bool,
    last_path: Option<PathBuf>,
    cycle_bytes: u64,
    rate: u64,
}

impl<H> Slot<H> {
    /// Closed slot whose next file uses `sequence`.
    pub fn new(index: usize, sequence: u32) -> Self {
        Self {
            index,
            open: None,
            sequence,
            exhausted: false,
            last_path: None,
            cycle_bytes: 0,
            rate: 0,
        }
    }

    /// Current state under `def`.
    pub fn state(&self, def: &DestinationDefinition) -> SlotState {
        if !def.enabled {
            SlotState::Disabled
        } else if self.open.is_some() {
            SlotState::Open
        } else {
            SlotState::Closed
        }
    }

    /// Check if a file is open.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Size of the open file, header included.
    pub fn size(&self) -> Option<u64> {
        self.open.as_ref().map(|f| f.size)
    }

    /// Path of the open file.
    pub fn path(&self) -> Option<&Path> {
        self.open.as_ref().map(|f| f.path.as_path())
    }

    /// Sequence number the next sequence-mode file starts searching from.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Check if the sequence space ran out.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Set the next sequence number and clear exhaustion.
    pub fn reset_sequence(&mut self, sequence: u32) {
        self.sequence = sequence;
        self.exhausted = false;
    }

    /// Seconds the open file has existed at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Option<u64> {
        self.open
            .as_ref()
            .map(|f| (now - f.opened_at).num_seconds().max(0) as u64)
    }

    /// Check if the open file reached its age limit at `now`.
    pub fn age_expired(&self, def: &DestinationDefinition, now: DateTime<Utc>) -> bool {
        def.enabled && self.age(now).is_some_and(|age| age >= def.age_limit)
    }

    /// Close the housekeeping cycle: compute the data rate over `secs`.
    pub fn end_cycle(&mut self, secs: u64) {
        self.rate = self.cycle_bytes / secs.max(1);
        self.cycle_bytes = 0;
    }

    /// Status snapshot.
    pub fn info(&self, def: &DestinationDefinition, now: DateTime<Utc>) -> FileInfo {
        let filename = self
            .open
            .as_ref()
            .map(|f| &f.path)
            .or(self.last_path.as_ref())
            .map(|p| p.display().to_string());

        FileInfo {
            slot: self.index,
            enabled: def.enabled,
            open: self.is_open(),
            age_secs: self.age(now).unwrap_or(0),
            size: self.size().unwrap_or(0),
            rate: self.rate,
            sequence: self.sequence,
            exhausted: self.exhausted,
            filename,
        }
    }

    /// Write one packet, opening or rolling over the file as needed.
    ///
    /// Returns `Ok(false)` when the slot is disabled. On a failed write the
    /// file is closed and the packet is lost for this slot only.
    pub fn write<S>(
        &mut self,
        def: &DestinationDefinition,
        ctx: &FileContext,
        storage: &mut S,
        counters: &mut Counters,
        bytes: &[u8],
    ) -> Result<bool, DsError>
    where
        S: Storage<Handle = H>,
    {
        if !def.enabled {
            tracing::debug!(slot = self.index, "destination disabled, packet skipped");
            return Ok(false);
        }

        let len = bytes.len() as u64;
        if ctx.header.size() + len > def.size_limit {
            return Err(DsError::MessageTooLarge {
                slot: self.index,
                len: bytes.len(),
                limit: def.size_limit,
            });
        }

        if let Some(file) = &self.open {
            if file.size + len > def.size_limit {
                tracing::debug!(
                    slot = self.index,
                    size = file.size,
                    len,
                    limit = def.size_limit,
                    "size limit reached, rolling over"
                );
                self.close(def, ctx, storage, counters)?;
            }
        }

        if self.open.is_none() {
            self.open(def, ctx, storage)?;
        }

        let Some(file) = self.open.as_mut() else {
            return Ok(false);
        };
        match storage.write(&mut file.handle, bytes) {
            Ok(written) => {
                file.size += written as u64;
                file.packets += 1;
                self.cycle_bytes += written as u64;
                Ok(true)
            }
            Err(source) => {
                let path = file.path.clone();
                if let Err(close_err) = self.close(def, ctx, storage, counters) {
                    tracing::warn!(slot = self.index, "close after write failure: {}", close_err);
                }
                Err(DsError::io(path, source))
            }
        }
    }

    /// Create the next file and write its header.
    fn open<S>(
        &mut self,
        def: &DestinationDefinition,
        ctx: &FileContext,
        storage: &mut S,
    ) -> Result<(), DsError>
    where
        S: Storage<Handle = H>,
    {
        if self.exhausted {
            return Err(DsError::SequenceExhausted { slot: self.index });
        }

        let now = storage.now();
        let (path, used_sequence) = match def.filename_mode {
            FilenameMode::Sequence => {
                match allocate_sequence_name(def, self.sequence, &ctx.sequence, |p| {
                    storage.exists(p)
                }) {
                    Some((path, sequence)) => (path, Some(sequence)),
                    None => {
                        self.exhausted = true;
                        tracing::error!(slot = self.index, "sequence numbers exhausted");
                        return Err(DsError::SequenceExhausted { slot: self.index });
                    }
                }
            }
            FilenameMode::Time => {
                let path = build_path(def, &time_discriminator(now));
                if storage.exists(&path) {
                    return Err(DsError::NameCollision {
                        slot: self.index,
                        path,
                    });
                }
                (path, None)
            }
        };

        let mut handle = storage
            .create(&path)
            .map_err(|e| DsError::io(path.clone(), e))?;

        let header = ctx
            .header
            .encode(ctx.ids, now, self.index, def.filename_mode, &path);
        if !header.is_empty() {
            if let Err(e) = storage.write(&mut handle, &header) {
                if let Err(close_err) = storage.close(handle) {
                    tracing::warn!(slot = self.index, "close after header failure: {}", close_err);
                }
                return Err(DsError::io(path, e));
            }
        }

        if let Some(sequence) = used_sequence {
            self.sequence = ctx.sequence.next(sequence);
        }

        tracing::info!(slot = self.index, path = %path.display(), "opened destination file");
        self.open = Some(OpenFile {
            handle,
            path,
            size: header.len() as u64,
            opened_at: now,
            packets: 0,
        });
        Ok(())
    }

    /// Close the open file, stamp its close time and move it if configured.
    ///
    /// Closing a closed slot does nothing. The slot is closed even when an
    /// error is returned. Returns the final location of the file.
    pub fn close<S>(
        &mut self,
        def: &DestinationDefinition,
        ctx: &FileContext,
        storage: &mut S,
        counters: &mut Counters,
    ) -> Result<Option<PathBuf>, DsError>
    where
        S: Storage<Handle = H>,
    {
        let Some(mut file) = self.open.take() else {
            return Ok(None);
        };

        if let Some((offset, bytes)) = ctx.header.close_update(storage.now()) {
            match storage.write_at(&mut file.handle, offset, &bytes) {
                Ok(()) => bump(&mut counters.file_updates),
                Err(e) => {
                    bump(&mut counters.file_update_errors);
                    tracing::warn!(
                        slot = self.index,
                        path = %file.path.display(),
                        "header update failed: {}",
                        e
                    );
                }
            }
        }

        self.last_path = Some(file.path.clone());
        storage
            .close(file.handle)
            .map_err(|e| DsError::io(file.path.clone(), e))?;
        tracing::info!(
            slot = self.index,
            path = %file.path.display(),
            size = file.size,
            packets = file.packets,
            "closed destination file"
        );

        let Some(dir) = def.move_directory.as_deref().filter(|_| ctx.move_files) else {
            return Ok(Some(file.path));
        };
        match storage.move_file(&file.path, Path::new(dir)) {
            Ok(moved) => {
                bump(&mut counters.file_moves);
                tracing::info!(slot = self.index, to = %moved.display(), "moved destination file");
                self.last_path = Some(moved.clone());
                Ok(Some(moved))
            }
            Err(e) => {
                bump(&mut counters.file_move_errors);
                tracing::warn!(
                    slot = self.index,
                    path = %file.path.display(),
                    dir,
                    "move failed, file left in place: {}",
                    e
                );
                Ok(Some(file.path))
            }
        }
    }
}
