// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Recording engine
//!
//! Routes each inbound packet through its filter descriptors and writes the
//! survivors to destination files.
//!
//! # Architecture
//!
//! ```text
//! packet --> FilterTable lookup --> evaluate descriptors --> Slot::write --> Storage
//!                                          |                     |
//!                                   FilterCounter           open / roll / close
//! ```
//!
//! The engine is single-threaded: one packet is handled to completion before
//! the next, and the housekeeping tick runs between packets. Table reloads and
//! commands take effect between dispatches.

use crate::config::EngineConfig;
use crate::dest_table::{DestinationDefinition, DestinationTable};
use crate::destination::{FileContext, Slot};
use crate::durable::{DurableStore, APP_ENABLE_STATE_KEY};
use crate::error::{ConfigError, DsError};
use crate::filter::{evaluate, FilterCounter};
use crate::filter_table::{FilterTable, FILTERS_PER_PACKET};
use crate::housekeeping::{bump, Counters, FileInfo, HousekeepingReport};
use crate::message::{MessageId, Packet};
use crate::storage::Storage;
use std::path::PathBuf;
use tracing::{debug, error, info, trace, warn};

pub(crate) type EntryCounters = [FilterCounter; FILTERS_PER_PACKET];

/// Data storage recording engine.
pub struct Engine<S: Storage> {
    pub(crate) config: EngineConfig,
    pub(crate) ctx: FileContext,
    pub(crate) filters: FilterTable,
    pub(crate) counters: Vec<EntryCounters>,
    pub(crate) dests: DestinationTable,
    pub(crate) slots: Vec<Slot<S::Handle>>,
    pub(crate) storage: S,
    pub(crate) store: Option<Box<dyn DurableStore>>,
    pub(crate) app_enabled: bool,
    pub(crate) hk: Counters,
}

impl<S: Storage> Engine<S> {
    /// Create an engine with empty tables.
    pub fn new(config: EngineConfig, storage: S) -> Result<Self, DsError> {
        config.validate()?;

        let ctx = FileContext {
            header: config.header,
            ids: config.header_ids(),
            sequence: config.sequence_policy(),
            move_files: config.move_files,
        };
        let app_enabled = config.default_enable_state;

        Ok(Self {
            config,
            ctx,
            filters: FilterTable::default(),
            counters: Vec::new(),
            dests: DestinationTable::default(),
            slots: Vec::new(),
            storage,
            store: None,
            app_enabled,
            hk: Counters::default(),
        })
    }

    /// Attach a durable store and restore the processing state from it.
    ///
    /// A missing or unreadable value leaves the configured default in place.
    pub fn with_store(mut self, store: impl DurableStore + 'static) -> Self {
        if self.config.persist_enable_state {
            match store.load(APP_ENABLE_STATE_KEY) {
                Ok(Some(value)) => match value.parse::<bool>() {
                    Ok(enabled) => {
                        info!(enabled, "restored packet processing state");
                        self.app_enabled = enabled;
                    }
                    Err(_) => warn!("ignoring stored processing state {:?}", value),
                },
                Ok(None) => debug!("no stored processing state"),
                Err(e) => warn!("failed to read processing state: {}", e),
            }
        }
        self.store = Some(Box::new(store));
        self
    }

    /// Load both tables at once.
    ///
    /// The filter table is checked against the new destination table. If
    /// either is rejected, neither is adopted.
    pub fn load_tables(
        &mut self,
        filters: FilterTable,
        dests: DestinationTable,
    ) -> Result<(), DsError> {
        if let Err(e) = dests.validate(self.ctx.sequence.max) {
            return Err(self.reject_dest_table(e));
        }
        if let Err(e) = filters.validate(dests.len()) {
            return Err(self.reject_filter_table(e));
        }

        self.adopt_dest_table(dests);
        self.adopt_filter_table(filters);
        Ok(())
    }

    /// Replace the filter table. Descriptor counters restart at zero.
    pub fn load_filter_table(&mut self, table: FilterTable) -> Result<(), DsError> {
        if let Err(e) = table.validate(self.dests.len()) {
            return Err(self.reject_filter_table(e));
        }
        self.adopt_filter_table(table);
        Ok(())
    }

    /// Replace the destination table.
    ///
    /// Slots whose naming is unchanged keep their open file and sequence,
    /// unless the file is already larger than the new size limit. Slots that
    /// are renamed, disabled or removed are closed first.
    pub fn load_destination_table(&mut self, table: DestinationTable) -> Result<(), DsError> {
        if let Err(e) = table.validate(self.ctx.sequence.max) {
            return Err(self.reject_dest_table(e));
        }
        if let Err(e) = self.filters.validate(table.len()) {
            return Err(self.reject_dest_table(e));
        }
        self.adopt_dest_table(table);
        Ok(())
    }

    pub(crate) fn reject_filter_table(&mut self, e: ConfigError) -> DsError {
        bump(&mut self.hk.filter_table_errors);
        error!("filter table rejected: {}", e);
        e.into()
    }

    pub(crate) fn reject_dest_table(&mut self, e: ConfigError) -> DsError {
        bump(&mut self.hk.dest_table_errors);
        error!("destination table rejected: {}", e);
        e.into()
    }

    fn adopt_filter_table(&mut self, table: FilterTable) {
        self.counters = vec![EntryCounters::default(); table.len()];
        info!(
            entries = table.len(),
            "loaded filter table {:?}",
            table.description()
        );
        self.filters = table;
        bump(&mut self.hk.filter_table_loads);
    }

    fn adopt_dest_table(&mut self, table: DestinationTable) {
        let Self {
            ctx,
            dests,
            slots,
            storage,
            hk,
            ..
        } = self;
        let policy = ctx.sequence;

        // Slots past the end of the new table go away.
        while slots.len() > table.len() {
            let index = slots.len() - 1;
            if let (Some(mut slot), Some(old)) = (slots.pop(), dests.files.get(index)) {
                close_logged(&mut slot, index, old, ctx, storage, hk);
            }
        }

        for (index, new) in table.files.iter().enumerate() {
            let Some(old) = dests.files.get(index).filter(|_| index < slots.len()) else {
                slots.push(Slot::new(index, policy.normalize(new.sequence_count)));
                continue;
            };
            let slot = &mut slots[index];
            if !old.same_identity(new) {
                close_logged(slot, index, old, ctx, storage, hk);
                slot.reset_sequence(policy.normalize(new.sequence_count));
            } else if !new.enabled || over_limit(slot, new) {
                close_logged(slot, index, old, ctx, storage, hk);
            }
        }

        info!(
            slots = table.len(),
            "loaded destination table {:?}", table.description
        );
        *dests = table;
        bump(&mut hk.dest_table_loads);
    }

    /// Dispatch one message without a timestamp.
    pub fn on_message(&mut self, message_id: impl Into<MessageId>, payload: &[u8]) {
        self.on_packet(&Packet::new(message_id, payload));
    }

    /// Dispatch one packet.
    pub fn on_packet(&mut self, packet: &Packet<'_>) {
        if !self.app_enabled {
            bump(&mut self.hk.disabled_packets);
            return;
        }

        let Some(entry) = self.filters.lookup(packet.message_id) else {
            bump(&mut self.hk.ignored_packets);
            trace!(message_id = %packet.message_id, "no filter entry");
            return;
        };

        let Self {
            ctx,
            filters,
            counters,
            dests,
            slots,
            storage,
            hk,
            ..
        } = self;

        let Some((descriptors, entry_counters)) = filters
            .entries()
            .get(entry)
            .zip(counters.get_mut(entry))
        else {
            return;
        };

        for (i, descriptor) in descriptors.active_filters() {
            if !evaluate(descriptor, &mut entry_counters[i], packet.time) {
                bump(&mut hk.filtered_packets);
                continue;
            }
            bump(&mut hk.passed_packets);

            let (Some(slot), Some(def)) =
                (slots.get_mut(descriptor.dest), dests.files.get(descriptor.dest))
            else {
                continue;
            };
            match slot.write(def, ctx, storage, hk, packet.payload) {
                Ok(true) => bump(&mut hk.file_writes),
                Ok(false) => {}
                Err(e) => {
                    bump(&mut hk.file_write_errors);
                    warn!(
                        slot = descriptor.dest,
                        message_id = %packet.message_id,
                        "packet not stored: {}",
                        e
                    );
                }
            }
        }
    }

    /// Housekeeping tick: close aged files, compute rates and report.
    pub fn housekeeping_tick(&mut self) -> HousekeepingReport {
        let now = self.storage.now();
        let secs = self.config.secs_per_hk_cycle;
        let Self {
            ctx,
            dests,
            slots,
            storage,
            hk,
            ..
        } = self;

        for (index, (slot, def)) in slots.iter_mut().zip(&dests.files).enumerate() {
            if slot.age_expired(def, now) {
                debug!(slot = index, limit = def.age_limit, "age limit reached");
                close_logged(slot, index, def, ctx, storage, hk);
            }
            slot.end_cycle(secs);
        }

        self.report()
    }

    /// Current housekeeping report.
    pub fn report(&self) -> HousekeepingReport {
        HousekeepingReport {
            counters: self.hk.clone(),
            app_enabled: self.app_enabled,
            filter_table: self.filters.description().to_string(),
            dest_table: self.dests.description.clone(),
            open_files: self.slots.iter().filter(|s| s.is_open()).count(),
        }
    }

    /// Close the file open on `dest`. Returns its final location.
    pub fn close_file(&mut self, dest: usize) -> Result<Option<PathBuf>, DsError> {
        let Self {
            ctx,
            dests,
            slots,
            storage,
            hk,
            ..
        } = self;
        let (Some(slot), Some(def)) = (slots.get_mut(dest), dests.files.get(dest)) else {
            return Err(DsError::InvalidCommand(format!(
                "destination {} out of range ({} slots)",
                dest,
                dests.len()
            )));
        };
        slot.close(def, ctx, storage, hk)
    }

    /// Close every open file. Failures are logged and do not stop the sweep.
    pub fn close_all(&mut self) {
        let Self {
            ctx,
            dests,
            slots,
            storage,
            hk,
            ..
        } = self;
        for (index, (slot, def)) in slots.iter_mut().zip(&dests.files).enumerate() {
            close_logged(slot, index, def, ctx, storage, hk);
        }
    }

    /// Close everything and return the final report.
    pub fn shutdown(mut self) -> HousekeepingReport {
        self.close_all();
        info!("recording engine stopped");
        self.report()
    }

    /// File status of every slot.
    pub fn file_info(&self) -> Vec<FileInfo> {
        let now = self.storage.now();
        self.slots
            .iter()
            .zip(&self.dests.files)
            .map(|(slot, def)| slot.info(def, now))
            .collect()
    }

    /// Check if packet processing is enabled.
    pub fn is_enabled(&self) -> bool {
        self.app_enabled
    }

    pub fn counters(&self) -> &Counters {
        &self.hk
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn filter_table(&self) -> &FilterTable {
        &self.filters
    }

    pub fn dest_table(&self) -> &DestinationTable {
        &self.dests
    }

    /// Evaluation counters of one filter table entry.
    pub fn filter_counters(
        &self,
        message_id: impl Into<MessageId>,
    ) -> Option<[u32; FILTERS_PER_PACKET]> {
        let entry = self.filters.lookup(message_id.into())?;
        self.counters
            .get(entry)
            .map(|c| [c[0].count(), c[1].count(), c[2].count(), c[3].count()])
    }

    /// Runtime state of one slot.
    pub fn slot(&self, dest: usize) -> Option<&Slot<S::Handle>> {
        self.slots.get(dest)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}

/// Whether the open file is already past the definition's size limit.
pub(crate) fn over_limit<H>(slot: &Slot<H>, def: &DestinationDefinition) -> bool {
    matches!(slot.size(), Some(size) if size > def.size_limit)
}

/// Close a slot, logging instead of returning the error.
pub(crate) fn close_logged<S: Storage>(
    slot: &mut Slot<S::Handle>,
    index: usize,
    def: &DestinationDefinition,
    ctx: &FileContext,
    storage: &mut S,
    hk: &mut Counters,
) {
    if let Err(e) = slot.close(def, ctx, storage, hk) {
        warn!(slot = index, "close failed: {}", e);
    }
}
