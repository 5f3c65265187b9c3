//! History engine: records commands, drives undo/redo, bounds memory.
//!
//! # Overview
//!
//! [`HistoryEngine`] composes the timeline, the snapshot store, and the
//! memory accountant behind one orchestrating surface:
//!
//! - **Recording**: [`execute_command`](HistoryEngine::execute_command)
//!   executes a command, then appends it, folds it into an open group, or
//!   coalesces it into the previous entry via the merge capability.
//! - **Undo/redo**: cursor movement with validity checks; a failed undo
//!   is recovered by restoring the nearest snapshot and replaying the
//!   entries after it.
//! - **Budgeting**: after every recorded command the engine snapshots the
//!   surface at the configured interval and evicts the oldest entries
//!   when the count or byte ceilings are exceeded.
//! - **Events**: lifecycle notifications go to subscribed callbacks,
//!   fire-and-forget.
//!
//! One engine instance owns its timeline, snapshot store, and accounting
//! exclusively; they are never shared across engines. All mutating
//! operations take `&mut self`, so overlapping `execute_command` /
//! `undo` / `redo` cannot be expressed — callers queue at their own
//! event loop.
//!
//! # Example
//!
//! ```ignore
//! let mut engine = HistoryEngine::default();
//!
//! // A tool constructs a command and records it.
//! engine.execute_command(Box::new(fill), &mut surface)?;
//!
//! // Rapid slider drags coalesce through the merge capability;
//! // multi-step edits group explicitly:
//! engine.start_grouping("Rotate and crop");
//! engine.execute_command(Box::new(rotate), &mut surface)?;
//! engine.execute_command(Box::new(crop), &mut surface)?;
//! engine.end_grouping();
//!
//! engine.undo(&mut surface); // reverses crop, then rotate
//! ```

use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::command::{Command, CommandError, CommandIdGenerator, SerializedCommand};
use crate::composite::CompositeCommand;
use crate::memory::MemoryAccountant;
use crate::snapshot::{self, Snapshot, SnapshotStore};
use crate::surface::{Surface, SurfaceError};
use crate::timeline::Timeline;

/// Engine configuration, consumed at construction.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Maximum number of retained entries (default 50).
    pub max_history_size: usize,
    /// Byte ceiling over retained commands plus snapshots
    /// (default 100 MiB).
    pub max_memory_usage: usize,
    /// Whether [`start_grouping`](HistoryEngine::start_grouping) opens
    /// composite groups (default `true`).
    pub enable_grouping: bool,
    /// Whether cleanup runs after every recorded command (default
    /// `true`).
    pub auto_cleanup: bool,
    /// Snapshot the surface whenever the cursor lands on a multiple of
    /// this interval (default 10). Zero disables periodic snapshots.
    pub snapshot_interval: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_size: 50,
            max_memory_usage: 100 * 1024 * 1024,
            enable_grouping: true,
            auto_cleanup: true,
            snapshot_interval: 10,
        }
    }
}

/// Lifecycle events emitted to subscribed listeners.
///
/// Payload references are only valid for the duration of the callback.
pub enum HistoryEvent<'a> {
    /// A command (or a committed group) was recorded.
    Command {
        /// The recorded entry. For a merge this is the merged command.
        command: &'a dyn Command,
    },
    /// An entry was undone.
    Undo {
        /// The entry that was undone.
        command: &'a dyn Command,
    },
    /// An entry was re-executed.
    Redo {
        /// The entry that was re-executed.
        command: &'a dyn Command,
    },
    /// The whole history was reset.
    Clear,
    /// A snapshot was captured and stored.
    Snapshot {
        /// The stored snapshot.
        snapshot: &'a Snapshot,
    },
}

/// Event callback function type.
pub type HistoryEventCallback = Box<dyn FnMut(&HistoryEvent<'_>) + Send>;

/// Serializable inspection view of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryState {
    /// Descriptive records for every retained entry, in timeline order.
    pub commands: Vec<SerializedCommand>,
    /// Cursor position; `None` when nothing is done.
    pub current_index: Option<usize>,
    /// Accounted bytes over retained commands plus snapshots.
    pub memory_usage: usize,
    /// Configured byte ceiling.
    pub max_memory_usage: usize,
    /// Configured entry-count ceiling.
    pub max_history_size: usize,
}

/// Errors surfaced by [`HistoryEngine::execute_command`].
///
/// Undo and redo failures are deliberately *not* errors: they report
/// `false` and leave the cursor consistent.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Executing the command failed; nothing was recorded.
    #[error("executing '{name}' failed: {source}")]
    Execution {
        /// Label of the failing command.
        name: String,
        /// The underlying command error.
        #[source]
        source: CommandError,
    },
    /// Both snapshot capture paths failed.
    #[error("snapshot capture failed: {0}")]
    Snapshot(#[from] SurfaceError),
}

/// Orchestrator for reversible edits against one surface.
pub struct HistoryEngine {
    timeline: Timeline,
    snapshots: SnapshotStore,
    memory: MemoryAccountant,
    config: HistoryConfig,
    open_group: Option<CompositeCommand>,
    callbacks: Vec<HistoryEventCallback>,
    /// Identifier source for the composites this engine creates.
    ids: CommandIdGenerator,
    /// Reference point for serialized timestamps.
    epoch: Instant,
}

impl Default for HistoryEngine {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl HistoryEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            timeline: Timeline::new(),
            snapshots: SnapshotStore::new(),
            memory: MemoryAccountant::new(),
            config,
            open_group: None,
            callbacks: Vec::new(),
            ids: CommandIdGenerator::new(),
            epoch: Instant::now(),
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&HistoryEvent<'_>) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Execute `command` against `surface` and record it.
    ///
    /// The command lands in the open group if one exists, merges into the
    /// previous entry when both sides agree via the merge capability, and
    /// is appended as its own entry otherwise. Recording a command after
    /// undos discards the redoable entries (branch-overwrite). After
    /// recording, a snapshot is taken if due and cleanup runs when
    /// enabled.
    ///
    /// A failed `execute` propagates and records nothing.
    pub fn execute_command(
        &mut self,
        mut command: Box<dyn Command>,
        surface: &mut dyn Surface,
    ) -> Result<(), HistoryError> {
        if self.open_group.is_some() {
            command
                .execute(surface)
                .map_err(|source| Self::execution_error(command.as_ref(), source))?;
            tracing::debug!(id = %command.id(), name = command.name(), "command appended to open group");
            let group = self.open_group.as_mut().expect("group is open");
            group.add_command(command);

            let group = self.open_group.as_ref().expect("group is open");
            let child = group.commands().last().expect("just appended");
            Self::emit(
                &mut self.callbacks,
                HistoryEvent::Command {
                    command: child.as_ref(),
                },
            );
            return Ok(());
        }

        self.discard_redoable();

        command
            .execute(surface)
            .map_err(|source| Self::execution_error(command.as_ref(), source))?;

        let merged = match self.timeline.current_entry() {
            Some(entry) if entry.can_merge_with(command.as_ref()) => {
                entry.merge_with(command.as_ref())
            }
            _ => None,
        };

        if let Some(merged) = merged {
            tracing::debug!(
                id = %command.id(),
                into = %merged.id(),
                "command coalesced into previous entry"
            );
            let merged_footprint = merged.memory_footprint();
            let old = self
                .timeline
                .replace_current(merged)
                .expect("merge candidate exists");
            self.memory.remove(old.memory_footprint());
            self.memory.add(merged_footprint);
            // A snapshot anchored at this index captured the pre-merge
            // state; drop it so recovery never replays from it. It is
            // re-taken below if the index is on the grid.
            if let Some(index) = self.timeline.current()
                && let Some(stale) = self.snapshots.remove(index)
            {
                self.memory.remove(stale.memory_usage);
            }
        } else {
            self.memory.add(command.memory_footprint());
            tracing::debug!(
                id = %command.id(),
                name = command.name(),
                depth = self.timeline.undo_depth() + 1,
                "command recorded"
            );
            self.timeline.push(command);
        }

        self.snapshot_if_due(surface)?;
        if self.config.auto_cleanup {
            self.cleanup();
        }

        if let Some(entry) = self.timeline.current_entry() {
            Self::emit(&mut self.callbacks, HistoryEvent::Command { command: entry });
        }
        Ok(())
    }

    /// Undo the entry under the cursor.
    ///
    /// Returns `false` when there is nothing to undo, the entry is no
    /// longer valid, or the undo itself failed. A failed undo is
    /// recovered by restoring the nearest snapshot at or before the
    /// cursor and replaying the entries after it; the cursor is not
    /// moved in any failure case.
    pub fn undo(&mut self, surface: &mut dyn Surface) -> bool {
        if self.open_group.is_some() {
            tracing::warn!("open group committed before undo");
            self.end_grouping();
        }

        let Some(index) = self.timeline.current() else {
            return false;
        };
        if !self.timeline.entry(index).expect("cursor in range").is_valid() {
            tracing::debug!(index, "undo refused: entry is no longer valid");
            return false;
        }

        let result = self
            .timeline
            .entry_mut(index)
            .expect("cursor in range")
            .undo(surface);
        match result {
            Ok(()) => {
                self.timeline.step_back();
                if let Some(entry) = self.timeline.entry(index) {
                    tracing::debug!(id = %entry.id(), name = entry.name(), "command undone");
                    Self::emit(&mut self.callbacks, HistoryEvent::Undo { command: entry });
                }
                true
            }
            Err(err) => {
                tracing::warn!(index, %err, "undo failed, attempting snapshot recovery");
                self.recover(index, surface);
                false
            }
        }
    }

    /// Re-execute the entry after the cursor.
    ///
    /// Returns `false` when there is nothing to redo, the entry is no
    /// longer valid, or re-execution failed; a failed re-execution
    /// reverts the cursor and the error is reported only through the
    /// return value.
    pub fn redo(&mut self, surface: &mut dyn Surface) -> bool {
        if self.open_group.is_some() {
            tracing::warn!("open group committed before redo");
            self.end_grouping();
        }

        let next = self.timeline.current().map_or(0, |index| index + 1);
        let Some(entry) = self.timeline.entry(next) else {
            return false;
        };
        if !entry.is_valid() {
            tracing::debug!(index = next, "redo refused: entry is no longer valid");
            return false;
        }

        self.timeline.step_forward();
        let result = self
            .timeline
            .entry_mut(next)
            .expect("stepped onto entry")
            .execute(surface);
        match result {
            Ok(()) => {
                let entry = self.timeline.entry(next).expect("stepped onto entry");
                tracing::debug!(id = %entry.id(), name = entry.name(), "command redone");
                Self::emit(&mut self.callbacks, HistoryEvent::Redo { command: entry });
                true
            }
            Err(err) => {
                self.timeline.step_back();
                tracing::warn!(index = next, %err, "redo failed, cursor reverted");
                false
            }
        }
    }

    /// Open a composite group; subsequent commands accumulate into it
    /// until [`end_grouping`](HistoryEngine::end_grouping).
    ///
    /// Starting while a group is already open commits the previous group
    /// first. A no-op when grouping is disabled by configuration.
    pub fn start_grouping(&mut self, name: &str) {
        if !self.config.enable_grouping {
            tracing::debug!(name, "grouping disabled by configuration");
            return;
        }
        if self.open_group.is_some() {
            self.end_grouping();
        }
        let id = self.ids.next_id();
        tracing::debug!(%id, name, "group opened");
        self.open_group = Some(CompositeCommand::new(id, name));
    }

    /// Commit the open group as a single timeline entry.
    ///
    /// An empty group is discarded silently. The children were already
    /// executed individually, so committing only records the composite;
    /// no snapshot is taken outside `execute_command` post-processing.
    pub fn end_grouping(&mut self) {
        let Some(group) = self.open_group.take() else {
            return;
        };
        if group.is_empty() {
            tracing::debug!(name = group.name(), "empty group discarded");
            return;
        }

        self.discard_redoable();
        self.memory.add(group.memory_footprint());
        tracing::debug!(
            id = %group.id(),
            name = group.name(),
            commands = group.len(),
            "group committed"
        );
        self.timeline.push(Box::new(group));

        if self.config.auto_cleanup {
            self.cleanup();
        }
        if let Some(entry) = self.timeline.current_entry() {
            Self::emit(&mut self.callbacks, HistoryEvent::Command { command: entry });
        }
    }

    /// Reset everything: entries, snapshots, accounting, any open group.
    pub fn clear(&mut self) {
        if let Some(group) = self.open_group.take() {
            tracing::debug!(name = group.name(), "open group discarded by clear");
        }
        self.timeline.clear();
        self.snapshots.clear();
        self.memory.reset();
        Self::emit(&mut self.callbacks, HistoryEvent::Clear);
        tracing::debug!("history cleared");
    }

    /// Capture a snapshot at the current cursor position on demand.
    ///
    /// A no-op when nothing has been recorded yet.
    pub fn take_snapshot(&mut self, surface: &mut dyn Surface) -> Result<(), HistoryError> {
        let Some(index) = self.timeline.current() else {
            tracing::debug!("snapshot skipped: nothing recorded");
            return Ok(());
        };
        self.store_snapshot(index, surface)
    }

    /// Enforce the entry-count and byte ceilings, then drop snapshots
    /// that fell off the interval grid.
    ///
    /// Runs automatically after every recorded command unless
    /// `auto_cleanup` is disabled. Eviction removes oldest entries first
    /// and never removes the last remaining entry on account of the byte
    /// ceiling alone.
    pub fn cleanup(&mut self) {
        while self.timeline.len() > self.config.max_history_size {
            self.evict_oldest_entry();
        }
        while self.memory.total() > self.config.max_memory_usage && self.timeline.len() > 1 {
            self.evict_oldest_entry();
        }

        let len = self.timeline.len();
        let interval = self.config.snapshot_interval;
        let freed = self
            .snapshots
            .retain_valid(|index| interval != 0 && index % interval == 0 && index < len);
        self.memory.remove(freed);
    }

    /// Whether undo would currently act.
    pub fn can_undo(&self) -> bool {
        self.timeline
            .current_entry()
            .is_some_and(|entry| entry.is_valid())
    }

    /// Whether redo would currently act.
    pub fn can_redo(&self) -> bool {
        let next = self.timeline.current().map_or(0, |index| index + 1);
        self.timeline
            .entry(next)
            .is_some_and(|entry| entry.is_valid())
    }

    /// Cursor position; `None` when nothing is done.
    pub fn current_index(&self) -> Option<usize> {
        self.timeline.current()
    }

    /// Accounted bytes over retained commands plus snapshots.
    pub fn memory_usage(&self) -> usize {
        self.memory.total()
    }

    /// Number of entries undo can step back through.
    pub fn undo_depth(&self) -> usize {
        self.timeline.undo_depth()
    }

    /// Number of undone entries retained for redo.
    pub fn redo_depth(&self) -> usize {
        self.timeline.redo_depth()
    }

    /// Label of the entry the next undo would reverse.
    pub fn undo_name(&self) -> Option<&str> {
        self.timeline.current_entry().map(|entry| entry.name())
    }

    /// Label of the entry the next redo would re-execute.
    pub fn redo_name(&self) -> Option<&str> {
        let next = self.timeline.current().map_or(0, |index| index + 1);
        self.timeline.entry(next).map(|entry| entry.name())
    }

    /// Whether a composite group is currently open.
    pub fn is_grouping(&self) -> bool {
        self.open_group.is_some()
    }

    /// Borrowed view of every retained entry in timeline order.
    pub fn commands(&self) -> Vec<&dyn Command> {
        self.timeline.iter().collect()
    }

    /// Number of stored snapshots.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Active configuration.
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Serializable inspection view: descriptive records for every
    /// entry plus cursor and budget figures.
    pub fn get_state(&self) -> HistoryState {
        HistoryState {
            commands: self
                .timeline
                .iter()
                .map(|command| self.serialize_command(command))
                .collect(),
            current_index: self.timeline.current(),
            memory_usage: self.memory.total(),
            max_memory_usage: self.config.max_memory_usage,
            max_history_size: self.config.max_history_size,
        }
    }

    fn serialize_command(&self, command: &dyn Command) -> SerializedCommand {
        let timestamp_ms = command
            .timestamp()
            .saturating_duration_since(self.epoch)
            .as_millis() as u64;
        let (kind, payload) = match command.serialize() {
            Some(payload) => (payload.kind, payload.data),
            None => ("Unknown".to_string(), serde_json::Value::Null),
        };
        SerializedCommand {
            id: command.id().to_string(),
            name: command.name().to_string(),
            timestamp_ms,
            kind,
            payload,
        }
    }

    /// Branch-overwrite: drop redoable entries and the snapshots
    /// anchored beyond the new end of the timeline.
    fn discard_redoable(&mut self) {
        let discarded = self.timeline.truncate_redoable();
        if discarded.is_empty() {
            return;
        }
        for entry in &discarded {
            self.memory.remove(entry.memory_footprint());
        }
        let len = self.timeline.len();
        let freed = self.snapshots.retain_valid(|index| index < len);
        self.memory.remove(freed);
        tracing::debug!(discarded = discarded.len(), "redoable entries discarded");
    }

    fn snapshot_if_due(&mut self, surface: &mut dyn Surface) -> Result<(), HistoryError> {
        let Some(index) = self.timeline.current() else {
            return Ok(());
        };
        let interval = self.config.snapshot_interval;
        if interval == 0 || index % interval != 0 || self.snapshots.contains(index) {
            return Ok(());
        }
        self.store_snapshot(index, surface)
    }

    fn store_snapshot(
        &mut self,
        index: usize,
        surface: &mut dyn Surface,
    ) -> Result<(), HistoryError> {
        let snapshot = self.snapshots.capture(surface)?;
        self.memory.add(snapshot.memory_usage);
        if let Some(old) = self.snapshots.insert(index, snapshot) {
            self.memory.remove(old.memory_usage);
        }

        let snapshot = self.snapshots.get(index).expect("just inserted");
        tracing::debug!(index, bytes = snapshot.memory_usage, "snapshot stored");
        Self::emit(&mut self.callbacks, HistoryEvent::Snapshot { snapshot });
        Ok(())
    }

    /// Nearest-snapshot replay after a failed undo: restore the anchor,
    /// then re-execute every valid entry up to and including the cursor.
    fn recover(&mut self, index: usize, surface: &mut dyn Surface) {
        let Some((anchor, snapshot)) = self.snapshots.nearest_at_or_before(index) else {
            tracing::warn!(index, "no snapshot available for recovery");
            return;
        };
        if let Err(err) = snapshot::restore(surface, &snapshot.data) {
            tracing::warn!(anchor, %err, "snapshot restore failed during recovery");
            return;
        }

        for replay in anchor + 1..=index {
            let entry = self.timeline.entry_mut(replay).expect("replay in range");
            if !entry.is_valid() {
                continue;
            }
            if let Err(err) = entry.execute(surface) {
                tracing::warn!(index = replay, %err, "replay failed during recovery");
                return;
            }
        }
        tracing::debug!(anchor, index, "surface state recovered by snapshot replay");
    }

    fn evict_oldest_entry(&mut self) {
        let Some(entry) = self.timeline.evict_oldest() else {
            return;
        };
        self.memory.remove(entry.memory_footprint());
        let freed = self.snapshots.shift_down();
        self.memory.remove(freed);
        tracing::debug!(id = %entry.id(), name = entry.name(), "oldest entry evicted");
    }

    fn execution_error(command: &dyn Command, source: CommandError) -> HistoryError {
        HistoryError::Execution {
            name: command.name().to_string(),
            source,
        }
    }

    fn emit(callbacks: &mut [HistoryEventCallback], event: HistoryEvent<'_>) {
        for callback in callbacks.iter_mut() {
            callback(&event);
        }
    }
}
