use std::collections::VecDeque;

use image::GrayImage;

use crate::canvas::{CanvasState, Layer};

// ============================================================================
// COMMAND TRAIT
// ============================================================================

/// Trait for undoable/redoable commands.
pub trait Command: Send + Sync {
    fn undo(&self, canvas: &mut CanvasState);
    fn redo(&self, canvas: &mut CanvasState);
    fn description(&self) -> String;
    fn memory_size(&self) -> usize;
}

// ============================================================================
// SNAPSHOT COMMAND: whole-canvas undo
// ============================================================================

/// A lightweight snapshot of the canvas state. Layer pixels are shared
/// copy-on-write with the live canvas, so capturing costs little.
#[derive(Clone)]
pub struct CanvasSnapshot {
    pub width: u32,
    pub height: u32,
    pub resolution: f64,
    pub layers: Vec<Layer>,
    pub active_layer_index: usize,
    pub selection_mask: Option<GrayImage>,
}

impl CanvasSnapshot {
    pub fn capture(state: &CanvasState) -> Self {
        Self {
            width: state.width,
            height: state.height,
            resolution: state.resolution,
            layers: state.layers.clone(),
            active_layer_index: state.active_layer_index,
            selection_mask: state.selection_mask.clone(),
        }
    }

    pub fn restore_into(&self, state: &mut CanvasState) {
        state.width = self.width;
        state.height = self.height;
        state.resolution = self.resolution;
        state.layers = self.layers.clone();
        state.active_layer_index = self.active_layer_index;
        state.selection_mask = self.selection_mask.clone();
    }

    fn memory_bytes(&self) -> usize {
        self.layers.iter().map(|l| l.pixels.memory_bytes() + l.name.len()).sum::<usize>()
            + self.selection_mask.as_ref().map_or(0, |m| m.len())
    }
}

/// Stores before/after canvas snapshots for one undo step.
pub struct SnapshotCommand {
    description: String,
    before: CanvasSnapshot,
    after: Option<CanvasSnapshot>,
}

impl SnapshotCommand {
    /// Create a snapshot command. Call BEFORE performing the operation.
    /// After the operation, call `set_after()`.
    pub fn new(description: String, state: &CanvasState) -> Self {
        Self {
            description,
            before: CanvasSnapshot::capture(state),
            after: None,
        }
    }

    /// Capture the "after" state. Call this AFTER the operation completes.
    pub fn set_after(&mut self, state: &CanvasState) {
        self.after = Some(CanvasSnapshot::capture(state));
    }
}

impl Command for SnapshotCommand {
    fn undo(&self, canvas: &mut CanvasState) {
        self.before.restore_into(canvas);
    }

    fn redo(&self, canvas: &mut CanvasState) {
        if let Some(ref after) = self.after {
            after.restore_into(canvas);
        }
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        self.before.memory_bytes() + self.after.as_ref().map_or(0, |a| a.memory_bytes())
    }
}

// ============================================================================
// HISTORY MANAGER - Manages undo/redo stacks with memory limits
// ============================================================================

/// Undo/redo history manager with memory limits.
pub struct HistoryManager {
    undo_stack: VecDeque<Box<dyn Command>>,
    redo_stack: VecDeque<Box<dyn Command>>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
    /// Group opened by `begin_group`, not yet committed or aborted.
    open_group: Option<SnapshotCommand>,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50, Some(100 * 1024 * 1024))
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize, max_memory_bytes: Option<usize>) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size,
            max_memory_bytes,
            total_memory: 0,
            open_group: None,
        }
    }

    pub fn push(&mut self, command: Box<dyn Command>) {
        // Clear redo stack when a new action is performed
        for cmd in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(cmd.memory_size());
        }

        self.total_memory += command.memory_size();
        self.undo_stack.push_back(command);

        self.prune();
    }

    pub fn undo(&mut self, canvas: &mut CanvasState) -> Option<String> {
        let command = self.undo_stack.pop_back()?;
        let description = command.description();
        command.undo(canvas);
        self.redo_stack.push_back(command);
        Some(description)
    }

    pub fn redo(&mut self, canvas: &mut CanvasState) -> Option<String> {
        let command = self.redo_stack.pop_back()?;
        let description = command.description();
        command.redo(canvas);
        self.undo_stack.push_back(command);
        Some(description)
    }

    /// Prune old commands to stay within limits
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    // ---- grouped transactions -----------------------------------------------

    /// Snapshot the canvas and open a named group. Returns `false` if a group
    /// is already open (groups do not nest).
    pub fn begin_group(&mut self, name: &str, canvas: &CanvasState) -> bool {
        if self.open_group.is_some() {
            return false;
        }
        self.open_group = Some(SnapshotCommand::new(name.to_string(), canvas));
        true
    }

    /// Close the open group as a single undo step.
    pub fn commit_group(&mut self, canvas: &CanvasState) -> bool {
        let Some(mut group) = self.open_group.take() else {
            return false;
        };
        group.set_after(canvas);
        self.push(Box::new(group));
        true
    }

    /// Close the open group and put the canvas back as it was when the group
    /// began.
    pub fn abort_group(&mut self, canvas: &mut CanvasState) -> bool {
        let Some(group) = self.open_group.take() else {
            return false;
        };
        group.undo(canvas);
        true
    }
}
