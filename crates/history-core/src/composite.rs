//! Composite commands: ordered groups undone and redone as one unit.
//!
//! A [`CompositeCommand`] owns its children exclusively — the timeline
//! retains the composite, never the children individually. Executing runs
//! the children in insertion order; undoing runs them in strict reverse
//! order. Children can only be appended while the engine still holds the
//! open group: once committed, the composite sits behind `dyn Command` in
//! the timeline and is sealed by the type system.

use std::any::Any;
use std::time::Instant;

use crate::command::{Command, CommandError, CommandId, CommandPayload};
use crate::surface::Surface;

/// An ordered sequence of commands executed and undone together.
pub struct CompositeCommand {
    id: CommandId,
    name: String,
    timestamp: Instant,
    children: Vec<Box<dyn Command>>,
}

impl CompositeCommand {
    /// Create an empty group.
    pub fn new(id: CommandId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            timestamp: Instant::now(),
            children: Vec::new(),
        }
    }

    /// Append a child command. Children execute in insertion order and
    /// undo in reverse order.
    pub fn add_command(&mut self, command: Box<dyn Command>) {
        self.children.push(command);
    }

    /// Read-only view of the children.
    pub fn commands(&self) -> &[Box<dyn Command>] {
        &self.children
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the group has no children yet.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Command for CompositeCommand {
    fn id(&self) -> CommandId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn timestamp(&self) -> Instant {
        self.timestamp
    }

    fn execute(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
        for child in &mut self.children {
            child.execute(surface)?;
        }
        Ok(())
    }

    fn undo(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
        for child in self.children.iter_mut().rev() {
            child.undo(surface)?;
        }
        Ok(())
    }

    fn memory_footprint(&self) -> usize {
        self.children
            .iter()
            .map(|child| child.memory_footprint())
            .sum()
    }

    fn is_valid(&self) -> bool {
        self.children.iter().all(|child| child.is_valid())
    }

    fn serialize(&self) -> Option<CommandPayload> {
        let children: Vec<serde_json::Value> = self
            .children
            .iter()
            .map(|child| {
                let kind = child
                    .serialize()
                    .map(|payload| payload.kind)
                    .unwrap_or_else(|| "Unknown".to_string());
                serde_json::json!({
                    "id": child.id().to_string(),
                    "name": child.name(),
                    "kind": kind,
                })
            })
            .collect();
        Some(CommandPayload {
            kind: "Composite".to_string(),
            data: serde_json::json!({ "commands": children }),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
