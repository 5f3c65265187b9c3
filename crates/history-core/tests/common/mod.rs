//! Shared harness for engine integration tests: an in-memory surface and
//! a pair of configurable stub commands.
#![allow(dead_code)]

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use history_core::{
    Command, CommandError, CommandId, CommandIdGenerator, CommandPayload, HistoryEngine,
    HistoryEvent, RasterData, Surface, SurfaceData, SurfaceError,
};

/// In-memory stand-in for a rendering surface: a single row of byte
/// cells.
pub struct TestSurface {
    pub cells: Vec<u8>,
    /// Refuse structured captures, forcing the encoded fallback.
    pub deny_raster: bool,
    /// Make every decode fail, breaking encoded-snapshot restores.
    pub fail_decode: bool,
}

impl TestSurface {
    pub fn new(len: usize) -> Self {
        Self {
            cells: vec![0; len],
            deny_raster: false,
            fail_decode: false,
        }
    }
}

impl Surface for TestSurface {
    fn capture(&self) -> Result<RasterData, SurfaceError> {
        if self.deny_raster {
            return Err(SurfaceError::Capture("raster reads denied".to_string()));
        }
        Ok(RasterData {
            width: self.cells.len() as u32,
            height: 1,
            pixels: self.cells.clone(),
        })
    }

    fn capture_encoded(&self) -> Result<String, SurfaceError> {
        Ok(self
            .cells
            .iter()
            .map(|cell| cell.to_string())
            .collect::<Vec<_>>()
            .join(","))
    }

    fn restore(&mut self, data: &RasterData) -> Result<(), SurfaceError> {
        self.cells = data.pixels.clone();
        Ok(())
    }

    fn decode(&self, encoded: &str) -> Result<RasterData, SurfaceError> {
        if self.fail_decode {
            return Err(SurfaceError::Decode("decode disabled".to_string()));
        }
        let pixels = encoded
            .split(',')
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u8>()
                    .map_err(|_| SurfaceError::Decode(part.to_string()))
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Ok(RasterData {
            width: pixels.len() as u32,
            height: 1,
            pixels,
        })
    }
}

/// Subscribe a recording listener; returns the shared event log.
pub fn record_events(engine: &mut HistoryEngine) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    engine.subscribe(move |event| {
        let tag = match event {
            HistoryEvent::Command { command } => format!("command:{}", command.name()),
            HistoryEvent::Undo { command } => format!("undo:{}", command.name()),
            HistoryEvent::Redo { command } => format!("redo:{}", command.name()),
            HistoryEvent::Clear => "clear".to_string(),
            HistoryEvent::Snapshot { snapshot } => match &snapshot.data {
                SurfaceData::Raster(_) => "snapshot:raster".to_string(),
                SurfaceData::Encoded(_) => "snapshot:encoded".to_string(),
            },
        };
        sink.lock().unwrap().push(tag);
    });
    log
}

pub fn events(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Stub command that writes one cell, with injectable failures.
pub struct SetCell {
    id: CommandId,
    at: Instant,
    name: String,
    index: usize,
    value: u8,
    previous: Option<u8>,
    footprint: usize,
    fail_execute: bool,
    fail_undo: bool,
    fail_on_redo: bool,
    valid: Rc<Cell<bool>>,
    executions: Rc<Cell<usize>>,
    oplog: Option<Rc<RefCell<Vec<String>>>>,
}

impl SetCell {
    pub fn new(ids: &mut CommandIdGenerator, index: usize, value: u8) -> Self {
        Self {
            id: ids.next_id(),
            at: Instant::now(),
            name: "Set cell".to_string(),
            index,
            value,
            previous: None,
            footprint: 64,
            fail_execute: false,
            fail_undo: false,
            fail_on_redo: false,
            valid: Rc::new(Cell::new(true)),
            executions: Rc::new(Cell::new(0)),
            oplog: None,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_footprint(mut self, footprint: usize) -> Self {
        self.footprint = footprint;
        self
    }

    pub fn failing_execute(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    pub fn failing_undo(mut self) -> Self {
        self.fail_undo = true;
        self
    }

    /// Fail only on re-execution (the first execute succeeds).
    pub fn failing_redo(mut self) -> Self {
        self.fail_on_redo = true;
        self
    }

    pub fn validity(mut self, flag: &Rc<Cell<bool>>) -> Self {
        self.valid = Rc::clone(flag);
        self
    }

    pub fn counting(mut self, counter: &Rc<Cell<usize>>) -> Self {
        self.executions = Rc::clone(counter);
        self
    }

    /// Rename and trace execute/undo calls into a shared log.
    pub fn logged(mut self, name: &str, log: &Rc<RefCell<Vec<String>>>) -> Self {
        self.name = name.to_string();
        self.oplog = Some(Rc::clone(log));
        self
    }

    pub fn boxed(self) -> Box<dyn Command> {
        Box::new(self)
    }
}

impl Command for SetCell {
    fn id(&self) -> CommandId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn timestamp(&self) -> Instant {
        self.at
    }

    fn execute(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
        if self.fail_execute {
            return Err(CommandError::Other("execute failure injected".to_string()));
        }
        if self.fail_on_redo && self.previous.is_some() {
            return Err(CommandError::Other("redo failure injected".to_string()));
        }
        let raster = surface.capture()?;
        self.previous = Some(raster.pixels[self.index]);
        let mut pixels = raster.pixels;
        pixels[self.index] = self.value;
        surface.restore(&RasterData {
            width: raster.width,
            height: raster.height,
            pixels,
        })?;
        self.executions.set(self.executions.get() + 1);
        if let Some(log) = &self.oplog {
            log.borrow_mut().push(format!("exec:{}", self.name));
        }
        Ok(())
    }

    fn undo(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
        if self.fail_undo {
            return Err(CommandError::Other("undo failure injected".to_string()));
        }
        let previous = self
            .previous
            .ok_or_else(|| CommandError::Other("never executed".to_string()))?;
        let raster = surface.capture()?;
        let mut pixels = raster.pixels;
        pixels[self.index] = previous;
        surface.restore(&RasterData {
            width: raster.width,
            height: raster.height,
            pixels,
        })?;
        if let Some(log) = &self.oplog {
            log.borrow_mut().push(format!("undo:{}", self.name));
        }
        Ok(())
    }

    fn memory_footprint(&self) -> usize {
        self.footprint
    }

    fn is_valid(&self) -> bool {
        self.valid.get()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Mergeable stub: adds a delta to one cell. Consecutive deltas on the
/// same cell within the window coalesce.
pub struct CellDelta {
    id: CommandId,
    at: Instant,
    index: usize,
    delta: i32,
    previous: Option<u8>,
    window: Duration,
    decline_merge: bool,
    executions: Rc<Cell<usize>>,
}

impl CellDelta {
    pub fn new(ids: &mut CommandIdGenerator, index: usize, delta: i32) -> Self {
        Self {
            id: ids.next_id(),
            at: Instant::now(),
            index,
            delta,
            previous: None,
            window: Duration::from_millis(500),
            decline_merge: false,
            executions: Rc::new(Cell::new(0)),
        }
    }

    /// Shift the creation timestamp into the past.
    pub fn backdated(mut self, by: Duration) -> Self {
        self.at -= by;
        self
    }

    /// Accept the merge probe but decline to produce a merged command.
    pub fn declining_merge(mut self) -> Self {
        self.decline_merge = true;
        self
    }

    pub fn counting(mut self, counter: &Rc<Cell<usize>>) -> Self {
        self.executions = Rc::clone(counter);
        self
    }

    pub fn boxed(self) -> Box<dyn Command> {
        Box::new(self)
    }
}

impl Command for CellDelta {
    fn id(&self) -> CommandId {
        self.id
    }

    fn name(&self) -> &str {
        "Adjust cell"
    }

    fn timestamp(&self) -> Instant {
        self.at
    }

    fn execute(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
        let raster = surface.capture()?;
        let previous = raster.pixels[self.index];
        self.previous = Some(previous);
        let mut pixels = raster.pixels;
        pixels[self.index] = (i32::from(previous) + self.delta).clamp(0, 255) as u8;
        surface.restore(&RasterData {
            width: raster.width,
            height: raster.height,
            pixels,
        })?;
        self.executions.set(self.executions.get() + 1);
        Ok(())
    }

    fn undo(&mut self, surface: &mut dyn Surface) -> Result<(), CommandError> {
        let previous = self
            .previous
            .ok_or_else(|| CommandError::Other("never executed".to_string()))?;
        let raster = surface.capture()?;
        let mut pixels = raster.pixels;
        pixels[self.index] = previous;
        surface.restore(&RasterData {
            width: raster.width,
            height: raster.height,
            pixels,
        })?;
        Ok(())
    }

    fn memory_footprint(&self) -> usize {
        48
    }

    fn can_merge_with(&self, other: &dyn Command) -> bool {
        other.as_any().downcast_ref::<CellDelta>().is_some_and(|later| {
            later.index == self.index
                && later.at.saturating_duration_since(self.at) <= self.window
        })
    }

    fn merge_with(&self, other: &dyn Command) -> Option<Box<dyn Command>> {
        if self.decline_merge {
            return None;
        }
        let later = other.as_any().downcast_ref::<CellDelta>()?;
        Some(Box::new(CellDelta {
            id: self.id,
            at: self.at,
            index: self.index,
            delta: self.delta + later.delta,
            previous: self.previous,
            window: self.window,
            decline_merge: self.decline_merge,
            executions: Rc::clone(&self.executions),
        }))
    }

    fn serialize(&self) -> Option<CommandPayload> {
        Some(CommandPayload {
            kind: "CellDelta".to_string(),
            data: serde_json::json!({ "index": self.index, "delta": self.delta }),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
