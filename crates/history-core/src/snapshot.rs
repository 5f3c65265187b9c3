//! Timeline-indexed snapshot store.
//!
//! Snapshots are sparse full-state captures keyed by the timeline index
//! they were taken at, so a failed undo can be recovered by restoring the
//! nearest anchor at or before the cursor and replaying the entries after
//! it. At most one snapshot exists per index.
//!
//! Capture prefers the structured raster representation and falls back to
//! the encoded-string form when the surface refuses structured reads.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::surface::{Surface, SurfaceData, SurfaceError};

/// A full-state capture of the surface at one timeline index.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Identifier unique within the owning store.
    pub id: u64,
    /// Capture time on the monotonic clock.
    pub timestamp: Instant,
    /// Captured surface state.
    pub data: SurfaceData,
    /// Byte estimate accounted against the engine's memory budget.
    pub memory_usage: usize,
}

/// Sparse set of snapshots keyed by timeline index.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: BTreeMap<usize, Snapshot>,
    next_id: u64,
}

impl SnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Whether a snapshot is stored at `index`.
    pub fn contains(&self, index: usize) -> bool {
        self.snapshots.contains_key(&index)
    }

    /// Snapshot stored at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(&index)
    }

    /// Capture the cheapest available representation of `surface`.
    ///
    /// Falls back to the encoded form when the structured capture fails;
    /// failure of both paths is a collaborator contract violation and
    /// propagates to the caller.
    pub fn capture(&mut self, surface: &dyn Surface) -> Result<Snapshot, SurfaceError> {
        let data = match surface.capture() {
            Ok(raster) => SurfaceData::Raster(raster),
            Err(err) => {
                tracing::debug!(%err, "structured capture failed, falling back to encoded form");
                SurfaceData::Encoded(surface.capture_encoded()?)
            }
        };
        let snapshot = Snapshot {
            id: self.next_id,
            timestamp: Instant::now(),
            memory_usage: data.memory_usage(),
            data,
        };
        self.next_id += 1;
        Ok(snapshot)
    }

    /// Store `snapshot` at `index`, returning the displaced one if any.
    pub fn insert(&mut self, index: usize, snapshot: Snapshot) -> Option<Snapshot> {
        self.snapshots.insert(index, snapshot)
    }

    /// Remove the snapshot at `index`, if any.
    pub fn remove(&mut self, index: usize) -> Option<Snapshot> {
        self.snapshots.remove(&index)
    }

    /// Nearest anchor at or before `index`, for recovery replay.
    pub fn nearest_at_or_before(&self, index: usize) -> Option<(usize, &Snapshot)> {
        self.snapshots
            .range(..=index)
            .next_back()
            .map(|(anchor, snapshot)| (*anchor, snapshot))
    }

    /// Drop every snapshot whose index fails `valid`. Returns the number
    /// of accounted bytes freed.
    pub fn retain_valid(&mut self, valid: impl Fn(usize) -> bool) -> usize {
        let mut freed = 0;
        self.snapshots.retain(|index, snapshot| {
            if valid(*index) {
                true
            } else {
                tracing::debug!(index, "dropping snapshot outside retained index set");
                freed += snapshot.memory_usage;
                false
            }
        });
        freed
    }

    /// Re-key every snapshot one index down after the oldest timeline
    /// entry was evicted. The anchor at index 0 has nothing left to
    /// anchor and is dropped; its freed bytes are returned.
    pub fn shift_down(&mut self) -> usize {
        if self.snapshots.is_empty() {
            return 0;
        }
        let old = std::mem::take(&mut self.snapshots);
        let mut freed = 0;
        for (index, snapshot) in old {
            if index == 0 {
                freed += snapshot.memory_usage;
            } else {
                self.snapshots.insert(index - 1, snapshot);
            }
        }
        freed
    }

    /// Drop every snapshot.
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

/// Write a captured state back to the surface.
///
/// Raster data applies directly. Encoded data is decoded by the surface
/// first; decode failure fails the restore.
pub fn restore(surface: &mut dyn Surface, data: &SurfaceData) -> Result<(), SurfaceError> {
    match data {
        SurfaceData::Raster(raster) => surface.restore(raster),
        SurfaceData::Encoded(encoded) => {
            let raster = surface.decode(encoded)?;
            surface.restore(&raster)
        }
    }
}
