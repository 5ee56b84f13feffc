//! Deferred cell creation and removal. Parallel callbacks queue changes here; the orchestrator
//! merges them into the live set at fixed points of the tick.
//!
//! Creations carry no id while queued. Each is keyed by the cell that queued it plus that cell's
//! running count of requests, and ids are handed out in key order when the queue is taken, so
//! the numbering never depends on which thread ran first.

use crate::cell::CellId;
use crate::events::LifecycleEvent;
use chemotaxis_common::Vec2;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A cell waiting to join the live set, with its id assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCell {
    pub id: CellId,
    /// Cell that queued the creation; `None` for the host (seeding, external requests).
    pub origin: Option<CellId>,
    pub cell_type: usize,
    pub position: Vec2,
    pub event: LifecycleEvent,
    /// Live cell this one takes the place of (differentiation).
    pub replaces: Option<CellId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRemoval {
    pub id: CellId,
    pub event: LifecycleEvent,
}

#[derive(Debug)]
struct QueuedCell {
    origin: Option<CellId>,
    seq: u32,
    cell_type: usize,
    position: Vec2,
    event: LifecycleEvent,
    replaces: Option<CellId>,
}

#[derive(Debug, Default)]
struct CreationQueue {
    cells: Vec<QueuedCell>,
    next_seq: HashMap<Option<CellId>, u32>,
}

impl CreationQueue {
    fn push(
        &mut self,
        origin: Option<CellId>,
        cell_type: usize,
        position: Vec2,
        event: LifecycleEvent,
        replaces: Option<CellId>,
    ) {
        let seq = self.next_seq.entry(origin).or_insert(0);
        self.cells.push(QueuedCell { origin, seq: *seq, cell_type, position, event, replaces });
        *seq += 1;
    }
}

#[derive(Debug)]
pub struct Staging {
    next_id: AtomicU64,
    creations: Mutex<CreationQueue>,
    removals: Mutex<Vec<PendingRemoval>>,
}

fn removal_rank(event: LifecycleEvent) -> u8 {
    match event {
        LifecycleEvent::Necrotic => 0,
        LifecycleEvent::Apoptotic => 1,
        LifecycleEvent::Differentiated => 2,
        LifecycleEvent::Mitotic => 3,
        LifecycleEvent::JustAppeared => 4,
        LifecycleEvent::None => 5,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Queue contents stay consistent even if a callback panicked while holding the lock.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for Staging {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Staging {
    pub fn new(first_id: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first_id),
            creations: Mutex::new(CreationQueue::default()),
            removals: Mutex::new(Vec::new()),
        }
    }

    /// Queues a new cell; it becomes live at the end of the current tick.
    ///
    /// `origin` is the cell whose callback is making the request, or `None` from the host. A
    /// cell's callbacks run serially, so its requests keep their order across runs.
    pub fn add_cell(&self, origin: Option<CellId>, cell_type: usize, position: Vec2, event: LifecycleEvent) {
        lock(&self.creations).push(origin, cell_type, position, event, None);
    }

    /// Queues removal of a live cell. Repeated requests for one cell collapse into one.
    pub fn remove_cell(&self, id: CellId, event: LifecycleEvent) {
        lock(&self.removals).push(PendingRemoval { id, event });
    }

    /// Queues `old` for removal and a new cell of `cell_type` in its place.
    pub fn replace_cell(&self, old: CellId, cell_type: usize, position: Vec2, event: LifecycleEvent) {
        // Removal is queued as `None`: observers get a single replaced notification instead.
        self.remove_cell(old, LifecycleEvent::None);
        lock(&self.creations).push(Some(old), cell_type, position, event, Some(old));
    }

    pub fn pending_creations(&self) -> usize {
        lock(&self.creations).cells.len()
    }

    /// Takes every queued creation in (origin, request order) order and assigns ids in that
    /// order.
    pub fn take_creations(&self) -> Vec<PendingCell> {
        let mut cells = {
            let mut queue = lock(&self.creations);
            queue.next_seq.clear();
            std::mem::take(&mut queue.cells)
        };
        cells.sort_by_key(|c| (c.origin, c.seq));
        cells
            .into_iter()
            .map(|c| PendingCell {
                id: CellId(self.next_id.fetch_add(1, Ordering::Relaxed)),
                origin: c.origin,
                cell_type: c.cell_type,
                position: c.position,
                event: c.event,
                replaces: c.replaces,
            })
            .collect()
    }

    /// Takes every queued removal, one per id, ordered by id. When a cell was queued more than
    /// once, the most specific event wins so the outcome does not depend on thread timing.
    pub fn take_removals(&self) -> Vec<PendingRemoval> {
        let mut removals = std::mem::take(&mut *lock(&self.removals));
        removals.sort_by_key(|r| (r.id, removal_rank(r.event)));
        removals.dedup_by_key(|r| r.id);
        removals
    }

    /// Live cells with a queued replacement.
    pub fn replacement_targets(&self) -> HashSet<CellId> {
        lock(&self.creations).cells.iter().filter_map(|c| c.replaces).collect()
    }
}
